//! IK 链接线表
//!
//! 跟踪数据是镜像的：跟踪的左手关节驱动模型右手链，反之亦然。

use std::collections::HashMap;

use crate::skeleton::{BoneId, HumanoidRig, IkTarget, Side};
use crate::tracking::JointId;

/// 身体上的五条 IK 链
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Spine,
    LeftHand,
    RightHand,
    LeftLeg,
    RightLeg,
}

/// 一条链的骨骼与关节接线
#[derive(Clone, Debug, PartialEq)]
pub struct ChainWiring {
    pub target: JointId,
    pub effector: BoneId,
    pub root: BoneId,
    /// 中间骨骼的提示关节
    pub hints: Vec<(BoneId, JointId)>,
}

impl ChainKind {
    pub const COUNT: usize = 5;

    /// 求解顺序：脊柱在前，四肢在后
    pub const ALL: [ChainKind; Self::COUNT] = [
        ChainKind::Spine,
        ChainKind::LeftHand,
        ChainKind::RightHand,
        ChainKind::LeftLeg,
        ChainKind::RightLeg,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 模型侧的身体侧（脊柱为 None）
    pub fn side(self) -> Option<Side> {
        match self {
            ChainKind::Spine => None,
            ChainKind::LeftHand | ChainKind::LeftLeg => Some(Side::Left),
            ChainKind::RightHand | ChainKind::RightLeg => Some(Side::Right),
        }
    }

    pub fn is_limb(self) -> bool {
        self != ChainKind::Spine
    }

    pub fn wiring(self) -> ChainWiring {
        use BoneId::*;

        let Some(side) = self.side() else {
            return ChainWiring {
                target: JointId::Neck,
                effector: Neck,
                root: Spine1,
                hints: vec![
                    (Spine3, JointId::SpineShoulder),
                    (Spine2, JointId::SpineMid),
                ],
            };
        };

        // 左右互换
        let tracked = side.mirrored();
        let bone = |left: BoneId, right: BoneId| match side {
            Side::Left => left,
            Side::Right => right,
        };
        let joint = |left: JointId, right: JointId| JointId::sided(tracked, left, right);

        match self {
            ChainKind::LeftHand | ChainKind::RightHand => ChainWiring {
                target: joint(JointId::HandTipLeft, JointId::HandTipRight),
                effector: bone(Middle1L, Middle1R),
                root: bone(ClavicleL, ClavicleR),
                hints: vec![
                    (bone(HandL, HandR), joint(JointId::WristLeft, JointId::WristRight)),
                    (bone(LowerArmL, LowerArmR), joint(JointId::ElbowLeft, JointId::ElbowRight)),
                    (bone(UpperArmL, UpperArmR), joint(JointId::ShoulderLeft, JointId::ShoulderRight)),
                ],
            },
            _ => ChainWiring {
                target: joint(JointId::FootLeft, JointId::FootRight),
                effector: bone(BallL, BallR),
                root: Pelvis,
                hints: vec![
                    (bone(FootL, FootR), joint(JointId::AnkleLeft, JointId::AnkleRight)),
                    (bone(CalfL, CalfR), joint(JointId::KneeLeft, JointId::KneeRight)),
                    (bone(ThighL, ThighR), joint(JointId::HipLeft, JointId::HipRight)),
                ],
            },
        }
    }
}

impl ChainWiring {
    /// 提示表：骨骼索引 → 跟踪关节
    pub fn hint_targets(&self, rig: &HumanoidRig) -> HashMap<usize, IkTarget> {
        self.hints
            .iter()
            .map(|&(bone, joint)| (rig.index(bone), IkTarget::Joint(joint)))
            .collect()
    }
}
