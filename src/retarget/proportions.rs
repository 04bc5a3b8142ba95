//! 身体比例调整
//!
//! 由用户触发的一次性操作（不是每帧），调用期间用户需要站立不动：
//! - 整体缩放：跟踪身高 / 模型头到双脚中点的距离
//! - 脊柱、手臂、腿：跟踪折线长度 / 模型折线长度，乘到对应骨骼的本地偏移上
//!
//! 调整之后必须重建所有 IK 链（链元素缓存了段长）。

use glam::Vec3;

use crate::config::LimbSymmetry;
use crate::skeleton::{BoneId, BoneSet, HumanoidRig, Side};
use crate::tracking::{JointId, JointSource};

/// 小于此长度的测量视为退化
const MIN_MEASURED_LENGTH: f32 = 1.0e-4;

/// 左右两侧的比例
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LimbRatios {
    pub left: Option<f32>,
    pub right: Option<f32>,
}

/// 调整结果，None 表示该步骤因测量退化被跳过
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProportionReport {
    pub scale: Option<f32>,
    pub spine: Option<f32>,
    pub arms: LimbRatios,
    pub legs: LimbRatios,
}

/// 比例调整器
#[derive(Clone, Copy, Debug)]
pub struct ProportionAdjuster {
    symmetry: LimbSymmetry,
}

/// 折线长度
fn polyline<I>(points: I) -> f32
where
    I: IntoIterator<Item = Vec3>,
{
    let mut iter = points.into_iter();
    let Some(mut prev) = iter.next() else {
        return 0.0;
    };
    let mut length = 0.0;
    for p in iter {
        length += prev.distance(p);
        prev = p;
    }
    length
}

fn ratio(tracked: f32, avatar: f32) -> Option<f32> {
    if tracked < MIN_MEASURED_LENGTH || avatar < MIN_MEASURED_LENGTH || !tracked.is_finite() {
        return None;
    }
    Some(tracked / avatar)
}

fn scale_offsets(bones: &mut BoneSet, rig: &HumanoidRig, ids: &[BoneId], ratio: f32) {
    for &id in ids {
        let index = rig.index(id);
        let offset = bones.local_translation(index);
        bones.set_local_translation(index, offset * ratio);
    }
}

impl ProportionAdjuster {
    pub fn new(symmetry: LimbSymmetry) -> Self {
        Self { symmetry }
    }

    /// 依次执行所有步骤
    pub fn adjust(
        &self,
        bones: &mut BoneSet,
        rig: &HumanoidRig,
        joints: &dyn JointSource,
    ) -> ProportionReport {
        let report = ProportionReport {
            scale: self.adjust_scale(bones, rig, joints),
            spine: self.adjust_spine(bones, rig, joints),
            arms: self.adjust_arms(bones, rig, joints),
            legs: self.adjust_legs(bones, rig, joints),
        };

        log::info!(
            "比例调整: scale={:?}, spine={:?}, arms=({:?}, {:?}), legs=({:?}, {:?})",
            report.scale,
            report.spine,
            report.arms.left,
            report.arms.right,
            report.legs.left,
            report.legs.right,
        );
        report
    }

    /// 整体缩放（乘到当前模型缩放上，重复调用结果不变）
    pub fn adjust_scale(
        &self,
        bones: &mut BoneSet,
        rig: &HumanoidRig,
        joints: &dyn JointSource,
    ) -> Option<f32> {
        let body_height = joints.measure_body_height();
        let head = bones.position(rig.index(BoneId::Head));
        let mid_feet = (bones.position(rig.index(BoneId::FootL)) + bones.position(rig.index(BoneId::FootR))) * 0.5;
        let avatar_height = head.distance(mid_feet);

        let Some(ratio) = ratio(body_height, avatar_height) else {
            log::warn!(
                "跳过整体缩放: 身高={:.4}, 模型高度={:.4}",
                body_height,
                avatar_height
            );
            return None;
        };

        let mut model = bones.model_transform();
        model.scale *= ratio;
        bones.set_model_transform(model);
        Some(ratio)
    }

    /// 脊柱：骨盆 → spine1 → spine2 → spine3 → 颈
    pub fn adjust_spine(
        &self,
        bones: &mut BoneSet,
        rig: &HumanoidRig,
        joints: &dyn JointSource,
    ) -> Option<f32> {
        const SPINE: [BoneId; 5] = [
            BoneId::Pelvis,
            BoneId::Spine1,
            BoneId::Spine2,
            BoneId::Spine3,
            BoneId::Neck,
        ];

        let avatar = polyline(SPINE.iter().map(|&id| bones.position(rig.index(id))));
        let tracked = polyline(
            [JointId::SpineBase, JointId::SpineMid, JointId::SpineShoulder, JointId::Neck]
                .into_iter()
                .map(|id| joints.position(id)),
        );

        let Some(ratio) = ratio(tracked, avatar) else {
            log::warn!("跳过脊柱调整: 跟踪长度={:.4}, 模型长度={:.4}", tracked, avatar);
            return None;
        };
        scale_offsets(bones, rig, &SPINE, ratio);
        Some(ratio)
    }

    /// 手臂：模型 锁骨 → 上臂 → 前臂 → 手，跟踪 脊柱肩 → 肩 → 肘 → 腕（左右互换）
    pub fn adjust_arms(
        &self,
        bones: &mut BoneSet,
        rig: &HumanoidRig,
        joints: &dyn JointSource,
    ) -> LimbRatios {
        let avatar_len = |bones: &BoneSet, side: Side| {
            polyline(
                arm_bones(side)
                    .into_iter()
                    .map(|id| bones.position(rig.index(id))),
            )
        };
        let tracked_len = |side: Side| {
            let tracked = side.mirrored();
            polyline(
                [
                    JointId::SpineShoulder,
                    JointId::sided(tracked, JointId::ShoulderLeft, JointId::ShoulderRight),
                    JointId::sided(tracked, JointId::ElbowLeft, JointId::ElbowRight),
                    JointId::sided(tracked, JointId::WristLeft, JointId::WristRight),
                ]
                .into_iter()
                .map(|id| joints.position(id)),
            )
        };

        let measured = [Side::Left, Side::Right].map(|side| (avatar_len(&*bones, side), tracked_len(side)));
        let ratios = self.limb_ratios(measured, "手臂");

        for (side, ratio) in [(Side::Left, ratios.left), (Side::Right, ratios.right)] {
            if let Some(r) = ratio {
                let [_, upper, lower, hand] = arm_bones(side);
                scale_offsets(bones, rig, &[upper, lower, hand], r);
            }
        }
        ratios
    }

    /// 腿：模型 骨盆 → 大腿 → 小腿 → 脚，跟踪 脊柱底 → 髋 → 膝 → 踝（左右互换）
    pub fn adjust_legs(
        &self,
        bones: &mut BoneSet,
        rig: &HumanoidRig,
        joints: &dyn JointSource,
    ) -> LimbRatios {
        let avatar_len = |bones: &BoneSet, side: Side| {
            polyline(
                leg_bones(side)
                    .into_iter()
                    .map(|id| bones.position(rig.index(id))),
            )
        };
        let tracked_len = |side: Side| {
            let tracked = side.mirrored();
            polyline(
                [
                    JointId::SpineBase,
                    JointId::sided(tracked, JointId::HipLeft, JointId::HipRight),
                    JointId::sided(tracked, JointId::KneeLeft, JointId::KneeRight),
                    JointId::sided(tracked, JointId::AnkleLeft, JointId::AnkleRight),
                ]
                .into_iter()
                .map(|id| joints.position(id)),
            )
        };

        let measured = [Side::Left, Side::Right].map(|side| (avatar_len(&*bones, side), tracked_len(side)));
        let ratios = self.limb_ratios(measured, "腿");

        for (side, ratio) in [(Side::Left, ratios.left), (Side::Right, ratios.right)] {
            if let Some(r) = ratio {
                let [_, thigh, calf, foot] = leg_bones(side);
                scale_offsets(bones, rig, &[thigh, calf, foot], r);
            }
        }
        ratios
    }

    /// `measured[side] = (模型长度, 跟踪长度)`，按对称策略计算两侧比例
    fn limb_ratios(&self, measured: [(f32, f32); 2], label: &str) -> LimbRatios {
        let [(avatar_l, tracked_l), (avatar_r, tracked_r)] = measured;

        let ratios = match self.symmetry {
            LimbSymmetry::Averaged => {
                // 两侧取平均，强制等长
                let r = ratio((tracked_l + tracked_r) * 0.5, (avatar_l + avatar_r) * 0.5);
                LimbRatios { left: r, right: r }
            }
            LimbSymmetry::PerSide => LimbRatios {
                left: ratio(tracked_l, avatar_l),
                right: ratio(tracked_r, avatar_r),
            },
        };

        if ratios.left.is_none() || ratios.right.is_none() {
            log::warn!(
                "{}调整部分跳过: 模型长度=({:.4}, {:.4}), 跟踪长度=({:.4}, {:.4})",
                label,
                avatar_l,
                avatar_r,
                tracked_l,
                tracked_r
            );
        }
        ratios
    }
}

impl Default for ProportionAdjuster {
    fn default() -> Self {
        Self::new(LimbSymmetry::Averaged)
    }
}

fn arm_bones(side: Side) -> [BoneId; 4] {
    use BoneId::*;
    match side {
        Side::Left => [ClavicleL, UpperArmL, LowerArmL, HandL],
        Side::Right => [ClavicleR, UpperArmR, LowerArmR, HandR],
    }
}

fn leg_bones(side: Side) -> [BoneId; 4] {
    use BoneId::*;
    match side {
        Side::Left => [Pelvis, ThighL, CalfL, FootL],
        Side::Right => [Pelvis, ThighR, CalfR, FootR],
    }
}
