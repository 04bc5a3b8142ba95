//! 调试线
//!
//! 只生成线段数据，由宿主负责绘制。

use glam::Vec3;

use crate::skeleton::{BoneSet, IkChain};
use crate::tracking::{JointId, JointSource, TrackingState};
use super::ChainKind;

/// 线段来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugLineKind {
    /// IK 链元素 → 目标（末端为最终目标，其余为提示）
    ChainTarget(ChainKind),
    /// 跟踪骨架的一段，带起点关节的跟踪状态
    TrackedBone(TrackingState),
}

/// 调试线段
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub kind: DebugLineKind,
}

impl DebugLine {
    /// 链上每个带目标的元素一条线
    pub fn chain_lines(
        kind: ChainKind,
        chain: &IkChain,
        bones: &BoneSet,
        joints: &dyn JointSource,
    ) -> Vec<DebugLine> {
        chain
            .elements()
            .iter()
            .filter_map(|element| {
                let target = element.target?;
                Some(DebugLine {
                    start: bones.position(element.node),
                    end: target.position(bones, joints),
                    kind: DebugLineKind::ChainTarget(kind),
                })
            })
            .collect()
    }

    /// 跟踪骨架：每个关节到骨段另一端
    pub fn tracked_skeleton(joints: &dyn JointSource) -> Vec<DebugLine> {
        JointId::ALL
            .iter()
            .filter_map(|&id| {
                let end = id.bone_end()?;
                let joint = joints.joint(id);
                Some(DebugLine {
                    start: joint.position,
                    end: joints.position(end),
                    kind: DebugLineKind::TrackedBone(joint.state),
                })
            })
            .collect()
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::JointSnapshot;

    #[test]
    fn test_tracked_skeleton_lines() {
        let mut joints = JointSnapshot::new();
        joints.set_position(JointId::Neck, Vec3::new(0.0, 1.5, 2.0));
        joints.set_position(JointId::Head, Vec3::new(0.0, 1.7, 2.0));

        let lines = DebugLine::tracked_skeleton(&joints);
        assert_eq!(lines.len(), JointId::COUNT - 1);

        let neck = lines
            .iter()
            .find(|l| l.kind == DebugLineKind::TrackedBone(TrackingState::Tracked))
            .unwrap();
        assert!((neck.length() - 0.2).abs() < 1e-5);
    }
}
