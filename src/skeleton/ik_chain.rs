//! FABRIK IK 链
//!
//! 设计原则：
//! - 元素按末端在前、根在后排列，根骨骼本身不参与求解且不会移动
//! - 目标不可达时直接沿 根→目标 射线拉直（Stretching）
//! - 否则执行前向/后向两遍位置松弛（Converging），第一次迭代用提示点引导方向
//! - 每次求解前恢复构建时记录的本地旋转，再叠加 from-to 增量，结果与上一帧无关

use std::collections::HashMap;

use glam::{Vec3, Quat};

use crate::{RetargetError, Result};
use crate::tracking::{JointId, JointSource};
use super::{from_to_rotation, BoneSet};

/// FABRIK 默认最大迭代次数
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
/// FABRIK 默认收敛精度
pub const DEFAULT_PRECISION: f32 = 1.0e-3;

// ============================================================================
// 目标
// ============================================================================

/// IK 目标：跟踪关节、固定点或另一根骨骼
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IkTarget {
    Joint(JointId),
    Point(Vec3),
    Bone(usize),
}

impl IkTarget {
    /// 当前世界位置
    pub fn position(&self, bones: &BoneSet, joints: &dyn JointSource) -> Vec3 {
        match *self {
            IkTarget::Joint(id) => joints.joint(id).position,
            IkTarget::Point(p) => p,
            IkTarget::Bone(index) => bones.position(index),
        }
    }
}

// ============================================================================
// IK 链状态
// ============================================================================

/// 链求解模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChainState {
    /// 尚未求解或链为空
    #[default]
    Idle,
    /// 目标不可达，整条链拉直
    Stretching,
    /// FABRIK 迭代
    Converging,
}

/// 求解参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainSettings {
    /// 最大迭代次数
    pub max_iterations: u32,
    /// 末端到目标的收敛距离
    pub precision: f32,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            precision: DEFAULT_PRECISION,
        }
    }
}

/// 链元素
#[derive(Clone, Debug)]
pub struct ChainElement {
    /// 骨骼索引
    pub node: usize,
    /// 末端为最终目标，其余为可选提示点
    pub target: Option<IkTarget>,
    /// 到子节点的距离（末端为 0）
    pub length: f32,
    /// 子节点在本地空间中的方向（归一化，末端为零向量）
    pub direction_to_child: Vec3,
    /// 构建时记录的本地旋转
    pub(crate) initial_rotation: Quat,
}

impl ChainElement {
    #[inline]
    pub fn initial_rotation(&self) -> Quat {
        self.initial_rotation
    }
}

// ============================================================================
// IK 链
// ============================================================================

/// IK 链
#[derive(Clone, Debug, Default)]
pub struct IkChain {
    /// 根骨骼（不移动，不属于链元素）
    root: Option<usize>,
    /// 末端骨骼
    effector: Option<usize>,
    /// 最终目标
    target: Option<IkTarget>,
    /// 元素列表，末端为 [0]
    elements: Vec<ChainElement>,
    /// 元素长度之和
    segment_length: f32,
    /// 最后一个元素到根骨骼的距离
    root_link_length: f32,
    settings: ChainSettings,
    state: ChainState,
    last_iterations: u32,
    /// 求解缓冲区（复用内存）
    positions: Vec<Vec3>,
    hint_positions: Vec<Option<Vec3>>,
}

impl IkChain {
    /// 构建 IK 链
    ///
    /// 从末端向上遍历父骨骼直到 `root`（不含），每个经过的骨骼生成一个元素。
    /// `root` 不是 `effector` 的祖先时返回 `HierarchyMismatch`。
    pub fn build(
        bones: &BoneSet,
        target: IkTarget,
        effector: usize,
        root: usize,
        hints: &HashMap<usize, IkTarget>,
    ) -> Result<Self> {
        let mut chain = Self::default();
        chain.rebuild(bones, target, effector, root, hints)?;
        Ok(chain)
    }

    /// 使用指定求解参数
    pub fn with_settings(mut self, settings: ChainSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn set_settings(&mut self, settings: ChainSettings) {
        self.settings = settings;
    }

    /// 原地清空并重新构建（比例调整后骨骼长度变化时调用）
    pub fn rebuild(
        &mut self,
        bones: &BoneSet,
        target: IkTarget,
        effector: usize,
        root: usize,
        hints: &HashMap<usize, IkTarget>,
    ) -> Result<()> {
        self.clear();

        if effector >= bones.bone_count() || root >= bones.bone_count() {
            return Err(RetargetError::HierarchyMismatch {
                root: bones.bone_name(root).to_string(),
                effector: bones.bone_name(effector).to_string(),
            });
        }

        self.elements.push(ChainElement {
            node: effector,
            target: Some(target),
            length: 0.0,
            direction_to_child: Vec3::ZERO,
            initial_rotation: Self::rest_rotation(bones, effector),
        });

        let mut child = effector;
        let mut node = bones.parent_of(effector);
        let mut segment_length = 0.0;

        while let Some(n) = node {
            if n == root || bones.parent_of(n).is_none() {
                break;
            }

            let length = (bones.position(child) - bones.position(n)).length();
            segment_length += length;

            self.elements.push(ChainElement {
                node: n,
                target: hints.get(&n).copied(),
                length,
                direction_to_child: bones.local_translation(child).normalize_or_zero(),
                initial_rotation: Self::rest_rotation(bones, n),
            });

            child = n;
            node = bones.parent_of(n);
        }

        // 末端必须是根骨骼的后代
        if node != Some(root) {
            let err = RetargetError::HierarchyMismatch {
                root: bones.bone_name(root).to_string(),
                effector: bones.bone_name(effector).to_string(),
            };
            self.clear();
            return Err(err);
        }

        let last = self.elements[self.elements.len() - 1].node;
        self.root_link_length = (bones.position(last) - bones.position(root)).length();
        self.segment_length = segment_length;
        self.root = Some(root);
        self.effector = Some(effector);
        self.target = Some(target);

        log::debug!(
            "IK 链构建: {} -> {}, 元素数={}, 总长={:.4}",
            bones.bone_name(root),
            bones.bone_name(effector),
            self.elements.len(),
            self.total_length(),
        );

        Ok(())
    }

    /// 清空链，之后的求解为空操作
    pub fn clear(&mut self) {
        self.root = None;
        self.effector = None;
        self.target = None;
        self.elements.clear();
        self.segment_length = 0.0;
        self.root_link_length = 0.0;
        self.state = ChainState::Idle;
        self.last_iterations = 0;
    }

    fn rest_rotation(bones: &BoneSet, index: usize) -> Quat {
        bones
            .get_bone(index)
            .map(|b| b.initial_rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    // ========================================
    // 访问器
    // ========================================

    pub fn elements(&self) -> &[ChainElement] {
        &self.elements
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn effector(&self) -> Option<usize> {
        self.effector
    }

    pub fn target(&self) -> Option<IkTarget> {
        self.target
    }

    /// 链的最大伸展距离：元素长度之和加上最后一个元素到根的距离
    pub fn total_length(&self) -> f32 {
        self.segment_length + self.root_link_length
    }

    /// 最后一个元素到根骨骼的距离
    pub fn root_link_length(&self) -> f32 {
        self.root_link_length
    }

    /// 上一次求解的模式
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// 上一次求解执行的 FABRIK 迭代次数（拉直时为 0）
    pub fn last_iterations(&self) -> u32 {
        self.last_iterations
    }

    pub fn settings(&self) -> ChainSettings {
        self.settings
    }

    // ========================================
    // 求解
    // ========================================

    /// 求解 IK（每帧调用一次）
    pub fn solve(&mut self, bones: &mut BoneSet, joints: &dyn JointSource) -> ChainState {
        let root = match (self.root, self.effector) {
            (Some(root), Some(_)) if !self.elements.is_empty() => root,
            _ => {
                self.state = ChainState::Idle;
                return self.state;
            }
        };

        let target = match self.elements[0].target.or(self.target) {
            Some(t) => t.position(bones, joints),
            None => {
                self.state = ChainState::Idle;
                return self.state;
            }
        };

        let distance = (target - bones.position(root)).length();
        if distance >= self.total_length() {
            self.stretch_to(bones, target);
            self.last_iterations = 0;
            self.state = ChainState::Stretching;
        } else {
            self.last_iterations = self.fabrik(bones, joints, target);
            self.state = ChainState::Converging;
        }
        self.state
    }

    /// FABRIK 迭代，返回执行的迭代次数
    fn fabrik(&mut self, bones: &mut BoneSet, joints: &dyn JointSource, target: Vec3) -> u32 {
        let count = self.elements.len();
        let last = count - 1;

        self.positions.clear();
        self.positions.extend(self.elements.iter().map(|e| bones.position(e.node)));
        self.hint_positions.clear();
        self.hint_positions.extend(self.elements.iter().enumerate().map(|(i, e)| {
            if i == 0 {
                None
            } else {
                e.target.map(|t| t.position(bones, joints))
            }
        }));

        let anchor = self.positions[last];
        let precision_sq = self.settings.precision * self.settings.precision;
        let max_iterations = self.settings.max_iterations.max(1);
        let mut executed = 0;

        for iteration in 1..=max_iterations {
            executed = iteration;

            // 前向：末端 → 根
            self.positions[0] = target;
            for i in 1..count {
                let from = match self.hint_positions[i] {
                    Some(hint) if iteration == 1 => hint,
                    _ => self.positions[i],
                };
                let dir = (self.positions[i - 1] - from).normalize_or_zero();
                self.positions[i] = self.positions[i - 1] - dir * self.elements[i].length;
            }

            // 后向：根 → 末端
            self.positions[last] = anchor;
            for i in (0..last).rev() {
                let dir = (self.positions[i] - self.positions[i + 1]).normalize_or_zero();
                self.positions[i] = self.positions[i + 1] + dir * self.elements[i + 1].length;
            }

            if (self.positions[0] - target).length_squared() <= precision_sq {
                break;
            }
        }

        // 位置转换为旋转，父骨骼先于子骨骼
        for i in (1..count).rev() {
            let world_dir = self.positions[i - 1] - self.positions[i];
            self.orient_element(bones, i, world_dir);
        }

        executed
    }

    /// 整条链沿目标方向拉直
    fn stretch_to(&self, bones: &mut BoneSet, target: Vec3) {
        for i in (1..self.elements.len()).rev() {
            let world_dir = target - bones.position(self.elements[i].node);
            self.orient_element(bones, i, world_dir);
        }
    }

    /// 恢复初始本地旋转，再叠加让子节点指向 `world_dir` 的增量旋转
    fn orient_element(&self, bones: &mut BoneSet, i: usize, world_dir: Vec3) {
        let element = &self.elements[i];
        let world_rotation = bones.parent_rotation(element.node) * element.initial_rotation;
        let local_dir = world_rotation.inverse() * world_dir;
        let delta = from_to_rotation(element.direction_to_child, local_dir);
        bones.set_local_rotation(element.node, (element.initial_rotation * delta).normalize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::JointSnapshot;

    /// root(原点) → a(原点) → b(0,1,0) → e(1,1,0)，两段长度都为 1
    fn bent_chain() -> (BoneSet, [usize; 4]) {
        let mut bones = BoneSet::new();
        let root = bones.add_bone("root", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let a = bones.add_bone("a", Some(root), Vec3::ZERO, Quat::IDENTITY).unwrap();
        let b = bones.add_bone("b", Some(a), Vec3::Y, Quat::IDENTITY).unwrap();
        let e = bones.add_bone("e", Some(b), Vec3::X, Quat::IDENTITY).unwrap();
        bones.finish_rest_pose();
        (bones, [root, a, b, e])
    }

    fn point_chain(bones: &BoneSet, ids: [usize; 4], target: Vec3, hints: &HashMap<usize, IkTarget>) -> IkChain {
        let [root, _, _, e] = ids;
        IkChain::build(bones, IkTarget::Point(target), e, root, hints).unwrap()
    }

    #[test]
    fn test_build_lengths() {
        let (bones, ids) = bent_chain();
        let chain = point_chain(&bones, ids, Vec3::ZERO, &HashMap::new());

        let nodes: Vec<usize> = chain.elements().iter().map(|e| e.node).collect();
        assert_eq!(nodes, vec![ids[3], ids[2], ids[1]]);
        assert_eq!(chain.elements()[0].length, 0.0);

        let sum: f32 = chain.elements().iter().map(|e| e.length).sum();
        assert!((sum + chain.root_link_length() - chain.total_length()).abs() < 1e-6);
        assert!((chain.total_length() - 2.0).abs() < 1e-6);
        assert!(chain.elements()[1].direction_to_child.abs_diff_eq(Vec3::X, 1e-6));
        assert!(chain.elements()[2].direction_to_child.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_hierarchy_mismatch() {
        let (mut bones, ids) = bent_chain();
        let other = bones.add_bone("other", None, Vec3::ZERO, Quat::IDENTITY).unwrap();

        // 根骨骼不是祖先
        let err = IkChain::build(&bones, IkTarget::Point(Vec3::ZERO), ids[3], other, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, RetargetError::HierarchyMismatch { .. }));
        assert!(err.is_configuration());

        // 反向：末端是根骨骼的祖先
        let err = IkChain::build(&bones, IkTarget::Point(Vec3::ZERO), ids[1], ids[3], &HashMap::new());
        assert!(err.is_err());
    }

    #[test]
    fn test_failed_rebuild_leaves_idle_chain() {
        let (mut bones, ids) = bent_chain();
        let mut chain = point_chain(&bones, ids, Vec3::new(1.5, 0.0, 0.0), &HashMap::new());
        let other = bones.add_bone("other", None, Vec3::ZERO, Quat::IDENTITY).unwrap();

        assert!(chain
            .rebuild(&bones, IkTarget::Point(Vec3::ZERO), ids[3], other, &HashMap::new())
            .is_err());
        assert!(chain.elements().is_empty());
        assert_eq!(chain.solve(&mut bones, &JointSnapshot::new()), ChainState::Idle);
    }

    #[test]
    fn test_converging_reaches_target() {
        let (mut bones, ids) = bent_chain();
        let target = Vec3::new(1.5, 0.0, 0.0);
        let mut chain = point_chain(&bones, ids, target, &HashMap::new());

        let state = chain.solve(&mut bones, &JointSnapshot::new());
        assert_eq!(state, ChainState::Converging);
        assert!(chain.last_iterations() >= 1 && chain.last_iterations() <= 10);
        assert!(bones.position(ids[3]).distance(target) < 1e-3);

        // 根侧元素不移动
        assert!(bones.position(ids[1]).abs_diff_eq(Vec3::ZERO, 1e-6));
    }

    #[test]
    fn test_unreachable_target_stretches() {
        let (mut bones, ids) = bent_chain();
        let mut chain = point_chain(&bones, ids, Vec3::new(3.0, 0.0, 0.0), &HashMap::new());

        assert_eq!(chain.solve(&mut bones, &JointSnapshot::new()), ChainState::Stretching);
        assert_eq!(chain.last_iterations(), 0);
        assert!(bones.position(ids[2]).abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        assert!(bones.position(ids[3]).abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_exact_reach_selects_stretching() {
        let (mut bones, ids) = bent_chain();
        let mut chain = point_chain(&bones, ids, Vec3::new(2.0, 0.0, 0.0), &HashMap::new());
        assert_eq!(chain.solve(&mut bones, &JointSnapshot::new()), ChainState::Stretching);
    }

    #[test]
    fn test_solve_is_idempotent() {
        let (mut bones, ids) = bent_chain();
        let mut hints = HashMap::new();
        hints.insert(ids[2], IkTarget::Point(Vec3::new(0.5, 1.0, 0.0)));
        let mut chain = point_chain(&bones, ids, Vec3::new(1.2, 0.4, 0.3), &hints);
        let joints = JointSnapshot::new();

        chain.solve(&mut bones, &joints);
        let first: Vec<Quat> = chain.elements().iter().map(|e| bones.local_rotation(e.node)).collect();

        chain.solve(&mut bones, &joints);
        let second: Vec<Quat> = chain.elements().iter().map(|e| bones.local_rotation(e.node)).collect();

        for (a, b) in first.iter().zip(&second) {
            assert!(a.abs_diff_eq(*b, 1e-6));
        }
    }

    #[test]
    fn test_hint_biases_bend_direction() {
        let target = Vec3::new(1.5, 0.0, 0.0);

        let (mut bones, ids) = bent_chain();
        let mut chain = point_chain(&bones, ids, target, &HashMap::new());
        chain.solve(&mut bones, &JointSnapshot::new());
        assert!(bones.position(ids[2]).y > 0.0);

        let (mut bones, ids) = bent_chain();
        let mut hints = HashMap::new();
        hints.insert(ids[2], IkTarget::Point(Vec3::new(1.0, -1.0, 0.0)));
        let mut chain = point_chain(&bones, ids, target, &hints);
        chain.solve(&mut bones, &JointSnapshot::new());
        assert!(bones.position(ids[2]).y < 0.0);
        assert!(bones.position(ids[3]).distance(target) < 1e-3);
    }

    #[test]
    fn test_joint_target() {
        let (mut bones, ids) = bent_chain();
        let mut joints = JointSnapshot::new();
        joints.set_position(JointId::HandTipLeft, Vec3::new(0.0, 0.0, 1.5));

        let mut chain = IkChain::build(
            &bones,
            IkTarget::Joint(JointId::HandTipLeft),
            ids[3],
            ids[0],
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(chain.solve(&mut bones, &joints), ChainState::Converging);
        assert!(bones.position(ids[3]).distance(Vec3::new(0.0, 0.0, 1.5)) < 1e-3);
    }

    #[test]
    fn test_rebuild_after_offset_change() {
        let (mut bones, ids) = bent_chain();
        let mut chain = point_chain(&bones, ids, Vec3::new(1.5, 0.0, 0.0), &HashMap::new());
        assert!((chain.total_length() - 2.0).abs() < 1e-6);

        bones.set_local_translation(ids[3], Vec3::X * 1.5);
        chain
            .rebuild(&bones, IkTarget::Point(Vec3::new(1.5, 0.0, 0.0)), ids[3], ids[0], &HashMap::new())
            .unwrap();
        assert!((chain.total_length() - 2.5).abs() < 1e-6);
    }
}
