//! 骨骼节点
//!
//! BoneLink 是骨骼系统的核心单元，每个 BoneLink 代表骨骼层次中的一个节点。
//! 变换计算：local_to_world = parent.local_to_world * local_to_parent

use glam::{Vec3, Quat, Mat4};
use bitflags::bitflags;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 世界位置由跟踪数据直接驱动
        const MOVABLE = 1 << 0;
        /// 属于某条 IK 链（链重建时重新标记）
        const IK_LINK = 1 << 1;
        /// 旋转由跟踪关节直接计算（骨盆、胸腔、头）
        const TRACKED = 1 << 2;
        /// 由手部开合姿态驱动的指骨
        const HAND_POSE = 1 << 3;
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点
///
/// - 静态数据：名称、父子关系、静止姿态
/// - 动态数据：每帧更新的本地偏移和本地旋转
/// - 变换计算：local_to_world = parent.local_to_world * local_to_parent
#[derive(Clone, Debug)]
pub struct BoneLink {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================

    /// 骨骼名称
    pub name: String,

    /// 骨骼内部索引
    pub(crate) internal_id: usize,

    /// 父骨骼索引（None 表示根骨骼）
    pub(crate) parent: Option<usize>,

    /// 骨骼标志
    pub flags: BoneFlags,

    /// 静止姿态下相对父骨骼的偏移
    pub initial_translation: Vec3,

    /// 静止姿态下的本地旋转
    pub initial_rotation: Quat,

    /// 逆绑定矩阵（用于蒙皮）
    pub inverse_init: Mat4,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================

    /// 相对父骨骼的偏移（比例调整会改写它）
    pub translation: Vec3,

    /// 本地旋转
    pub rotation: Quat,

    /// 本地变换矩阵 (local_to_parent)
    pub local_to_parent: Mat4,

    /// 全局变换矩阵 (local_to_world)
    pub local_to_world: Mat4,

    /// 父骨骼到世界的变换（缓存）
    pub(crate) parent_to_world: Mat4,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: String) -> Self {
        Self {
            name,
            internal_id: 0,
            parent: None,
            flags: BoneFlags::empty(),
            initial_translation: Vec3::ZERO,
            initial_rotation: Quat::IDENTITY,
            inverse_init: Mat4::IDENTITY,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            local_to_parent: Mat4::IDENTITY,
            local_to_world: Mat4::IDENTITY,
            parent_to_world: Mat4::IDENTITY,
        }
    }

    /// 以静止姿态创建骨骼
    pub fn with_rest_pose(name: String, translation: Vec3, rotation: Quat) -> Self {
        let mut bone = Self::new(name);
        bone.initial_translation = translation;
        bone.initial_rotation = rotation;
        bone.translation = translation;
        bone.rotation = rotation;
        bone.compute_local_transform();
        bone
    }

    // ========================================
    // 访问器
    // ========================================

    /// 骨骼索引
    #[inline]
    pub fn link_id(&self) -> usize {
        self.internal_id
    }

    /// 父骨骼索引
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        self.parent
    }

    /// 是否为根骨骼
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// 获取世界位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.local_to_world.col(3).truncate()
    }

    /// 获取世界旋转（去除模型缩放）
    #[inline]
    pub fn world_rotation(&self) -> Quat {
        let (_, rotation, _) = self.local_to_world.to_scale_rotation_translation();
        rotation
    }

    /// 父骨骼的世界旋转
    #[inline]
    pub(crate) fn parent_world_rotation(&self) -> Quat {
        let (_, rotation, _) = self.parent_to_world.to_scale_rotation_translation();
        rotation
    }

    // ========================================
    // 变换计算
    // ========================================

    /// 恢复静止姿态
    #[inline]
    pub fn reset_pose(&mut self) {
        self.translation = self.initial_translation;
        self.rotation = self.initial_rotation;
    }

    /// 计算本地变换 (local_to_parent)
    #[inline]
    pub fn compute_local_transform(&mut self) {
        self.local_to_parent = Mat4::from_rotation_translation(self.rotation, self.translation);
    }

    /// 获取蒙皮矩阵
    /// skinning_matrix = local_to_world * inverse_init
    #[inline]
    pub fn get_skinning_matrix(&self) -> Mat4 {
        self.local_to_world * self.inverse_init
    }

    // ========================================
    // 标志检查方法
    // ========================================

    #[inline]
    pub fn is_movable(&self) -> bool {
        self.flags.contains(BoneFlags::MOVABLE)
    }

    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.flags.contains(BoneFlags::TRACKED)
    }

    #[inline]
    pub fn is_ik_link(&self) -> bool {
        self.flags.contains(BoneFlags::IK_LINK)
    }

    #[inline]
    pub fn set_ik_link(&mut self, enabled: bool) {
        self.flags.set(BoneFlags::IK_LINK, enabled);
    }
}

impl Default for BoneLink {
    fn default() -> Self {
        Self::new(String::new())
    }
}
