//! 骨骼系统
//!
//! 核心设计思想：
//! - BoneLink: 单个骨骼节点（本地偏移、本地旋转、静止姿态）
//! - BoneSet: 拥有全部骨骼，管理层次结构和变换传播
//! - HumanoidRig: 固定人形骨骼分类到骨骼索引的映射，初始化时一次性校验
//! - IkChain: FABRIK IK 链

mod bone_link;
mod bone_set;
pub mod humanoid;
mod ik_chain;

pub use bone_link::{BoneLink, BoneFlags};
pub use bone_set::BoneSet;
pub use humanoid::{BoneId, HumanoidRig, Side};
pub use ik_chain::{ChainElement, ChainSettings, ChainState, IkChain, IkTarget};

use glam::{Vec3, Quat, Mat3, Mat4};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼变换数据
#[derive(Clone, Copy, Debug)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl BoneTransform {
    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

// ============================================================================
// 旋转工具
// ============================================================================

/// 构造朝向旋转：+Z 对齐 `forward`，+Y 尽量对齐 `up`
///
/// `forward` 为零或与 `up` 平行时返回 None。
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let z = forward.normalize_or_zero();
    if z == Vec3::ZERO {
        return None;
    }
    let x = up.cross(z).normalize_or_zero();
    if x == Vec3::ZERO {
        return None;
    }
    let y = z.cross(x);
    Some(Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize())
}

/// 从 `from` 方向转到 `to` 方向的最短旋转
///
/// 任一方向为零向量时返回单位旋转。
#[inline]
pub fn from_to_rotation(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_rotation_axes() {
        let q = look_rotation(Vec3::X, Vec3::Y).unwrap();
        assert!((q * Vec3::Z).abs_diff_eq(Vec3::X, 1e-5));
        assert!((q * Vec3::Y).abs_diff_eq(Vec3::Y, 1e-5));

        // 退化输入
        assert!(look_rotation(Vec3::ZERO, Vec3::Y).is_none());
        assert!(look_rotation(Vec3::Y, Vec3::Y).is_none());
    }

    #[test]
    fn test_from_to_rotation() {
        let q = from_to_rotation(Vec3::Y, Vec3::new(2.0, 0.0, 0.0));
        assert!((q * Vec3::Y).abs_diff_eq(Vec3::X, 1e-5));
        assert_eq!(from_to_rotation(Vec3::ZERO, Vec3::X), Quat::IDENTITY);
    }
}
