//! 骨骼集合
//!
//! BoneSet 拥有全部骨骼（按索引存储），父骨骼必须先于子骨骼加入，
//! 因此索引顺序天然是父先子后，层级不可能成环。

use std::collections::HashMap;

use glam::{Vec3, Quat, Mat4};

use crate::{RetargetError, Result};
use super::bone_link::{BoneLink, BoneFlags};
use super::BoneTransform;

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct BoneSet {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
    children_cache: Vec<Vec<usize>>,
    /// 模型变换（作用于所有根骨骼之上）
    model: BoneTransform,
}

impl BoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加骨骼
    ///
    /// `parent` 必须是已存在的骨骼索引。
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<usize>,
        translation: Vec3,
        rotation: Quat,
    ) -> Result<usize> {
        if let Some(parent_idx) = parent {
            if parent_idx >= self.bones.len() {
                return Err(RetargetError::InvalidParent {
                    name: name.to_string(),
                    parent: parent_idx,
                });
            }
        }

        let index = self.bones.len();
        let mut bone = BoneLink::with_rest_pose(name.to_string(), translation, rotation);
        bone.internal_id = index;
        bone.parent = parent;

        if let Some(parent_idx) = parent {
            self.children_cache[parent_idx].push(index);
        }
        // 同名骨骼只记录第一个，按路径查找可区分
        self.name_to_index.entry(bone.name.clone()).or_insert(index);
        self.bones.push(bone);
        self.children_cache.push(Vec::new());

        self.update_global_transform_recursive(index);
        Ok(index)
    }

    /// 将当前姿态固定为静止姿态，并计算逆绑定矩阵
    pub fn finish_rest_pose(&mut self) {
        self.update_transforms();
        for bone in &mut self.bones {
            bone.initial_translation = bone.translation;
            bone.initial_rotation = bone.rotation;
            bone.inverse_init = bone.local_to_world.inverse();
        }
    }

    // ========================================
    // 查询
    // ========================================

    /// 骨骼数量
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    pub fn get_bone(&self, index: usize) -> Option<&BoneLink> {
        self.bones.get(index)
    }

    pub fn get_bone_mut(&mut self, index: usize) -> Option<&mut BoneLink> {
        self.bones.get_mut(index)
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// 通过层级路径查找骨骼，例如 `Game_engine/Root/pelvis`
    pub fn find_bone_by_path(&self, path: &str) -> Option<usize> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = self
            .bones
            .iter()
            .position(|b| b.is_root() && b.name == first)?;

        for segment in segments {
            current = self.children_cache[current]
                .iter()
                .copied()
                .find(|&child| self.bones[child].name == segment)?;
        }
        Some(current)
    }

    /// 骨骼名称（调试用）
    pub fn bone_name(&self, index: usize) -> &str {
        self.bones.get(index).map(|b| b.name.as_str()).unwrap_or("<invalid>")
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent)
    }

    pub fn children_of(&self, index: usize) -> &[usize] {
        self.children_cache.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `ancestor` 是否为 `index` 的严格祖先
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut node = self.parent_of(index);
        while let Some(n) = node {
            if n == ancestor {
                return true;
            }
            node = self.parent_of(n);
        }
        false
    }

    /// 世界位置
    #[inline]
    pub fn position(&self, index: usize) -> Vec3 {
        self.bones[index].position()
    }

    /// 世界旋转
    #[inline]
    pub fn rotation(&self, index: usize) -> Quat {
        self.bones[index].world_rotation()
    }

    /// 父骨骼的世界旋转（根骨骼为模型旋转）
    #[inline]
    pub fn parent_rotation(&self, index: usize) -> Quat {
        self.bones[index].parent_world_rotation()
    }

    /// 本地旋转
    #[inline]
    pub fn local_rotation(&self, index: usize) -> Quat {
        self.bones[index].rotation
    }

    /// 本地偏移
    #[inline]
    pub fn local_translation(&self, index: usize) -> Vec3 {
        self.bones[index].translation
    }

    /// 将世界方向转换到骨骼本地空间（只考虑旋转）
    #[inline]
    pub fn inverse_transform_direction(&self, index: usize, direction: Vec3) -> Vec3 {
        self.rotation(index).inverse() * direction
    }

    /// 所有骨骼的蒙皮矩阵
    pub fn skinning_matrices(&self) -> Vec<Mat4> {
        self.bones.iter().map(BoneLink::get_skinning_matrix).collect()
    }

    /// 带有指定标志的骨骼索引
    pub fn bones_with_flags(&self, flags: BoneFlags) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .filter(move |b| b.flags.contains(flags))
            .map(BoneLink::link_id)
    }

    // ========================================
    // 模型变换
    // ========================================

    pub fn model_transform(&self) -> BoneTransform {
        self.model
    }

    /// 设置模型变换并刷新所有骨骼
    pub fn set_model_transform(&mut self, model: BoneTransform) {
        self.model = model;
        self.update_transforms();
    }

    /// 模型统一缩放
    pub fn model_scale(&self) -> f32 {
        self.model.scale.x
    }

    pub fn set_model_scale(&mut self, scale: f32) {
        self.model.scale = Vec3::splat(scale);
        self.update_transforms();
    }

    // ========================================
    // 姿态写入
    // ========================================

    /// 设置本地旋转并刷新子树
    pub fn set_local_rotation(&mut self, index: usize, rotation: Quat) {
        if index >= self.bones.len() {
            return;
        }
        self.bones[index].rotation = rotation;
        self.bones[index].compute_local_transform();
        self.update_global_transform_recursive(index);
    }

    /// 设置本地偏移并刷新子树
    pub fn set_local_translation(&mut self, index: usize, translation: Vec3) {
        if index >= self.bones.len() {
            return;
        }
        self.bones[index].translation = translation;
        self.bones[index].compute_local_transform();
        self.update_global_transform_recursive(index);
    }

    /// 设置世界位置（通过父骨骼变换换算为本地偏移）
    pub fn set_world_position(&mut self, index: usize, position: Vec3) {
        if index >= self.bones.len() {
            return;
        }
        let local = self.bones[index].parent_to_world.inverse().transform_point3(position);
        self.set_local_translation(index, local);
    }

    /// 设置世界旋转（通过父骨骼旋转换算为本地旋转）
    pub fn set_world_rotation(&mut self, index: usize, rotation: Quat) {
        if index >= self.bones.len() {
            return;
        }
        let parent_rotation = self.bones[index].parent_world_rotation();
        let local = (parent_rotation.inverse() * rotation).normalize();
        self.set_local_rotation(index, local);
    }

    /// 所有骨骼恢复静止姿态
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.reset_pose();
        }
        self.update_transforms();
    }

    // ========================================
    // 变换传播
    // ========================================

    /// 按索引顺序（父先子后）刷新全部骨骼
    pub fn update_transforms(&mut self) {
        let model = self.model.to_matrix();
        for idx in 0..self.bones.len() {
            self.bones[idx].compute_local_transform();
            let parent_global = match self.bones[idx].parent {
                Some(p) => self.bones[p].local_to_world,
                None => model,
            };
            let bone = &mut self.bones[idx];
            bone.parent_to_world = parent_global;
            bone.local_to_world = parent_global * bone.local_to_parent;
        }
    }

    /// 递归更新全局变换
    pub(crate) fn update_global_transform_recursive(&mut self, idx: usize) {
        if idx >= self.bones.len() {
            return;
        }

        let parent_global = match self.bones[idx].parent {
            Some(p) => self.bones[p].local_to_world,
            None => self.model.to_matrix(),
        };
        let bone = &mut self.bones[idx];
        bone.parent_to_world = parent_global;
        bone.local_to_world = parent_global * bone.local_to_parent;

        // 递归更新子骨骼
        for i in 0..self.children_cache[idx].len() {
            let child_idx = self.children_cache[idx][i];
            self.update_global_transform_recursive(child_idx);
        }
    }
}
