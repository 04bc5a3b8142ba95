//! 错误类型
//!
//! 启动阶段的配置错误是致命的（资源骨骼缺失、IK 链层级不匹配），
//! 每帧的几何退化情况在本地处理，不会作为错误传播。

use thiserror::Error;

use crate::retarget::AvatarBodyType;

/// 重定向运行时错误
#[derive(Debug, Error)]
pub enum RetargetError {
    /// 骨骼资源中缺少必需的骨骼
    #[error("missing bone '{path}' in skeleton asset")]
    MissingBone {
        /// 骨骼层级路径
        path: String,
    },

    /// IK 链根骨骼不是末端骨骼的祖先
    #[error("[root] - [effector] hierarchy mismatch: '{effector}' is not an offspring of '{root}'")]
    HierarchyMismatch {
        /// 根骨骼名称
        root: String,
        /// 末端骨骼名称
        effector: String,
    },

    /// 添加骨骼时父骨骼索引无效
    #[error("bone '{name}' references unknown parent index {parent}")]
    InvalidParent {
        /// 骨骼名称
        name: String,
        /// 父骨骼索引
        parent: usize,
    },

    /// 切换器缺少某个体型的原型
    #[error("missing avatar prototype for body type {0:?}")]
    MissingPrototype(AvatarBodyType),
}

impl RetargetError {
    /// 是否为启动阶段的配置错误（资源损坏，不能部分初始化）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RetargetError::MissingBone { .. }
                | RetargetError::HierarchyMismatch { .. }
                | RetargetError::MissingPrototype(_)
        )
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RetargetError>;
