//! 模型 IK 重定向运行时
//!
//! 把身体跟踪传感器的稀疏关节映射到人形模型骨骼：
//! - skeleton: 骨骼层次、人形骨骼分类、FABRIK IK 链
//! - tracking: 跟踪关节数据源
//! - retarget: 每帧重定向、身体比例调整、体型切换

pub mod config;
pub mod error;
pub mod retarget;
pub mod skeleton;
pub mod tracking;

pub use error::{RetargetError, Result};
