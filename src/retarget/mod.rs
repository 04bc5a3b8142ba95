//! 身体重定向
//!
//! - AvatarBody: 每帧把跟踪关节映射到模型骨骼（骨盆、胸腔、头直接计算，四肢和脊柱走 IK 链）
//! - ProportionAdjuster: 按用户身体比例缩放模型骨骼
//! - AvatarSwitcher: 不同体型模型之间切换

mod avatar_body;
mod chains;
mod debug_lines;
mod proportions;
mod switcher;

pub use avatar_body::AvatarBody;
pub use chains::{ChainKind, ChainWiring};
pub use debug_lines::{DebugLine, DebugLineKind};
pub use proportions::{LimbRatios, ProportionAdjuster, ProportionReport};
pub use switcher::{AvatarBodyType, AvatarSwitcher};
