//! 身体跟踪数据
//!
//! - JointId: 跟踪传感器的 25 个关节
//! - JointSource: 重定向控制器每帧读取的只读接口
//! - JointSnapshot: 内存实现，负责帧过滤（冻结、平滑、缺失关节保留）

mod snapshot;

pub use snapshot::{BodyFrame, JointSnapshot};

use glam::{Vec3, Quat};

use crate::skeleton::Side;

// ============================================================================
// 关节分类
// ============================================================================

/// 跟踪关节（顺序与传感器一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JointId {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointId {
    pub const COUNT: usize = 25;

    pub const ALL: [JointId; Self::COUNT] = {
        use JointId::*;
        [
            SpineBase, SpineMid, Neck, Head,
            ShoulderLeft, ElbowLeft, WristLeft, HandLeft,
            ShoulderRight, ElbowRight, WristRight, HandRight,
            HipLeft, KneeLeft, AnkleLeft, FootLeft,
            HipRight, KneeRight, AnkleRight, FootRight,
            SpineShoulder,
            HandTipLeft, ThumbLeft, HandTipRight, ThumbRight,
        ]
    };

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 骨段另一端的关节（用于绘制跟踪骨架），头部没有
    pub fn bone_end(self) -> Option<JointId> {
        use JointId::*;
        let end = match self {
            FootLeft => AnkleLeft,
            AnkleLeft => KneeLeft,
            KneeLeft => HipLeft,
            HipLeft => SpineBase,

            FootRight => AnkleRight,
            AnkleRight => KneeRight,
            KneeRight => HipRight,
            HipRight => SpineBase,

            HandTipLeft | ThumbLeft => HandLeft,
            HandLeft => WristLeft,
            WristLeft => ElbowLeft,
            ElbowLeft => ShoulderLeft,
            ShoulderLeft => SpineShoulder,

            HandTipRight | ThumbRight => HandRight,
            HandRight => WristRight,
            WristRight => ElbowRight,
            ElbowRight => ShoulderRight,
            ShoulderRight => SpineShoulder,

            SpineBase => SpineMid,
            SpineMid => SpineShoulder,
            SpineShoulder => Neck,
            Neck => Head,
            Head => return None,
        };
        Some(end)
    }

    /// 按身体侧选择关节（跟踪坐标系下的左右）
    pub fn sided(side: Side, left: JointId, right: JointId) -> JointId {
        match side {
            Side::Left => left,
            Side::Right => right,
        }
    }
}

/// 关节跟踪置信度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
}

/// 手部状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HandState {
    #[default]
    Unknown,
    NotTracked,
    Open,
    Closed,
    Lasso,
}

/// 单个跟踪关节
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedJoint {
    pub position: Vec3,
    pub rotation: Quat,
    pub state: TrackingState,
}

impl Default for TrackedJoint {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            state: TrackingState::NotTracked,
        }
    }
}

impl TrackedJoint {
    pub fn tracked(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            state: TrackingState::Tracked,
        }
    }
}

// ============================================================================
// 数据源接口
// ============================================================================

/// 关节数据源
///
/// 每帧开始重定向之前必须已经刷新完毕；无法提供的关节返回上一次的值
/// 或 `NotTracked` 状态。
pub trait JointSource {
    fn joint(&self, id: JointId) -> TrackedJoint;

    fn is_left_hand_closed(&self) -> bool;

    fn is_right_hand_closed(&self) -> bool;

    fn is_face_tracked(&self) -> bool;

    /// 面部旋转（仅在 `is_face_tracked` 时有效）
    fn head_rotation(&self) -> Quat;

    #[inline]
    fn position(&self, id: JointId) -> Vec3 {
        self.joint(id).position
    }

    fn is_hand_closed(&self, side: Side) -> bool {
        match side {
            Side::Left => self.is_left_hand_closed(),
            Side::Right => self.is_right_hand_closed(),
        }
    }

    /// 身高估计：头部关节高度减去较低一只脚的高度（要求用户站立不动）
    fn measure_body_height(&self) -> f32 {
        let lowest = self
            .position(JointId::FootLeft)
            .y
            .min(self.position(JointId::FootRight).y);
        self.position(JointId::Head).y - lowest
    }
}
