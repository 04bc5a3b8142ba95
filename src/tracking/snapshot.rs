//! 内存关节快照

use glam::{Vec3, Quat};

use crate::config::get_config;
use crate::skeleton::Side;
use super::{HandState, JointId, JointSource, TrackedJoint, TrackingState};

/// 传感器的一帧原始身体数据
#[derive(Clone, Debug, Default)]
pub struct BodyFrame {
    pub joints: [TrackedJoint; JointId::COUNT],
    pub left_hand: HandState,
    pub right_hand: HandState,
    /// 面部旋转（没有跟踪到面部时为 None）
    pub face_rotation: Option<Quat>,
}

impl BodyFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_joint(&mut self, id: JointId, position: Vec3, state: TrackingState) {
        self.joints[id.index()] = TrackedJoint {
            position,
            rotation: Quat::IDENTITY,
            state,
        };
    }
}

/// 关节快照
///
/// 保存每个关节最近一次的值，`apply_frame` 每帧调用一次。
#[derive(Clone, Debug)]
pub struct JointSnapshot {
    joints: [TrackedJoint; JointId::COUNT],
    left_hand_closed: bool,
    right_hand_closed: bool,
    face_tracked: bool,
    head_rotation: Quat,
    has_frame: bool,

    /// 停止更新
    pub frozen: bool,
    /// 位置平滑系数 [0, 1]，0 表示直接使用原始数据
    pub lerp_positions: f32,
    /// 整体竖直偏移
    pub vertical_offset: f32,
    /// 面部旋转平滑系数
    pub head_smoothing: f32,
}

impl Default for JointSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl JointSnapshot {
    pub fn new() -> Self {
        Self {
            joints: [TrackedJoint::default(); JointId::COUNT],
            left_hand_closed: false,
            right_hand_closed: false,
            face_tracked: false,
            head_rotation: Quat::IDENTITY,
            has_frame: false,
            frozen: false,
            lerp_positions: 0.0,
            vertical_offset: 0.0,
            head_smoothing: get_config().head_smoothing,
        }
    }

    // ========================================
    // 直接写入（测试、回放）
    // ========================================

    pub fn set_joint(&mut self, id: JointId, joint: TrackedJoint) {
        self.joints[id.index()] = joint;
    }

    /// 设置关节位置并标记为已跟踪
    pub fn set_position(&mut self, id: JointId, position: Vec3) {
        self.joints[id.index()] = TrackedJoint::tracked(position);
    }

    pub fn set_hand_closed(&mut self, side: Side, closed: bool) {
        match side {
            Side::Left => self.left_hand_closed = closed,
            Side::Right => self.right_hand_closed = closed,
        }
    }

    /// 设置面部旋转，None 表示面部未跟踪
    pub fn set_face_rotation(&mut self, rotation: Option<Quat>) {
        match rotation {
            Some(q) => {
                self.face_tracked = true;
                self.head_rotation = q.normalize();
            }
            None => self.face_tracked = false,
        }
    }

    pub fn set_lerp_positions(&mut self, value: f32) {
        self.lerp_positions = value.clamp(0.0, 1.0);
    }

    // ========================================
    // 帧过滤
    // ========================================

    /// 应用一帧传感器数据，`None` 表示当前没有跟踪到身体
    pub fn apply_frame(&mut self, frame: Option<&BodyFrame>) {
        if self.frozen {
            return;
        }

        let Some(frame) = frame else {
            self.left_hand_closed = false;
            self.right_hand_closed = false;
            self.face_tracked = false;
            return;
        };

        let lerp = if self.has_frame { self.lerp_positions } else { 0.0 };
        for (slot, raw) in self.joints.iter_mut().zip(frame.joints.iter()) {
            if raw.state == TrackingState::NotTracked {
                // 保留最后已知位置
                slot.state = TrackingState::NotTracked;
                continue;
            }
            let position = raw.position + Vec3::Y * self.vertical_offset;
            slot.position = position.lerp(slot.position, lerp);
            slot.rotation = raw.rotation;
            slot.state = raw.state;
        }
        self.has_frame = true;

        self.left_hand_closed = frame.left_hand == HandState::Closed;
        self.right_hand_closed = frame.right_hand == HandState::Closed;

        match frame.face_rotation {
            Some(face) => {
                let target = face.normalize();
                self.head_rotation = if self.face_tracked {
                    self.head_rotation.lerp(target, self.head_smoothing)
                } else {
                    target
                };
                self.face_tracked = true;
            }
            None => {
                self.face_tracked = false;
                self.head_rotation = self.joints[JointId::Head.index()].rotation;
            }
        }
    }
}

impl JointSource for JointSnapshot {
    #[inline]
    fn joint(&self, id: JointId) -> TrackedJoint {
        self.joints[id.index()]
    }

    fn is_left_hand_closed(&self) -> bool {
        self.left_hand_closed
    }

    fn is_right_hand_closed(&self) -> bool {
        self.right_hand_closed
    }

    fn is_face_tracked(&self) -> bool {
        self.face_tracked
    }

    fn head_rotation(&self) -> Quat {
        self.head_rotation
    }
}
