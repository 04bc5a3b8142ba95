//! 重定向演示
//!
//! 用合成的跟踪数据驱动参考人形：用户挥动右臂、左手握拳，
//! 中途执行一次身体比例调整，每隔若干帧打印末端位置。

use std::f32::consts::TAU;

use glam::Vec3;

use avatar_ik::retarget::{AvatarBody, ChainKind};
use avatar_ik::skeleton::humanoid::reference_skeleton;
use avatar_ik::skeleton::BoneId;
use avatar_ik::tracking::{BodyFrame, HandState, JointId, JointSnapshot, TrackingState};

const FRAMES: usize = 120;
const ADJUST_FRAME: usize = 30;

/// 站在传感器前方 2 米处的用户，右臂绕肩画圈
fn synthetic_frame(frame: usize) -> BodyFrame {
    let z = 2.0;
    let phase = frame as f32 / FRAMES as f32 * TAU;

    let mut body = BodyFrame::new();
    let mut put = |id: JointId, p: Vec3| body.set_joint(id, p, TrackingState::Tracked);

    put(JointId::SpineBase, Vec3::new(0.0, 0.95, z));
    put(JointId::SpineMid, Vec3::new(0.0, 1.2, z));
    put(JointId::SpineShoulder, Vec3::new(0.0, 1.42, z));
    put(JointId::Neck, Vec3::new(0.0, 1.52, z));
    put(JointId::Head, Vec3::new(0.0, 1.68, z));

    let shoulder = Vec3::new(0.19, 1.42, z);
    let swing = Vec3::new(phase.cos().abs() * 0.3, phase.sin() * 0.3, -0.1);
    put(JointId::ShoulderRight, shoulder);
    put(JointId::ElbowRight, shoulder + swing * 0.5 + Vec3::new(0.1, -0.1, 0.0));
    put(JointId::WristRight, shoulder + swing + Vec3::new(0.15, -0.15, 0.0));
    put(JointId::HandRight, shoulder + swing * 1.1 + Vec3::new(0.17, -0.17, 0.0));
    put(JointId::HandTipRight, shoulder + swing * 1.2 + Vec3::new(0.19, -0.19, 0.0));
    put(JointId::ThumbRight, shoulder + swing * 1.1 + Vec3::new(0.17, -0.14, -0.02));

    put(JointId::ShoulderLeft, Vec3::new(-0.19, 1.42, z));
    put(JointId::ElbowLeft, Vec3::new(-0.21, 1.14, z));
    put(JointId::WristLeft, Vec3::new(-0.22, 0.9, z));
    put(JointId::HandLeft, Vec3::new(-0.22, 0.84, z));
    put(JointId::HandTipLeft, Vec3::new(-0.22, 0.76, z));
    put(JointId::ThumbLeft, Vec3::new(-0.2, 0.82, z - 0.03));

    for (sign, hip, knee, ankle, foot) in [
        (-1.0, JointId::HipLeft, JointId::KneeLeft, JointId::AnkleLeft, JointId::FootLeft),
        (1.0, JointId::HipRight, JointId::KneeRight, JointId::AnkleRight, JointId::FootRight),
    ] {
        put(hip, Vec3::new(0.1 * sign, 0.9, z));
        put(knee, Vec3::new(0.11 * sign, 0.5, z - 0.02));
        put(ankle, Vec3::new(0.11 * sign, 0.1, z));
        put(foot, Vec3::new(0.12 * sign, 0.04, z - 0.12));
    }

    body.left_hand = HandState::Closed;
    body.right_hand = HandState::Open;
    body
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut avatar = AvatarBody::initialize(reference_skeleton())?;
    avatar.set_debug_lines_visible(true);

    let mut joints = JointSnapshot::new();
    joints.set_lerp_positions(0.3);

    for frame in 0..FRAMES {
        joints.apply_frame(Some(&synthetic_frame(frame)));

        if frame == ADJUST_FRAME {
            let report = avatar.adjust_proportions(&joints)?;
            log::info!("frame {}: 比例调整 {:?}", frame, report);
        }

        avatar.update(&joints);

        if frame % 20 == 0 {
            let hand = avatar.bone_position(BoneId::HandL);
            let chain = avatar.chain(ChainKind::LeftHand);
            log::info!(
                "frame {:3}: hand_l=({:.3}, {:.3}, {:.3}) state={:?} iterations={} debug_lines={}",
                frame,
                hand.x,
                hand.y,
                hand.z,
                chain.state(),
                chain.last_iterations(),
                avatar.debug_lines(&joints).len(),
            );
        }
    }

    let matrices = avatar.bones().skinning_matrices();
    log::info!("完成: {} 个蒙皮矩阵", matrices.len());
    Ok(())
}
