//! 身体重定向控制器
//!
//! 每帧按固定顺序执行（后面的步骤读取前面步骤写入的骨骼位置）：
//! 1. 骨盆移动到跟踪的脊柱底
//! 2. 由髋部和脊柱关节计算骨盆朝向
//! 3. 脊柱 IK 链
//! 4. 由肩部关节计算胸腔朝向
//! 5. 头部（面部跟踪时使用面部旋转，否则回到初始本地旋转）
//! 6. 四肢 IK 链（跟踪数据左右互换）
//! 7. 手指开合

use glam::{Vec3, Quat};

use crate::Result;
use crate::config::{get_config, RetargetConfig};
use crate::skeleton::{
    look_rotation, BoneFlags, BoneId, BoneSet, ChainSettings, ChainState, HumanoidRig, IkChain,
    IkTarget,
};
use crate::tracking::{JointId, JointSource};
use super::{ChainKind, DebugLine, ProportionAdjuster, ProportionReport};

/// forward 向量长度平方小于此值时视为退化
const DEGENERATE_EPSILON: f32 = 1.0e-12;

/// 由跟踪点计算躯干朝向
///
/// `right = normalize(2 * (right - center) - (left - center))`，偏向右侧样本以容忍部分遮挡；
/// `forward = up × right`。forward 退化时返回 None。
fn torso_rotation(up: Vec3, center: Vec3, left: Vec3, right: Vec3) -> Option<Quat> {
    let up = up.normalize_or_zero();
    let right_dir = ((right - center) * 2.0 - (left - center)).normalize_or_zero();
    let forward = up.cross(right_dir);
    if forward.length_squared() < DEGENERATE_EPSILON {
        return None;
    }
    look_rotation(forward, up)
}

/// 身体重定向控制器
///
/// 拥有模型骨骼，调用方每帧先刷新关节数据源，再调用 `update`，
/// 最后读取 `bones().skinning_matrices()` 做蒙皮。
#[derive(Clone, Debug)]
pub struct AvatarBody {
    bones: BoneSet,
    rig: HumanoidRig,
    config: RetargetConfig,
    chains: [IkChain; ChainKind::COUNT],

    // 初始化时记录的旋转
    pelvis_init_global: Quat,
    ribcage_init_global: Quat,
    head_init_global: Quat,
    head_init_local: Quat,
    phalange_init_local: [Quat; BoneId::PHALANGES.len()],

    debug_lines_visible: bool,
}

impl AvatarBody {
    /// 使用全局配置初始化
    pub fn initialize(skeleton: BoneSet) -> Result<Self> {
        Self::with_config(skeleton, get_config())
    }

    /// 使用指定配置初始化
    ///
    /// 任何一个人形骨骼缺失或链层级不匹配都会使初始化整体失败。
    pub fn with_config(skeleton: BoneSet, config: RetargetConfig) -> Result<Self> {
        let mut bones = skeleton;
        let rig = HumanoidRig::resolve(&bones)?;

        let pelvis = rig.index(BoneId::Pelvis);
        let spine3 = rig.index(BoneId::Spine3);
        let head = rig.index(BoneId::Head);

        let pelvis_init_global = bones.rotation(pelvis);
        let ribcage_init_global = bones.rotation(spine3);
        let head_init_global = bones.rotation(head);
        let head_init_local = bones.local_rotation(head);
        let phalange_init_local = BoneId::PHALANGES.map(|id| bones.local_rotation(rig.index(id)));

        // 标志
        for index in [pelvis, spine3, head] {
            if let Some(bone) = bones.get_bone_mut(index) {
                bone.flags.insert(BoneFlags::TRACKED);
            }
        }
        if let Some(bone) = bones.get_bone_mut(pelvis) {
            bone.flags.insert(BoneFlags::MOVABLE);
        }
        for id in BoneId::PHALANGES {
            if let Some(bone) = bones.get_bone_mut(rig.index(id)) {
                bone.flags.insert(BoneFlags::HAND_POSE);
            }
        }

        // 传感器位于用户正前方，模型转过来面向相机
        if config.face_camera {
            let mut model = bones.model_transform();
            model.rotation = (Quat::from_rotation_y(std::f32::consts::PI) * model.rotation).normalize();
            bones.set_model_transform(model);
        }

        let mut body = Self {
            bones,
            rig,
            config,
            chains: Default::default(),
            pelvis_init_global,
            ribcage_init_global,
            head_init_global,
            head_init_local,
            phalange_init_local,
            debug_lines_visible: false,
        };
        body.rebuild_chains()?;

        log::info!(
            "模型初始化完成: 骨骼数={}, IK 链数={}",
            body.bones.bone_count(),
            ChainKind::COUNT
        );
        Ok(body)
    }

    // ========================================
    // 访问器
    // ========================================

    pub fn bones(&self) -> &BoneSet {
        &self.bones
    }

    pub fn rig(&self) -> &HumanoidRig {
        &self.rig
    }

    pub fn config(&self) -> &RetargetConfig {
        &self.config
    }

    pub fn chain(&self, kind: ChainKind) -> &IkChain {
        &self.chains[kind.index()]
    }

    /// 骨骼索引
    #[inline]
    pub fn bone(&self, id: BoneId) -> usize {
        self.rig.index(id)
    }

    /// 骨骼世界位置
    #[inline]
    pub fn bone_position(&self, id: BoneId) -> Vec3 {
        self.bones.position(self.rig.index(id))
    }

    // ========================================
    // IK 链
    // ========================================

    /// 原地重建全部五条 IK 链
    pub fn rebuild_chains(&mut self) -> Result<()> {
        for bone in 0..self.bones.bone_count() {
            if let Some(link) = self.bones.get_bone_mut(bone) {
                link.set_ik_link(false);
            }
        }

        let settings = ChainSettings {
            max_iterations: self.config.fabrik_max_iterations,
            precision: self.config.fabrik_precision,
        };

        for kind in ChainKind::ALL {
            let wiring = kind.wiring();
            let hints = wiring.hint_targets(&self.rig);
            let chain = &mut self.chains[kind.index()];
            chain.rebuild(
                &self.bones,
                IkTarget::Joint(wiring.target),
                self.rig.index(wiring.effector),
                self.rig.index(wiring.root),
                &hints,
            )?;
            chain.set_settings(settings);

            for element in chain.elements() {
                if let Some(link) = self.bones.get_bone_mut(element.node) {
                    link.set_ik_link(true);
                }
            }
        }

        log::info!(
            "IK 链重建: {}",
            ChainKind::ALL
                .iter()
                .map(|&kind| format!("{:?}={:.3}", kind, self.chains[kind.index()].total_length()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    // ========================================
    // 每帧更新
    // ========================================

    /// 一帧重定向，顺序不可交换
    pub fn update(&mut self, joints: &dyn JointSource) {
        self.move_pelvis(joints);
        self.rotate_pelvis(joints);

        self.solve_chain(ChainKind::Spine, joints);
        self.rotate_ribcage(joints);

        self.rotate_head(joints);

        self.solve_chain(ChainKind::LeftHand, joints);
        self.solve_chain(ChainKind::RightHand, joints);
        self.solve_chain(ChainKind::LeftLeg, joints);
        self.solve_chain(ChainKind::RightLeg, joints);

        self.update_hands(joints);
    }

    fn solve_chain(&mut self, kind: ChainKind, joints: &dyn JointSource) -> ChainState {
        let state = self.chains[kind.index()].solve(&mut self.bones, joints);
        if self.config.debug_log && state == ChainState::Converging {
            let chain = &self.chains[kind.index()];
            if chain.last_iterations() >= chain.settings().max_iterations {
                log::debug!("{:?} 链未在 {} 次迭代内收敛", kind, chain.last_iterations());
            }
        }
        state
    }

    fn move_pelvis(&mut self, joints: &dyn JointSource) {
        let pelvis = self.rig.index(BoneId::Pelvis);
        self.bones.set_world_position(pelvis, joints.position(JointId::SpineBase));
    }

    fn rotate_pelvis(&mut self, joints: &dyn JointSource) {
        let spine_base = joints.position(JointId::SpineBase);
        let rotation = torso_rotation(
            joints.position(JointId::SpineMid) - spine_base,
            spine_base,
            joints.position(JointId::HipLeft),
            joints.position(JointId::HipRight),
        );

        match rotation {
            Some(q) => {
                let pelvis = self.rig.index(BoneId::Pelvis);
                self.bones.set_world_rotation(pelvis, q * self.pelvis_init_global);
            }
            None => {
                if self.config.debug_log {
                    log::debug!("骨盆朝向退化，保持上一帧旋转");
                }
            }
        }
    }

    fn rotate_ribcage(&mut self, joints: &dyn JointSource) {
        let spine_shoulder = joints.position(JointId::SpineShoulder);
        let rotation = torso_rotation(
            spine_shoulder - joints.position(JointId::SpineMid),
            spine_shoulder,
            joints.position(JointId::ShoulderLeft),
            joints.position(JointId::ShoulderRight),
        );

        match rotation {
            Some(q) => {
                let spine3 = self.rig.index(BoneId::Spine3);
                self.bones.set_world_rotation(spine3, q * self.ribcage_init_global);
            }
            None => {
                if self.config.debug_log {
                    log::debug!("胸腔朝向退化，保持上一帧旋转");
                }
            }
        }
    }

    fn rotate_head(&mut self, joints: &dyn JointSource) {
        let head = self.rig.index(BoneId::Head);
        if joints.is_face_tracked() {
            // 传感器空间的 forward 朝向背面
            let yaw_fix = Quat::from_rotation_y(self.config.head_yaw_fix_degrees.to_radians());
            let rotation = joints.head_rotation() * yaw_fix * self.head_init_global;
            self.bones.set_world_rotation(head, rotation);
        } else {
            self.bones.set_local_rotation(head, self.head_init_local);
        }
    }

    /// 手指：恢复初始本地旋转，对侧跟踪手握拳时每节指骨绕本地 X 轴弯曲
    fn update_hands(&mut self, joints: &dyn JointSource) {
        let curl = Quat::from_rotation_x(self.config.finger_curl_degrees.to_radians());
        for (i, id) in BoneId::PHALANGES.iter().enumerate() {
            let Some(side) = id.side() else {
                continue;
            };
            let initial = self.phalange_init_local[i];
            let rotation = if joints.is_hand_closed(side.mirrored()) {
                initial * curl
            } else {
                initial
            };
            self.bones.set_local_rotation(self.rig.index(*id), rotation);
        }
    }

    // ========================================
    // 比例调整
    // ========================================

    /// 按跟踪用户的身体比例调整模型并重建 IK 链
    ///
    /// 调用期间用户需要站立不动，不能与 `update` 交错。
    pub fn adjust_proportions(&mut self, joints: &dyn JointSource) -> Result<ProportionReport> {
        let adjuster = ProportionAdjuster::new(self.config.limb_symmetry);
        let report = adjuster.adjust(&mut self.bones, &self.rig, joints);
        self.rebuild_chains()?;
        Ok(report)
    }

    // ========================================
    // 调试线
    // ========================================

    pub fn set_debug_lines_visible(&mut self, visible: bool) {
        self.debug_lines_visible = visible;
    }

    pub fn debug_lines_visible(&self) -> bool {
        self.debug_lines_visible
    }

    /// 所有链的 元素 → 目标 线段，不可见时为空
    pub fn debug_lines(&self, joints: &dyn JointSource) -> Vec<DebugLine> {
        if !self.debug_lines_visible {
            return Vec::new();
        }
        ChainKind::ALL
            .iter()
            .flat_map(|&kind| DebugLine::chain_lines(kind, &self.chains[kind.index()], &self.bones, joints))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetargetError;
    use crate::skeleton::humanoid::reference_skeleton;
    use crate::tracking::JointSnapshot;

    fn avatar() -> AvatarBody {
        AvatarBody::with_config(reference_skeleton(), RetargetConfig::default()).unwrap()
    }

    /// 站在传感器前 2 米、面向传感器的用户（跟踪左侧在 -X）
    fn standing_user() -> JointSnapshot {
        let mut joints = JointSnapshot::new();
        let z = 2.0;
        let points = [
            (JointId::SpineBase, Vec3::new(0.0, 0.95, z)),
            (JointId::SpineMid, Vec3::new(0.0, 1.2, z)),
            (JointId::SpineShoulder, Vec3::new(0.0, 1.4, z)),
            (JointId::Neck, Vec3::new(0.0, 1.5, z)),
            (JointId::Head, Vec3::new(0.0, 1.65, z)),
            (JointId::ShoulderLeft, Vec3::new(-0.18, 1.4, z)),
            (JointId::ElbowLeft, Vec3::new(-0.2, 1.12, z)),
            (JointId::WristLeft, Vec3::new(-0.2, 0.88, z)),
            (JointId::HandLeft, Vec3::new(-0.2, 0.82, z)),
            (JointId::HandTipLeft, Vec3::new(-0.2, 0.74, z)),
            (JointId::ShoulderRight, Vec3::new(0.18, 1.4, z)),
            (JointId::ElbowRight, Vec3::new(0.2, 1.12, z)),
            (JointId::WristRight, Vec3::new(0.2, 0.88, z)),
            (JointId::HandRight, Vec3::new(0.2, 0.82, z)),
            (JointId::HandTipRight, Vec3::new(0.2, 0.74, z)),
            (JointId::HipLeft, Vec3::new(-0.1, 0.9, z)),
            (JointId::KneeLeft, Vec3::new(-0.1, 0.5, z)),
            (JointId::AnkleLeft, Vec3::new(-0.1, 0.1, z)),
            (JointId::FootLeft, Vec3::new(-0.1, 0.05, z - 0.1)),
            (JointId::HipRight, Vec3::new(0.1, 0.9, z)),
            (JointId::KneeRight, Vec3::new(0.1, 0.5, z)),
            (JointId::AnkleRight, Vec3::new(0.1, 0.1, z)),
            (JointId::FootRight, Vec3::new(0.1, 0.05, z - 0.1)),
        ];
        for (id, p) in points {
            joints.set_position(id, p);
        }
        joints
    }

    #[test]
    fn test_initialize_builds_chains() {
        let body = avatar();
        for kind in ChainKind::ALL {
            let chain = body.chain(kind);
            assert!(!chain.elements().is_empty());
            let sum: f32 = chain.elements().iter().map(|e| e.length).sum();
            assert!((sum + chain.root_link_length() - chain.total_length()).abs() < 1e-5);
        }
        // 手臂链: 中指根 → 手 → 前臂 → 上臂
        assert_eq!(body.chain(ChainKind::LeftHand).elements().len(), 4);
        assert_eq!(body.chain(ChainKind::Spine).elements().len(), 3);

        let elbow = body.bones().get_bone(body.bone(BoneId::LowerArmL)).unwrap();
        assert!(elbow.is_ik_link());
        let pelvis = body.bones().get_bone(body.bone(BoneId::Pelvis)).unwrap();
        assert!(pelvis.is_movable());
        assert!(pelvis.is_tracked());

        // 3 (脊柱) + 2 * 4 (手臂) + 2 * 4 (腿)
        assert_eq!(body.bones().bones_with_flags(BoneFlags::IK_LINK).count(), 19);
        assert_eq!(
            body.bones().bones_with_flags(BoneFlags::HAND_POSE).count(),
            BoneId::PHALANGES.len()
        );
    }

    #[test]
    fn test_initialize_missing_bone_fails() {
        let mut bones = BoneSet::new();
        bones.add_bone("Game_engine", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let err = AvatarBody::with_config(bones, RetargetConfig::default()).unwrap_err();
        assert!(matches!(err, RetargetError::MissingBone { .. }));
    }

    #[test]
    fn test_face_camera_rotates_model() {
        let body = avatar();
        // 左脚在静止姿态 -X，转身后到 +X
        assert!(body.bone_position(BoneId::FootL).x > 0.0);

        let config = RetargetConfig {
            face_camera: false,
            ..RetargetConfig::default()
        };
        let body = AvatarBody::with_config(reference_skeleton(), config).unwrap();
        assert!(body.bone_position(BoneId::FootL).x < 0.0);
    }

    #[test]
    fn test_update_follows_tracked_body() {
        let mut body = avatar();
        let joints = standing_user();
        body.update(&joints);

        let pelvis = body.bone_position(BoneId::Pelvis);
        assert!(pelvis.abs_diff_eq(Vec3::new(0.0, 0.95, 2.0), 1e-4));

        // 面向传感器（-Z），骨盆 +Z 轴转到 -Z
        let forward = body.bones().rotation(body.bone(BoneId::Pelvis)) * Vec3::Z;
        assert!(forward.abs_diff_eq(Vec3::NEG_Z, 1e-4));

        for joint in [body.bone(BoneId::Middle1L), body.bone(BoneId::BallR)] {
            let p = body.bones().position(joint);
            assert!(p.is_finite());
        }

        // 模型左臂由跟踪右臂驱动，位于 +X
        assert!(body.bone_position(BoneId::HandL).x > 0.0);
        assert!(body.bone_position(BoneId::HandR).x < 0.0);
    }

    #[test]
    fn test_pelvis_rotation_frozen_when_degenerate() {
        let mut body = avatar();
        body.update(&standing_user());
        let pelvis = body.bone(BoneId::Pelvis);
        let before = body.bones().rotation(pelvis);

        // 髋部与脊柱底重合
        let mut joints = standing_user();
        let base = joints.position(JointId::SpineBase);
        joints.set_position(JointId::HipLeft, base);
        joints.set_position(JointId::HipRight, base);
        body.update(&joints);

        assert!(body.bones().rotation(pelvis).abs_diff_eq(before, 1e-5));

        // 髋部与脊柱共线
        joints.set_position(JointId::HipLeft, base + Vec3::Y * 0.1);
        joints.set_position(JointId::HipRight, base - Vec3::Y * 0.1);
        body.update(&joints);
        assert!(body.bones().rotation(pelvis).abs_diff_eq(before, 1e-5));
    }

    #[test]
    fn test_finger_curl() {
        let mut body = avatar();
        let mut joints = standing_user();

        // 跟踪右手握拳 → 模型左手手指弯曲
        joints.set_hand_closed(crate::skeleton::Side::Right, true);
        body.update(&joints);

        let curl = Quat::from_rotation_x(45f32.to_radians());
        for (i, id) in BoneId::PHALANGES.iter().enumerate() {
            let local = body.bones().local_rotation(body.bone(*id));
            let initial = body.phalange_init_local[i];
            let expected = match id.side() {
                Some(crate::skeleton::Side::Left) => initial * curl,
                _ => initial,
            };
            assert!(local.abs_diff_eq(expected, 1e-6), "{:?}", id);
        }

        joints.set_hand_closed(crate::skeleton::Side::Right, false);
        body.update(&joints);
        for (i, id) in BoneId::PHALANGES.iter().enumerate() {
            let local = body.bones().local_rotation(body.bone(*id));
            assert_eq!(local, body.phalange_init_local[i]);
        }
    }

    #[test]
    fn test_head_rotation() {
        let mut body = avatar();
        let mut joints = standing_user();
        let head = body.bone(BoneId::Head);

        // 未跟踪面部：保持初始本地旋转
        body.update(&joints);
        assert!(body.bones().local_rotation(head).abs_diff_eq(Quat::IDENTITY, 1e-6));

        let face = Quat::from_rotation_y(0.3);
        joints.set_face_rotation(Some(face));
        body.update(&joints);
        let expected = face * Quat::from_rotation_y(std::f32::consts::PI);
        let actual = body.bones().rotation(head);
        assert!(actual.abs_diff_eq(expected, 1e-4) || actual.abs_diff_eq(-expected, 1e-4));

        joints.set_face_rotation(None);
        body.update(&joints);
        assert!(body.bones().local_rotation(head).abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_update_is_repeatable() {
        let mut body = avatar();
        let joints = standing_user();
        body.update(&joints);
        let first: Vec<Quat> = body.bones().bones().iter().map(|b| b.rotation).collect();

        body.update(&joints);
        for (bone, q) in body.bones().bones().iter().zip(&first) {
            assert!(bone.rotation.abs_diff_eq(*q, 1e-4), "{}", bone.name);
        }
    }

    #[test]
    fn test_adjust_proportions_rebuilds_chains() {
        let mut body = avatar();
        let joints = standing_user();
        let arm_before = body.chain(ChainKind::LeftHand).total_length();

        let report = body.adjust_proportions(&joints).unwrap();
        let scale = report.scale.unwrap();
        let arm = report.arms.left.unwrap();
        assert!(scale > 0.0 && arm > 0.0);

        // 上臂、前臂、手的偏移同时乘以缩放和手臂比例，链长随之变化
        let arm_after = body.chain(ChainKind::LeftHand).total_length();
        assert!((arm_after - arm_before).abs() > 1e-4);

        let chain = body.chain(ChainKind::LeftHand);
        let sum: f32 = chain.elements().iter().map(|e| e.length).sum();
        assert!((sum + chain.root_link_length() - arm_after).abs() < 1e-5);

        // 调整后仍可正常更新
        body.update(&joints);
        assert!(body.bone_position(BoneId::HandL).is_finite());
    }

    #[test]
    fn test_debug_lines_visibility() {
        let mut body = avatar();
        let joints = standing_user();
        assert!(body.debug_lines(&joints).is_empty());

        body.set_debug_lines_visible(true);
        let lines = body.debug_lines(&joints);
        // 每条链：末端 + 有提示的元素
        let expected: usize = ChainKind::ALL
            .iter()
            .map(|&k| body.chain(k).elements().iter().filter(|e| e.target.is_some()).count())
            .sum();
        assert_eq!(lines.len(), expected);
        assert!(lines.len() >= ChainKind::COUNT);
    }
}
