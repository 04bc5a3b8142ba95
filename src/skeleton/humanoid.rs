//! 人形骨骼分类
//!
//! 固定的骨骼分类（骨盆、脊柱、颈、头、锁骨/上臂/前臂/手、指骨、大腿/小腿/脚/脚尖），
//! 路径表由父子表一次性生成，初始化时逐一解析成骨骼索引。

use std::collections::HashMap;

use glam::{Vec3, Quat};
use once_cell::sync::Lazy;

use crate::{RetargetError, Result};
use super::BoneSet;

/// 骨骼资源中人形骨骼所在的路径前缀
pub const DEFAULT_PATH_PREFIX: &str = "Game_engine/Root";

/// 身体左右侧
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// 另一侧（镜像）
    #[inline]
    pub fn mirrored(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// 人形骨骼标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoneId {
    Pelvis,
    Spine1, Spine2, Spine3,
    Neck, Head,

    ClavicleL, UpperArmL, LowerArmL, HandL,
    Thumb1L, Thumb2L, Thumb3L,
    Index1L, Index2L, Index3L,
    Middle1L, Middle2L, Middle3L,
    Ring1L, Ring2L, Ring3L,
    Pinky1L, Pinky2L, Pinky3L,

    ClavicleR, UpperArmR, LowerArmR, HandR,
    Thumb1R, Thumb2R, Thumb3R,
    Index1R, Index2R, Index3R,
    Middle1R, Middle2R, Middle3R,
    Ring1R, Ring2R, Ring3R,
    Pinky1R, Pinky2R, Pinky3R,

    ThighL, CalfL, FootL, BallL,
    ThighR, CalfR, FootR, BallR,
}

impl BoneId {
    pub const COUNT: usize = 52;

    /// 所有骨骼，父骨骼总在子骨骼之前
    pub const ALL: [BoneId; BoneId::COUNT] = {
        use BoneId::*;
        [
            Pelvis, Spine1, Spine2, Spine3, Neck, Head,
            ClavicleL, UpperArmL, LowerArmL, HandL,
            Thumb1L, Thumb2L, Thumb3L, Index1L, Index2L, Index3L,
            Middle1L, Middle2L, Middle3L, Ring1L, Ring2L, Ring3L,
            Pinky1L, Pinky2L, Pinky3L,
            ClavicleR, UpperArmR, LowerArmR, HandR,
            Thumb1R, Thumb2R, Thumb3R, Index1R, Index2R, Index3R,
            Middle1R, Middle2R, Middle3R, Ring1R, Ring2R, Ring3R,
            Pinky1R, Pinky2R, Pinky3R,
            ThighL, CalfL, FootL, BallL,
            ThighR, CalfR, FootR, BallR,
        ]
    };

    /// 指骨（每侧 5 指 × 3 节）
    pub const PHALANGES: [BoneId; 30] = {
        use BoneId::*;
        [
            Thumb1L, Thumb2L, Thumb3L, Index1L, Index2L, Index3L,
            Middle1L, Middle2L, Middle3L, Ring1L, Ring2L, Ring3L,
            Pinky1L, Pinky2L, Pinky3L,
            Thumb1R, Thumb2R, Thumb3R, Index1R, Index2R, Index3R,
            Middle1R, Middle2R, Middle3R, Ring1R, Ring2R, Ring3R,
            Pinky1R, Pinky2R, Pinky3R,
        ]
    };

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// 骨骼资源中的节点名
    pub fn name(self) -> &'static str {
        use BoneId::*;
        match self {
            Pelvis => "pelvis",
            Spine1 => "spine_01",
            Spine2 => "spine_02",
            Spine3 => "spine_03",
            Neck => "neck_01",
            Head => "head",

            ClavicleL => "clavicle_l",
            UpperArmL => "upperarm_l",
            LowerArmL => "lowerarm_l",
            HandL => "hand_l",
            Thumb1L => "thumb_01_l",
            Thumb2L => "thumb_02_l",
            Thumb3L => "thumb_03_l",
            Index1L => "index_01_l",
            Index2L => "index_02_l",
            Index3L => "index_03_l",
            Middle1L => "middle_01_l",
            Middle2L => "middle_02_l",
            Middle3L => "middle_03_l",
            Ring1L => "ring_01_l",
            Ring2L => "ring_02_l",
            Ring3L => "ring_03_l",
            Pinky1L => "pinky_01_l",
            Pinky2L => "pinky_02_l",
            Pinky3L => "pinky_03_l",

            ClavicleR => "clavicle_r",
            UpperArmR => "upperarm_r",
            LowerArmR => "lowerarm_r",
            HandR => "hand_r",
            Thumb1R => "thumb_01_r",
            Thumb2R => "thumb_02_r",
            Thumb3R => "thumb_03_r",
            Index1R => "index_01_r",
            Index2R => "index_02_r",
            Index3R => "index_03_r",
            Middle1R => "middle_01_r",
            Middle2R => "middle_02_r",
            Middle3R => "middle_03_r",
            Ring1R => "ring_01_r",
            Ring2R => "ring_02_r",
            Ring3R => "ring_03_r",
            Pinky1R => "pinky_01_r",
            Pinky2R => "pinky_02_r",
            Pinky3R => "pinky_03_r",

            ThighL => "thigh_l",
            CalfL => "calf_l",
            FootL => "foot_l",
            BallL => "ball_l",
            ThighR => "thigh_r",
            CalfR => "calf_r",
            FootR => "foot_r",
            BallR => "ball_r",
        }
    }

    /// 人形层级中的父骨骼（骨盆没有）
    pub fn parent(self) -> Option<BoneId> {
        use BoneId::*;
        let parent = match self {
            Pelvis => return None,
            Spine1 | ThighL | ThighR => Pelvis,
            Spine2 => Spine1,
            Spine3 => Spine2,
            Neck | ClavicleL | ClavicleR => Spine3,
            Head => Neck,

            UpperArmL => ClavicleL,
            LowerArmL => UpperArmL,
            HandL => LowerArmL,
            Thumb1L | Index1L | Middle1L | Ring1L | Pinky1L => HandL,
            Thumb2L => Thumb1L,
            Thumb3L => Thumb2L,
            Index2L => Index1L,
            Index3L => Index2L,
            Middle2L => Middle1L,
            Middle3L => Middle2L,
            Ring2L => Ring1L,
            Ring3L => Ring2L,
            Pinky2L => Pinky1L,
            Pinky3L => Pinky2L,

            UpperArmR => ClavicleR,
            LowerArmR => UpperArmR,
            HandR => LowerArmR,
            Thumb1R | Index1R | Middle1R | Ring1R | Pinky1R => HandR,
            Thumb2R => Thumb1R,
            Thumb3R => Thumb2R,
            Index2R => Index1R,
            Index3R => Index2R,
            Middle2R => Middle1R,
            Middle3R => Middle2R,
            Ring2R => Ring1R,
            Ring3R => Ring2R,
            Pinky2R => Pinky1R,
            Pinky3R => Pinky2R,

            CalfL => ThighL,
            FootL => CalfL,
            BallL => FootL,
            CalfR => ThighR,
            FootR => CalfR,
            BallR => FootR,
        };
        Some(parent)
    }

    /// 所在侧，躯干骨骼返回 None
    pub fn side(self) -> Option<Side> {
        let name = self.name();
        if name.ends_with("_l") {
            Some(Side::Left)
        } else if name.ends_with("_r") {
            Some(Side::Right)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_phalange(self) -> bool {
        BoneId::PHALANGES.contains(&self)
    }

    /// 相对于人形根节点（骨盆之上）的层级路径
    pub fn relative_path(self) -> &'static str {
        RELATIVE_PATHS[&self].as_str()
    }
}

/// 每个骨骼相对于路径前缀的层级路径，例如 `pelvis/spine_01/spine_02`
static RELATIVE_PATHS: Lazy<HashMap<BoneId, String>> = Lazy::new(|| {
    let mut paths: HashMap<BoneId, String> = HashMap::with_capacity(BoneId::COUNT);
    for id in BoneId::ALL {
        let path = match id.parent() {
            Some(parent) => format!("{}/{}", paths[&parent], id.name()),
            None => id.name().to_string(),
        };
        paths.insert(id, path);
    }
    paths
});

// ============================================================================
// 人形映射
// ============================================================================

/// 人形骨骼到 BoneSet 索引的映射
#[derive(Clone, Debug)]
pub struct HumanoidRig {
    indices: [usize; BoneId::COUNT],
}

impl HumanoidRig {
    /// 使用默认路径前缀解析
    pub fn resolve(bones: &BoneSet) -> Result<Self> {
        Self::resolve_with_prefix(bones, DEFAULT_PATH_PREFIX)
    }

    /// 按层级路径解析所有人形骨骼，任何一个缺失都是配置错误
    pub fn resolve_with_prefix(bones: &BoneSet, prefix: &str) -> Result<Self> {
        let mut indices = [0usize; BoneId::COUNT];
        for id in BoneId::ALL {
            let path = if prefix.is_empty() {
                id.relative_path().to_string()
            } else {
                format!("{}/{}", prefix, id.relative_path())
            };
            indices[id.index()] = bones
                .find_bone_by_path(&path)
                .ok_or(RetargetError::MissingBone { path })?;
        }
        Ok(Self { indices })
    }

    /// 骨骼索引
    #[inline]
    pub fn index(&self, id: BoneId) -> usize {
        self.indices[id.index()]
    }
}

// ============================================================================
// 参考人形
// ============================================================================

/// 构造参考人形骨骼（T 姿势，Y 轴向上，脚尖朝 +Z，左侧在 -X）
///
/// 身高（头到双脚中点）约 1.5 米，所有本地旋转为单位旋转。
pub fn reference_skeleton() -> BoneSet {
    let mut offsets: HashMap<BoneId, Vec3> = HashMap::with_capacity(BoneId::COUNT);
    let mut put = |id: BoneId, offset: Vec3| {
        offsets.insert(id, offset);
    };

    use BoneId::*;
    put(Pelvis, Vec3::new(0.0, 0.95, 0.0));
    put(Spine1, Vec3::new(0.0, 0.10, 0.0));
    put(Spine2, Vec3::new(0.0, 0.12, 0.0));
    put(Spine3, Vec3::new(0.0, 0.14, 0.0));
    put(Neck, Vec3::new(0.0, 0.16, 0.0));
    put(Head, Vec3::new(0.0, 0.10, 0.0));

    for (sign, side) in [(-1.0f32, Side::Left), (1.0f32, Side::Right)] {
        let pick = |left: BoneId, right: BoneId| if side == Side::Left { left } else { right };

        put(pick(ClavicleL, ClavicleR), Vec3::new(0.03 * sign, 0.12, 0.0));
        put(pick(UpperArmL, UpperArmR), Vec3::new(0.15 * sign, 0.0, 0.0));
        put(pick(LowerArmL, LowerArmR), Vec3::new(0.28 * sign, 0.0, 0.0));
        put(pick(HandL, HandR), Vec3::new(0.25 * sign, 0.0, 0.0));

        let fingers = [
            (pick(Thumb1L, Thumb1R), pick(Thumb2L, Thumb2R), pick(Thumb3L, Thumb3R), Vec3::new(0.03 * sign, -0.02, 0.03)),
            (pick(Index1L, Index1R), pick(Index2L, Index2R), pick(Index3L, Index3R), Vec3::new(0.09 * sign, 0.0, 0.02)),
            (pick(Middle1L, Middle1R), pick(Middle2L, Middle2R), pick(Middle3L, Middle3R), Vec3::new(0.095 * sign, 0.0, 0.0)),
            (pick(Ring1L, Ring1R), pick(Ring2L, Ring2R), pick(Ring3L, Ring3R), Vec3::new(0.09 * sign, 0.0, -0.02)),
            (pick(Pinky1L, Pinky1R), pick(Pinky2L, Pinky2R), pick(Pinky3L, Pinky3R), Vec3::new(0.085 * sign, 0.0, -0.035)),
        ];
        for (first, second, third, base) in fingers {
            put(first, base);
            put(second, Vec3::new(0.04 * sign, 0.0, 0.0));
            put(third, Vec3::new(0.03 * sign, 0.0, 0.0));
        }

        put(pick(ThighL, ThighR), Vec3::new(0.10 * sign, -0.05, 0.0));
        put(pick(CalfL, CalfR), Vec3::new(0.0, -0.42, 0.0));
        put(pick(FootL, FootR), Vec3::new(0.0, -0.41, 0.0));
        put(pick(BallL, BallR), Vec3::new(0.0, -0.05, 0.12));
    }

    let mut bones = BoneSet::new();
    let mut built: HashMap<BoneId, usize> = HashMap::with_capacity(BoneId::COUNT);

    // 固定的前缀节点，父骨骼索引总是有效，不会失败
    let engine = push_bone(&mut bones, "Game_engine", None, Vec3::ZERO);
    let root = push_bone(&mut bones, "Root", Some(engine), Vec3::ZERO);

    for id in BoneId::ALL {
        let parent = match id.parent() {
            Some(p) => built[&p],
            None => root,
        };
        let index = push_bone(&mut bones, id.name(), Some(parent), offsets[&id]);
        built.insert(id, index);
    }

    bones.finish_rest_pose();
    bones
}

fn push_bone(bones: &mut BoneSet, name: &str, parent: Option<usize>, offset: Vec3) -> usize {
    match bones.add_bone(name, parent, offset, Quat::IDENTITY) {
        Ok(index) => index,
        Err(_) => unreachable!("reference skeleton adds parents before children"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(BoneId::Pelvis.relative_path(), "pelvis");
        assert_eq!(
            BoneId::Middle1L.relative_path(),
            "pelvis/spine_01/spine_02/spine_03/clavicle_l/upperarm_l/lowerarm_l/hand_l/middle_01_l"
        );
        assert_eq!(BoneId::BallR.relative_path(), "pelvis/thigh_r/calf_r/foot_r/ball_r");
    }

    #[test]
    fn test_taxonomy_order_and_sides() {
        for (i, id) in BoneId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            if let Some(parent) = id.parent() {
                assert!(parent.index() < id.index());
            }
        }
        assert_eq!(BoneId::HandL.side(), Some(Side::Left));
        assert_eq!(BoneId::CalfR.side(), Some(Side::Right));
        assert_eq!(BoneId::Neck.side(), None);
        assert!(BoneId::Ring2R.is_phalange());
        assert!(!BoneId::HandR.is_phalange());
        assert_eq!(Side::Left.mirrored(), Side::Right);
    }

    #[test]
    fn test_resolve_reference_skeleton() {
        let bones = reference_skeleton();
        let rig = HumanoidRig::resolve(&bones).unwrap();
        assert_eq!(bones.bone_name(rig.index(BoneId::Head)), "head");

        let head = bones.position(rig.index(BoneId::Head));
        assert!(head.abs_diff_eq(Vec3::new(0.0, 1.57, 0.0), 1e-4));
        let foot = bones.position(rig.index(BoneId::FootL));
        assert!((foot.y - 0.07).abs() < 1e-4);
    }

    #[test]
    fn test_resolve_missing_bone() {
        let mut bones = BoneSet::new();
        let engine = bones.add_bone("Game_engine", None, Vec3::ZERO, Quat::IDENTITY).unwrap();
        let root = bones.add_bone("Root", Some(engine), Vec3::ZERO, Quat::IDENTITY).unwrap();
        bones.add_bone("pelvis", Some(root), Vec3::Y, Quat::IDENTITY).unwrap();

        let err = HumanoidRig::resolve(&bones).unwrap_err();
        assert!(err.is_configuration());
        match err {
            RetargetError::MissingBone { path } => {
                assert_eq!(path, "Game_engine/Root/pelvis/spine_01");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
