//! 体型切换
//!
//! 每种体型一个原型骨骼，切换时丢弃当前模型，从原型复制一份重新初始化。

use std::collections::HashMap;

use crate::{RetargetError, Result};
use crate::config::{get_config, RetargetConfig};
use crate::skeleton::BoneSet;
use crate::tracking::JointSource;
use super::{AvatarBody, ProportionReport};

/// 模型体型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AvatarBodyType {
    FemaleFit,
    FemaleFat,
    MaleFit,
    MaleFat,
    Child,
}

impl AvatarBodyType {
    pub const ALL: [AvatarBodyType; 5] = [
        AvatarBodyType::FemaleFit,
        AvatarBodyType::FemaleFat,
        AvatarBodyType::MaleFit,
        AvatarBodyType::MaleFat,
        AvatarBodyType::Child,
    ];
}

/// 体型切换器
#[derive(Debug)]
pub struct AvatarSwitcher {
    prototypes: HashMap<AvatarBodyType, BoneSet>,
    config: RetargetConfig,
    active_type: AvatarBodyType,
    active: AvatarBody,
    debug_lines_visible: bool,
}

impl AvatarSwitcher {
    /// 创建切换器，所有体型都必须有原型
    pub fn new(prototypes: HashMap<AvatarBodyType, BoneSet>, initial: AvatarBodyType) -> Result<Self> {
        Self::with_config(prototypes, initial, get_config())
    }

    pub fn with_config(
        prototypes: HashMap<AvatarBodyType, BoneSet>,
        initial: AvatarBodyType,
        config: RetargetConfig,
    ) -> Result<Self> {
        if let Some(missing) = AvatarBodyType::ALL
            .into_iter()
            .find(|t| !prototypes.contains_key(t))
        {
            return Err(RetargetError::MissingPrototype(missing));
        }

        let active = Self::instantiate(&prototypes, initial, &config)?;
        Ok(Self {
            prototypes,
            config,
            active_type: initial,
            active,
            debug_lines_visible: true,
        })
    }

    fn instantiate(
        prototypes: &HashMap<AvatarBodyType, BoneSet>,
        body_type: AvatarBodyType,
        config: &RetargetConfig,
    ) -> Result<AvatarBody> {
        let prototype = prototypes
            .get(&body_type)
            .ok_or(RetargetError::MissingPrototype(body_type))?;
        AvatarBody::with_config(prototype.clone(), config.clone())
    }

    pub fn active(&self) -> &AvatarBody {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut AvatarBody {
        &mut self.active
    }

    pub fn active_type(&self) -> AvatarBodyType {
        self.active_type
    }

    /// 替换为指定体型的新模型（保留调试线可见性）
    ///
    /// 失败时当前模型保持不变。
    pub fn activate(&mut self, body_type: AvatarBodyType) -> Result<()> {
        let mut body = Self::instantiate(&self.prototypes, body_type, &self.config)?;
        body.set_debug_lines_visible(self.debug_lines_visible);
        self.active = body;
        self.active_type = body_type;
        log::info!("切换体型: {:?}", body_type);
        Ok(())
    }

    /// 以当前体型重新创建模型，丢弃比例调整
    pub fn reset_active_body(&mut self) -> Result<()> {
        self.activate(self.active_type)
    }

    /// 调整当前模型的身体比例
    pub fn adjust_active_body(&mut self, joints: &dyn JointSource) -> Result<ProportionReport> {
        self.active.adjust_proportions(joints)
    }

    pub fn set_debug_lines_visible(&mut self, visible: bool) {
        self.debug_lines_visible = visible;
        self.active.set_debug_lines_visible(visible);
    }
}
