//! 重定向配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 四肢长度匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimbSymmetry {
    /// 左右取平均，两侧使用同一比例（两侧强制等长）
    Averaged,
    /// 每侧按自己的测量结果单独计算比例
    PerSide,
}

/// 重定向配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct RetargetConfig {
    // ========== FABRIK ==========
    /// 最大迭代次数，默认 10
    pub fabrik_max_iterations: u32,
    /// 收敛精度（世界单位），默认 0.001
    pub fabrik_precision: f32,

    // ========== 姿态 ==========
    /// 握拳时每节指骨绕本地 X 轴的弯曲角度（度），默认 45
    pub finger_curl_degrees: f32,
    /// 面部旋转的偏航修正（度），默认 180
    /// 传感器空间中 forward 朝向背面
    pub head_yaw_fix_degrees: f32,
    /// 初始化时将模型绕 Y 轴旋转 180°，使其面向相机
    pub face_camera: bool,

    // ========== 比例调整 ==========
    /// 四肢长度匹配策略，默认左右平均
    pub limb_symmetry: LimbSymmetry,

    // ========== 关节数据源 ==========
    /// 面部旋转平滑系数 [0, 1]，默认 0.25
    pub head_smoothing: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            // ====== FABRIK ======
            // 迭代上限保证每条链每帧的最坏开销
            fabrik_max_iterations: 10,
            fabrik_precision: 0.001,

            // ====== 姿态 ======
            finger_curl_degrees: 45.0,
            head_yaw_fix_degrees: 180.0,
            face_camera: true,

            // ====== 比例调整 ======
            limb_symmetry: LimbSymmetry::Averaged,

            // ====== 关节数据源 ======
            head_smoothing: 0.25,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static RETARGET_CONFIG: Lazy<RwLock<RetargetConfig>> = Lazy::new(|| {
    RwLock::new(RetargetConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> RetargetConfig {
    RETARGET_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: RetargetConfig) {
    *RETARGET_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *RETARGET_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = RetargetConfig::default();
}
