//! 会话配置.
//!
//! 配置在会话构造前一次性确定, 可从 JSON 文件加载, 缺省字段取默认值.

use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sift_core::LanguageKey;
use thiserror::Error;

bitflags! {
    /// 特殊解码提示, 以画质换取解码速度
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SpecialDecode: u32 {
        /// MPEG-1/2 跳过顶部与底部宏块行
        const FEW_BLOCKS = 0x0001;
        /// MPEG-1/2 低分辨率解码
        const LOW_RES = 0x0002;
        /// 强制单线程解码
        const SINGLE_THREADED = 0x0004;
        /// H.264 跳过环路滤波
        const NO_LOOP_FILTER = 0x0008;
        /// 跳过 IDCT, 只解析码流
        const NO_DECODE = 0x0010;
    }
}

/// 硬件解码后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwBackend {
    /// VDPAU
    Vdpau,
    /// VA-API
    Vaapi,
    /// DXVA2
    Dxva2,
}

impl HwBackend {
    /// 后端名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Vdpau => "vdpau",
            Self::Vaapi => "vaapi",
            Self::Dxva2 => "dxva2",
        }
    }
}

/// 一个启用的硬件后端及其能力上限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwBackendConfig {
    /// 后端
    pub backend: HwBackend,
    /// 最大宽度
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// 最大高度
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// 支持的 MPEG 版本号, 为空时使用后端默认集合
    #[serde(default)]
    pub mpeg_versions: Vec<u8>,
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1088
}

impl HwBackendConfig {
    /// 使用默认上限创建
    pub fn new(backend: HwBackend) -> Self {
        Self {
            backend,
            max_width: default_max_width(),
            max_height: default_max_height(),
            mpeg_versions: Vec::new(),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 界面语言
    pub ui_language: LanguageKey,
    /// 音频语言偏好 (按优先级)
    pub language_preference: Vec<LanguageKey>,
    /// 禁止硬件解码
    pub disallow_hardware_decode: bool,
    /// 启用的硬件后端 (按优先级)
    pub hardware_backends: Vec<HwBackendConfig>,
    /// 特殊解码提示
    pub special_decode: SpecialDecode,
    /// 解码线程数上限
    pub max_threads: u32,
    /// 精确定位 (解码丢弃到目标帧)
    pub exact_seeks: bool,
    /// 忽略视频流
    pub no_video: bool,
    /// 电视制式, 没有视频流时决定默认帧率
    pub tv_format: String,
    /// 初始禁止音频直通
    pub disable_passthrough: bool,
    /// 直播模式
    pub live_tv: bool,
    /// 正在观看录制中的节目
    pub watching_recording: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ui_language: LanguageKey::from_code("eng"),
            language_preference: Vec::new(),
            disallow_hardware_decode: false,
            hardware_backends: Vec::new(),
            special_decode: SpecialDecode::empty(),
            max_threads: 1,
            exact_seeks: false,
            no_video: false,
            tv_format: "ntsc".to_string(),
            disable_passthrough: false,
            live_tv: false,
            watching_recording: false,
        }
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取文件失败
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析失败
    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SessionConfig {
    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// 是否为 NTSC 系列制式 (默认帧率 29.97)
    pub fn is_ntsc_family(&self) -> bool {
        matches!(
            self.tv_format.to_ascii_lowercase().as_str(),
            "ntsc" | "ntsc-jp" | "pal-m" | "atsc"
        )
    }

    /// 实际使用的解码线程数
    pub fn decode_threads(&self, hardware: bool) -> u32 {
        if hardware || self.special_decode.contains(SpecialDecode::SINGLE_THREADED) {
            1
        } else {
            self.max_threads.max(1)
        }
    }
}
