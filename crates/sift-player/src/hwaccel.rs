//! 硬件解码能力查询.
//!
//! 每个启用的后端一个能力提供者, 按配置顺序询问. 后端只根据声明的
//! 尺寸上限与 MPEG 版本集合回答, 不触碰真实设备.

use std::fmt;

use log::debug;
use sift_codec::CodecId;

use crate::config::{HwBackend, HwBackendConfig};

/// 视频解码路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecPath {
    /// 软件解码
    Software(CodecId),
    /// 硬件解码
    Hardware(HwBackend, CodecId),
}

impl VideoCodecPath {
    /// 解码路径对应的编解码器
    pub fn codec_id(&self) -> CodecId {
        match *self {
            Self::Software(id) | Self::Hardware(_, id) => id,
        }
    }

    /// 是否为硬件路径
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware(..))
    }

    /// 路径优先级, 数值越大越优先
    fn rank(&self) -> u8 {
        match self {
            Self::Software(_) => 0,
            Self::Hardware(..) => 1,
        }
    }
}

impl fmt::Display for VideoCodecPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software(id) => write!(f, "{id}"),
            Self::Hardware(backend, id) => write!(f, "{id}_{}", backend.name()),
        }
    }
}

/// 硬件编解码能力提供者
pub trait CodecCapability: Send {
    /// 后端类型
    fn backend(&self) -> HwBackend;

    /// 给定尺寸与 MPEG 版本下可用的最佳解码路径
    ///
    /// 不支持时返回 `None`, 这不是错误.
    fn best_supported_codec(
        &self,
        width: u32,
        height: u32,
        mpeg_version: u8,
        disallow_hw: bool,
    ) -> Option<VideoCodecPath>;
}

/// 声明式能力上限
#[derive(Debug, Clone)]
struct DeclaredLimits {
    backend: HwBackend,
    max_width: u32,
    max_height: u32,
    mpeg_versions: Vec<u8>,
}

impl DeclaredLimits {
    fn new(cfg: &HwBackendConfig, defaults: &[u8]) -> Self {
        let mpeg_versions = if cfg.mpeg_versions.is_empty() {
            defaults.to_vec()
        } else {
            cfg.mpeg_versions.clone()
        };
        Self {
            backend: cfg.backend,
            max_width: cfg.max_width,
            max_height: cfg.max_height,
            mpeg_versions,
        }
    }

    fn query(&self, width: u32, height: u32, mpeg_version: u8, disallow_hw: bool) -> Option<VideoCodecPath> {
        if disallow_hw || mpeg_version == 0 {
            return None;
        }
        if width > self.max_width || height > self.max_height {
            debug!(
                "{}: {}x{} 超出上限 {}x{}",
                self.backend.name(),
                width,
                height,
                self.max_width,
                self.max_height
            );
            return None;
        }
        if !self.mpeg_versions.contains(&mpeg_version) {
            return None;
        }
        let codec = codec_for_version(mpeg_version)?;
        Some(VideoCodecPath::Hardware(self.backend, codec))
    }
}

fn codec_for_version(mpeg_version: u8) -> Option<CodecId> {
    Some(match mpeg_version {
        1 => CodecId::Mpeg1Video,
        2 => CodecId::Mpeg2Video,
        3 => CodecId::H263,
        4 => CodecId::Mpeg4,
        5 => CodecId::H264,
        6 => CodecId::Vc1,
        7 => CodecId::Wmv3,
        _ => return None,
    })
}

macro_rules! declared_capability {
    ($name:ident, $backend:expr, $defaults:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone)]
        pub struct $name {
            limits: DeclaredLimits,
        }

        impl $name {
            /// 按配置创建
            pub fn new(cfg: &HwBackendConfig) -> Self {
                Self {
                    limits: DeclaredLimits::new(cfg, $defaults),
                }
            }
        }

        impl CodecCapability for $name {
            fn backend(&self) -> HwBackend {
                $backend
            }

            fn best_supported_codec(
                &self,
                width: u32,
                height: u32,
                mpeg_version: u8,
                disallow_hw: bool,
            ) -> Option<VideoCodecPath> {
                self.limits.query(width, height, mpeg_version, disallow_hw)
            }
        }
    };
}

declared_capability!(
    VdpauCapability,
    HwBackend::Vdpau,
    &[1, 2, 4, 5, 6, 7],
    "VDPAU 能力 (MPEG-1/2, MPEG-4, H.264, VC-1, WMV3)"
);
declared_capability!(
    VaapiCapability,
    HwBackend::Vaapi,
    &[2, 4, 5, 6, 7],
    "VA-API 能力 (MPEG-2, MPEG-4, H.264, VC-1, WMV3)"
);
declared_capability!(
    Dxva2Capability,
    HwBackend::Dxva2,
    &[2, 5, 6],
    "DXVA2 能力 (MPEG-2, H.264, VC-1)"
);

/// 按配置顺序构建能力提供者
pub fn build_capabilities(backends: &[HwBackendConfig]) -> Vec<Box<dyn CodecCapability>> {
    backends
        .iter()
        .map(|cfg| -> Box<dyn CodecCapability> {
            match cfg.backend {
                HwBackend::Vdpau => Box::new(VdpauCapability::new(cfg)),
                HwBackend::Vaapi => Box::new(VaapiCapability::new(cfg)),
                HwBackend::Dxva2 => Box::new(Dxva2Capability::new(cfg)),
            }
        })
        .collect()
}

/// 为视频流挑选解码路径
///
/// 每个后端询问一次; 后端给出的路径优先级不低于当前路径时替换之,
/// 因此同级别时靠后的后端胜出.
pub fn select_video_path(
    capabilities: &[Box<dyn CodecCapability>],
    codec_id: CodecId,
    width: u32,
    height: u32,
    disallow_hw: bool,
) -> VideoCodecPath {
    let mut path = VideoCodecPath::Software(codec_id);
    let version = codec_id.mpeg_version();
    for cap in capabilities {
        if let Some(candidate) = cap.best_supported_codec(width, height, version, disallow_hw) {
            if candidate.rank() >= path.rank() {
                path = candidate;
            }
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_没有后端时走软件路径() {
        let path = select_video_path(&[], CodecId::H264, 1920, 1080, false);
        assert_eq!(path, VideoCodecPath::Software(CodecId::H264));
        assert!(!path.is_hardware());
    }

    #[test]
    fn test_硬件路径替换() {
        let caps = build_capabilities(&[HwBackendConfig::new(HwBackend::Vaapi)]);
        let path = select_video_path(&caps, CodecId::Mpeg2Video, 720, 576, false);
        assert_eq!(path, VideoCodecPath::Hardware(HwBackend::Vaapi, CodecId::Mpeg2Video));
        assert_eq!(path.to_string(), "mpeg2video_vaapi");

        // 禁止硬件解码
        let path = select_video_path(&caps, CodecId::Mpeg2Video, 720, 576, true);
        assert_eq!(path, VideoCodecPath::Software(CodecId::Mpeg2Video));
    }

    #[test]
    fn test_尺寸与版本限制() {
        let caps = build_capabilities(&[HwBackendConfig {
            backend: HwBackend::Dxva2,
            max_width: 1280,
            max_height: 720,
            mpeg_versions: Vec::new(),
        }]);
        assert!(!select_video_path(&caps, CodecId::H264, 1920, 1080, false).is_hardware());
        assert!(select_video_path(&caps, CodecId::H264, 1280, 720, false).is_hardware());
        // DXVA2 默认不支持 MPEG-1
        assert!(!select_video_path(&caps, CodecId::Mpeg1Video, 352, 288, false).is_hardware());
        // HEVC 没有硬件路径
        assert!(!select_video_path(&caps, CodecId::H265, 1280, 720, false).is_hardware());
    }

    #[test]
    fn test_多个后端_靠后者胜出() {
        let caps = build_capabilities(&[
            HwBackendConfig::new(HwBackend::Vdpau),
            HwBackendConfig::new(HwBackend::Vaapi),
        ]);
        let path = select_video_path(&caps, CodecId::H264, 1920, 1080, false);
        assert_eq!(path, VideoCodecPath::Hardware(HwBackend::Vaapi, CodecId::H264));
        // 只有 VDPAU 支持 MPEG-1
        let path = select_video_path(&caps, CodecId::Mpeg1Video, 352, 288, false);
        assert_eq!(path, VideoCodecPath::Hardware(HwBackend::Vdpau, CodecId::Mpeg1Video));
    }
}
