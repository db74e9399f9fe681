//! # sift-player
//!
//! Sift 播放核心: 打开容器后对流分类、选择轨道, 读循环中检测视频格式变化
//! 与 GOP 起点, 维护关键帧间隔与位置表, 并按帧号定位.
//!
//! 对外的入口是 [`DecoderSession`]. 播放器通过 [`PlayerHost`]、[`AudioOutput`]、
//! [`PacketSink`] 等 trait 接入会话.

pub mod audio;
pub mod captions;
pub mod config;
pub mod format_change;
pub mod hwaccel;
pub mod keyframe;
pub mod position_map;
pub mod select;
pub mod session;
pub mod timing;
pub mod track;

// 重导出常用类型
pub use audio::{AudioFormat, AudioInfo, AudioOutput, AudioParams, NullAudioOutput};
pub use captions::CaptionServiceSource;
pub use config::{ConfigError, HwBackend, HwBackendConfig, SessionConfig, SpecialDecode};
pub use format_change::{VideoEvent, VideoFormat};
pub use hwaccel::{CodecCapability, VideoCodecPath};
pub use keyframe::KeyframeTracker;
pub use position_map::{PositionMap, PositionMapEntry, PositionMapSource};
pub use session::{
    DecodeType, DecoderSession, InteractiveContent, NullHost, PacketSink, PlayerHost,
    SubstreamChange,
};
pub use track::{StreamInfo, TrackType, Tracks};
