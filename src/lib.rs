//! # Sift
//!
//! 纯 Rust 实现的媒体播放解复用与轨道选择核心.
//!
//! Sift 负责播放器中位于容器与解码器之间的那一层:
//! - **流分类**: 把容器里的流整理成视频、音频、字幕、图文电视、闭路字幕等轨道
//! - **轨道选择**: 按语言偏好与编码优先级自动选择音频轨道
//! - **格式变化检测**: 逐包检测 MPEG-2 / H.264 的画面参数变化与 GOP 起点
//! - **位置表与定位**: 维护关键帧间隔与帧号到字节偏移的索引, 按帧号定位
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use sift::player::{DecodeType, DecoderSession, NullAudioOutput, NullHost, SessionConfig};
//!
//! let mut session = DecoderSession::new(
//!     SessionConfig::default(),
//!     Box::new(NullHost),
//!     Box::new(NullAudioOutput::new()),
//! );
//! session.open_file("recording.ts").expect("打开失败");
//! while session.get_frame(DecodeType::AudioVideo) {}
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `sift-core` | 错误类型, 有理数与时间戳, 语言代码 |
//! | `sift-codec` | 编解码器标识, 数据包, 解码上下文, 码流解析器 |
//! | `sift-format` | 字节源, 解封装器, MPEG-TS, 节目映射表 |
//! | `sift-player` | 解码会话, 轨道选择, 格式变化检测, 定位 |

/// 核心类型与工具
pub use sift_core as core;

/// 编解码器标识与码流解析
pub use sift_codec as codec;

/// 容器格式
pub use sift_format as format;

/// 播放核心
pub use sift_player as player;

/// 获取 Sift 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码上下文的注册表
pub fn default_codec_registry() -> sift_codec::CodecRegistry {
    let mut registry = sift_codec::CodecRegistry::new();
    sift_codec::register_all(&mut registry);
    registry
}
