//! # sift-codec
//!
//! Sift 编解码器层: 编解码器标识、压缩数据包、解码上下文抽象,
//! 以及格式变化检测所需的码流解析器.
//!
//! 实际的音视频解码在下游完成, 这里的解码上下文只负责打开/刷新
//! 等生命周期管理, 以便播放核心统一持有 "每个流一个上下文".
//!
//! ## 使用示例
//!
//! ```rust
//! use sift_codec::{CodecId, CodecRegistry};
//!
//! let mut reg = CodecRegistry::new();
//! sift_codec::register_all(&mut reg);
//! assert!(reg.has_decoder(CodecId::Mpeg2Video));
//! let decoder = reg.create_decoder(CodecId::Ac3).unwrap();
//! assert_eq!(decoder.codec_id(), CodecId::Ac3);
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod packet;
pub mod parsers;
pub mod registry;

// 重导出常用类型
pub use codec_id::{CodecId, profile};
pub use codec_parameters::CodecParameters;
pub use decoder::Decoder;
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码上下文
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}
