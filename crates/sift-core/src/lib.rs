//! # sift-core
//!
//! Sift 核心库, 提供基础类型定义、错误处理和时间戳工具.
//!
//! 上层的码流解析、容器解复用与播放核心都建立在本 crate 之上.

pub mod bitreader;
pub mod error;
pub mod language;
pub mod media_type;
pub mod rational;
pub mod sample_format;
pub mod timestamp;

// 重导出常用类型
pub use error::{SiftError, SiftResult};
pub use language::LanguageKey;
pub use media_type::MediaType;
pub use rational::Rational;
pub use sample_format::SampleFormat;
pub use timestamp::{NOPTS_VALUE, TIME_BASE, Timestamp};
