//! 容器解封装器实现.

pub mod mpegts;

pub use mpegts::TsDemuxer;
