//! 码流解析器.
//!
//! 只解析格式变化检测需要的头部信息, 不做完整解码:
//! - `mpeg2`: MPEG-1/2 起始码扫描与序列头
//! - `h264`: Annex B NAL 分割, SPS/PPS 与增量式帧边界解析

pub mod h264;
pub mod mpeg2;
