//! 编解码器参数.
//!
//! 打开解码上下文时使用, 由容器流描述与会话配置共同决定.

use sift_core::{Rational, SampleFormat};

use crate::codec_id::CodecId;

/// 编解码器参数
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 额外数据 (如 SPS/PPS)
    pub extra_data: Vec<u8>,
    /// 码率 (bits/s)
    pub bit_rate: u64,
    /// 视频宽度
    pub width: u32,
    /// 视频高度
    pub height: u32,
    /// 帧率
    pub frame_rate: Rational,
    /// 音频采样率
    pub sample_rate: u32,
    /// 音频声道数
    pub channels: u32,
    /// 音频采样格式
    pub sample_format: SampleFormat,
    /// 编码规格
    pub profile: i32,
    /// 低分辨率解码级别 (宽高右移位数)
    pub lowres: u8,
    /// 跳过环路滤波
    pub skip_loop_filter: bool,
    /// 允许不符合规范的加速手段
    pub fast: bool,
    /// 解码线程数
    pub thread_count: u32,
}

impl CodecParameters {
    /// 以编解码器标识创建默认参数
    pub fn new(codec_id: CodecId) -> Self {
        Self {
            codec_id,
            extra_data: Vec::new(),
            bit_rate: 0,
            width: 0,
            height: 0,
            frame_rate: Rational::UNDEFINED,
            sample_rate: 0,
            channels: 0,
            sample_format: SampleFormat::None,
            profile: crate::codec_id::profile::UNKNOWN,
            lowres: 0,
            skip_loop_filter: false,
            fast: false,
            thread_count: 1,
        }
    }
}
