//! 流信息定义.
//!
//! 描述容器中的一条基本流: 媒体类型、编解码器、时间基、回绕位宽、
//! 帧率候选、处置标志以及语言等元数据.

use bitflags::bitflags;
use sift_codec::{CodecId, profile};
use sift_core::{LanguageKey, MediaType, Rational, SampleFormat};
use sift_core::timestamp::NOPTS_VALUE;

bitflags! {
    /// 流处置标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Disposition: u32 {
        /// 容器声明的默认轨道
        const DEFAULT = 0x0001;
        /// 强制字幕
        const FORCED = 0x0040;
        /// 听障字幕
        const HEARING_IMPAIRED = 0x0080;
        /// 视障解说
        const VISUAL_IMPAIRED = 0x0100;
    }
}

/// 流信息
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 容器分配的流标识 (TS 中为 PID)
    pub id: u32,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 起始时间 (以 time_base 为单位, `NOPTS_VALUE` 表示未知)
    pub start_time: i64,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 时间戳回绕位宽 (TS 为 33)
    pub pts_wrap_bits: u32,
    /// 平均帧率
    pub avg_frame_rate: Rational,
    /// 估计的真实基础帧率
    pub r_frame_rate: Rational,
    /// 编解码器时间基
    pub codec_time_base: Rational,
    /// 每帧包含的 codec_time_base 刻度数
    pub ticks_per_frame: u32,
    /// 处置标志
    pub disposition: Disposition,
    /// DVB 组件标签 (stream_identifier_descriptor)
    pub component_tag: Option<i32>,
    /// 编解码器私有数据
    pub extra_data: Vec<u8>,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
    /// 流特定参数
    pub params: StreamParams,
    /// 元数据 (language, filename 等)
    pub metadata: Vec<(String, String)>,
}

/// 流特定参数
#[derive(Debug, Clone, PartialEq)]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 字幕流
    Subtitle,
    /// 其他
    Other,
}

/// 视频流参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamParams {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 采样宽高比 (SAR)
    pub sample_aspect_ratio: Rational,
    /// 编解码器上报的帧率
    pub frame_rate: Rational,
}

/// 音频流参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数 (0 表示未知)
    pub channels: u32,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 原始采样位宽 (0 表示未知)
    pub bits_per_raw_sample: u32,
    /// 编解码器 profile (如 DTS-HD MA)
    pub profile: i32,
    /// 一条流中是否携带两种语言 (双单声道)
    pub dual_language: bool,
}

impl Default for AudioStreamParams {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            channels: 0,
            sample_format: SampleFormat::None,
            bits_per_raw_sample: 0,
            profile: profile::UNKNOWN,
            dual_language: false,
        }
    }
}

impl Stream {
    /// 创建指定类型的空流
    pub fn new(index: usize, codec_id: CodecId) -> Self {
        let media_type = codec_id.media_type();
        let params = match media_type {
            MediaType::Video => StreamParams::Video(VideoStreamParams {
                width: 0,
                height: 0,
                sample_aspect_ratio: Rational::new(1, 1),
                frame_rate: Rational::UNDEFINED,
            }),
            MediaType::Audio => StreamParams::Audio(AudioStreamParams::default()),
            MediaType::Subtitle => StreamParams::Subtitle,
            _ => StreamParams::Other,
        };
        Self {
            index,
            id: 0,
            media_type,
            codec_id,
            time_base: Rational::UNDEFINED,
            start_time: NOPTS_VALUE,
            duration: -1,
            pts_wrap_bits: 64,
            avg_frame_rate: Rational::UNDEFINED,
            r_frame_rate: Rational::UNDEFINED,
            codec_time_base: Rational::UNDEFINED,
            ticks_per_frame: 1,
            disposition: Disposition::empty(),
            component_tag: None,
            extra_data: Vec::new(),
            bit_rate: 0,
            params,
            metadata: Vec::new(),
        }
    }

    /// 查找元数据
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// 设置元数据 (覆盖已有键)
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key.to_string(), value)),
        }
    }

    /// 流语言, 未声明时为 `und`
    pub fn language(&self) -> LanguageKey {
        self.metadata_value("language")
            .map(LanguageKey::from_code)
            .unwrap_or_default()
    }

    /// 视频参数
    pub fn video(&self) -> Option<&VideoStreamParams> {
        match &self.params {
            StreamParams::Video(v) => Some(v),
            _ => None,
        }
    }

    /// 音频参数
    pub fn audio(&self) -> Option<&AudioStreamParams> {
        match &self.params {
            StreamParams::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// 可变音频参数
    pub fn audio_mut(&mut self) -> Option<&mut AudioStreamParams> {
        match &mut self.params {
            StreamParams::Audio(a) => Some(a),
            _ => None,
        }
    }

    /// 可变视频参数
    pub fn video_mut(&mut self) -> Option<&mut VideoStreamParams> {
        match &mut self.params {
            StreamParams::Video(v) => Some(v),
            _ => None,
        }
    }

    /// 声道数, 非音频流为 0
    pub fn channels(&self) -> u32 {
        self.audio().map_or(0, |a| a.channels)
    }

    /// 音频 profile, 非音频流为 UNKNOWN
    pub fn profile(&self) -> i32 {
        self.audio().map_or(profile::UNKNOWN, |a| a.profile)
    }

    /// 起始时间 (微秒)
    pub fn start_time_us(&self) -> Option<i64> {
        if self.start_time == NOPTS_VALUE || !self.time_base.is_nonzero() {
            return None;
        }
        Some(sift_core::rational::rescale_q(
            self.start_time,
            self.time_base,
            Rational::MICRO,
        ))
    }
}
