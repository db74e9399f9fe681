//! 音频输出配置与直通策略.

use std::fmt;

use log::{error, info};
use sift_codec::{CodecId, profile};
use sift_core::{SampleFormat, SiftResult};
use sift_format::Stream;

/// 音频输出的样本格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// 无音频
    #[default]
    None,
    /// 无符号 8 位
    U8,
    /// 有符号 16 位
    S16,
    /// 有符号 24 位 (32 位容器)
    S24,
    /// 有符号 32 位
    S32,
    /// 32 位浮点
    F32,
}

impl AudioFormat {
    /// 由流的样本格式与原始位深映射
    ///
    /// S32 按原始位深区分 24/32 位, 其它位深与双精度浮点不支持.
    pub fn from_sample(format: SampleFormat, bits_per_raw_sample: u32) -> Self {
        match format {
            SampleFormat::U8 => Self::U8,
            SampleFormat::S16 => Self::S16,
            SampleFormat::F32 => Self::F32,
            SampleFormat::S32 => match bits_per_raw_sample {
                0 | 32 => Self::S32,
                24 => Self::S24,
                _ => Self::None,
            },
            SampleFormat::F64 | SampleFormat::None => Self::None,
        }
    }
}

/// 交给音频输出的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    /// 样本格式
    pub format: AudioFormat,
    /// 轨道原始声道数
    pub orig_channels: u32,
    /// 请求解码器输出的声道数
    pub requested_channels: u32,
    /// 编解码器
    pub codec_id: CodecId,
    /// 采样率
    pub sample_rate: u32,
    /// 是否直通
    pub passthrough: bool,
    /// DTS profile, 其它编码为 0
    pub profile: i32,
}

impl AudioParams {
    /// 无音频
    pub fn none() -> Self {
        Self {
            format: AudioFormat::None,
            orig_channels: 0,
            requested_channels: 0,
            codec_id: CodecId::None,
            sample_rate: 0,
            passthrough: false,
            profile: 0,
        }
    }
}

/// 音频输出
pub trait AudioOutput: Send {
    /// 设置输出参数
    fn set_params(&mut self, params: AudioParams);

    /// 按最近一次设置的参数重新初始化, 阻塞但有界
    fn reinit(&mut self) -> SiftResult<()>;

    /// 输出端能否自行下混
    fn can_downmix(&self) -> bool;

    /// 能否直通给定格式
    fn can_passthrough(&self, sample_rate: u32, channels: u32, codec_id: CodecId, profile: i32) -> bool;

    /// 能否直通 DTS-HD
    fn can_dts_hd(&self) -> bool;

    /// 输出端最大声道数
    fn max_channels(&self) -> u32;

    /// 输出端是否已配置了输入
    fn has_audio_in(&self) -> bool;
}

/// 不发声的音频输出
#[derive(Debug, Clone, Default)]
pub struct NullAudioOutput {
    params: Option<AudioParams>,
    reinit_count: u32,
}

impl NullAudioOutput {
    /// 创建
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次设置的参数
    pub fn params(&self) -> Option<&AudioParams> {
        self.params.as_ref()
    }

    /// 重新初始化次数
    pub fn reinit_count(&self) -> u32 {
        self.reinit_count
    }
}

impl AudioOutput for NullAudioOutput {
    fn set_params(&mut self, params: AudioParams) {
        self.params = Some(params);
    }

    fn reinit(&mut self) -> SiftResult<()> {
        self.reinit_count += 1;
        Ok(())
    }

    fn can_downmix(&self) -> bool {
        true
    }

    fn can_passthrough(&self, _: u32, _: u32, _: CodecId, _: i32) -> bool {
        false
    }

    fn can_dts_hd(&self) -> bool {
        false
    }

    fn max_channels(&self) -> u32 {
        2
    }

    fn has_audio_in(&self) -> bool {
        self.params.is_some_and(|p| p.format != AudioFormat::None)
    }
}

/// 当前音频输入的描述, 用于判断是否需要重新初始化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// 编解码器
    pub codec_id: CodecId,
    /// 样本格式
    pub format: AudioFormat,
    /// 采样率
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 是否直通
    pub passthrough: bool,
    /// 原始声道数
    pub orig_channels: u32,
    /// DTS profile
    pub profile: i32,
}

impl fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codec_id == CodecId::None {
            return f.write_str("无音频");
        }
        write!(
            f,
            "{} {:?} {}Hz {}ch",
            self.codec_id, self.format, self.sample_rate, self.channels
        )?;
        if self.passthrough {
            f.write_str(" 直通")?;
        }
        Ok(())
    }
}

/// 会话的音频状态: 直通禁止标志与当前输入
#[derive(Debug, Clone, Default)]
pub struct AudioState {
    disable_passthrough: bool,
    audio_in: Option<AudioInfo>,
}

impl AudioState {
    /// 创建
    pub fn new(disable_passthrough: bool) -> Self {
        Self {
            disable_passthrough,
            audio_in: None,
        }
    }

    /// 当前音频输入
    pub fn audio_in(&self) -> Option<&AudioInfo> {
        self.audio_in.as_ref()
    }

    /// 是否禁止直通
    pub fn passthrough_disabled(&self) -> bool {
        self.disable_passthrough
    }

    /// 流能否直通
    ///
    /// `with_profile` 为假且输出不支持 DTS-HD 时, 任何 DTS 流都按 DTS 核心判断.
    pub fn do_passthrough(&self, output: &dyn AudioOutput, stream: &Stream, with_profile: bool) -> bool {
        let Some(audio) = stream.audio() else {
            return false;
        };
        let profile = if !with_profile && stream.codec_id == CodecId::Dts && !output.can_dts_hd() {
            profile::DTS
        } else {
            audio.profile
        };
        output.can_passthrough(audio.sample_rate, audio.channels, stream.codec_id, profile)
            && !self.disable_passthrough
    }

    /// 设置直通禁止标志
    ///
    /// 一旦禁止就不再恢复. 返回是否需要重新配置音频.
    pub fn set_disable_passthrough(&mut self, disable: bool, has_selection: bool) -> bool {
        if self.disable_passthrough {
            return false;
        }
        if !has_selection {
            self.disable_passthrough = disable;
            return false;
        }
        if disable != self.disable_passthrough {
            self.disable_passthrough = disable;
            info!("{}音频直通", if disable { "禁止" } else { "允许" });
            return true;
        }
        false
    }

    /// 解码器是否需要自行下混
    pub fn decoder_will_downmix(output: &dyn AudioOutput) -> bool {
        !output.can_downmix()
    }

    /// 按选中的音频流配置输出
    ///
    /// 只有描述发生变化时才调用 `set_params` 与 `reinit`.
    /// 没有选中的流时输出被置为无音频. 返回音频输入是否变化.
    pub fn setup(
        &mut self,
        output: &mut dyn AudioOutput,
        stream: Option<&Stream>,
        orig_channels: u32,
    ) -> bool {
        let Some(stream) = stream else {
            let none = AudioInfo {
                codec_id: CodecId::None,
                format: AudioFormat::None,
                sample_rate: 0,
                channels: 0,
                passthrough: false,
                orig_channels: 0,
                profile: 0,
            };
            if self.audio_in == Some(none) {
                return false;
            }
            self.audio_in = Some(none);
            output.set_params(AudioParams::none());
            info!("没有可用的音频轨道, 音频输出置为无音频");
            return true;
        };
        let Some(audio) = stream.audio() else {
            return false;
        };

        let format = AudioFormat::from_sample(audio.sample_format, audio.bits_per_raw_sample);
        if format == AudioFormat::None {
            let bits = if audio.sample_format == SampleFormat::S32 && audio.bits_per_raw_sample > 0 {
                audio.bits_per_raw_sample
            } else {
                audio.sample_format.bytes_per_sample() * 8
            };
            error!("不支持的样本格式: {bits} 位");
            return false;
        }

        let passthrough = self.do_passthrough(&*output, stream, false);
        let mut requested_channels = audio.channels;
        if !passthrough
            && audio.channels > output.max_channels()
            && Self::decoder_will_downmix(&*output)
        {
            requested_channels = output.max_channels();
        }

        let info = AudioInfo {
            codec_id: stream.codec_id,
            format,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            passthrough,
            orig_channels,
            profile: if stream.codec_id == CodecId::Dts { audio.profile } else { 0 },
        };
        if self.audio_in == Some(info) {
            return false;
        }

        info!(
            "音频格式变化: {} -> {info}",
            self.audio_in.map_or_else(|| "未初始化".to_string(), |a| a.to_string())
        );
        self.audio_in = Some(info);
        output.set_params(AudioParams {
            format,
            orig_channels,
            requested_channels,
            codec_id: info.codec_id,
            sample_rate: info.sample_rate,
            passthrough,
            profile: info.profile,
        });
        if let Err(e) = output.reinit() {
            error!("音频输出重新初始化失败: {e}");
        }
        true
    }
}
