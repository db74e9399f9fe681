//! 流分类: 为每个流建立轨道并打开解码上下文.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use sift_codec::{CodecId, CodecParameters, Decoder};
use sift_core::rational::rescale_q;
use sift_core::{LanguageKey, MediaType, Rational, SiftError, SiftResult};
use sift_format::{Disposition, Stream};

use super::{DecoderSession, lock_unpoisoned};
use crate::captions::{raw_text_track, scan_carousel, scan_teletext};
use crate::config::SpecialDecode;
use crate::format_change::VideoFormat;
use crate::hwaccel::select_video_path;
use crate::timing::{NTSC_FPS, display_aspect, normalized_fps};
use crate::track::{StreamInfo, TrackType};

/// H.264 流未声明码率时的估计值
const H264_DEFAULT_BIT_RATE: u64 = 500_000;

/// 按流描述构造解码参数
pub(super) fn codec_parameters(stream: &Stream) -> CodecParameters {
    let mut params = CodecParameters::new(stream.codec_id);
    params.extra_data = stream.extra_data.clone();
    params.bit_rate = stream.bit_rate;
    if let Some(v) = stream.video() {
        params.width = v.width;
        params.height = v.height;
        params.frame_rate = v.frame_rate;
    }
    if let Some(a) = stream.audio() {
        params.sample_rate = a.sample_rate;
        params.channels = a.channels;
        params.sample_format = a.sample_format;
        params.profile = a.profile;
    }
    params
}

impl DecoderSession {
    /// 容器起始时间与时长
    ///
    /// 容器没有给出时用视频流推算. 直播时长没有意义, 不推算.
    pub(super) fn update_stream_timings(&mut self) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        let demuxer = &source.demuxer;
        let live = self.config.live_tv;
        let videos = || {
            demuxer
                .streams()
                .iter()
                .filter(|s| s.media_type == MediaType::Video)
        };

        self.start_time_us = demuxer
            .start_time()
            .or_else(|| videos().filter_map(Stream::start_time_us).min());
        self.duration_us = if live {
            None
        } else {
            demuxer.duration().or_else(|| {
                videos()
                    .filter(|s| s.duration > 0 && s.time_base.is_nonzero())
                    .map(|s| rescale_q(s.duration, s.time_base, Rational::MICRO))
                    .max()
            })
        };
        debug!(
            "起始时间 {:?} us, 时长 {:?} us",
            self.start_time_us, self.duration_us
        );
    }

    /// 扫描全部流, 重建轨道列表并打开解码上下文
    ///
    /// 只有选中视频流的上下文打开失败会返回错误, 其余问题记录日志后跳过该流.
    pub(super) fn scan_streams(&mut self, no_video: bool) -> SiftResult<()> {
        let lock = Arc::clone(&self.decode_lock);
        let _guard = lock_unpoisoned(&lock);

        self.tracks.clear_all();
        self.tracks.reset_selection();
        self.captions.scan_pmt(None, 0);
        self.video_path = None;

        let streams: Vec<Stream> = self.streams().to_vec();
        self.contexts.resize_with(streams.len(), || None);
        self.contexts.truncate(streams.len());

        let mut total_bit_rate: u64 = 0;
        let mut audio_langs: HashMap<LanguageKey, u32> = HashMap::new();
        let mut subtitle_langs: HashMap<LanguageKey, u32> = HashMap::new();

        for stream in &streams {
            let i = stream.index;
            if stream.codec_id == CodecId::DvbTeletext {
                let pmt = self.source.as_ref().and_then(|s| s.demuxer.pmt());
                scan_teletext(pmt, i, &mut self.tracks);
                continue;
            }

            match stream.media_type {
                MediaType::Video => {
                    total_bit_rate += if stream.codec_id == CodecId::H264 && stream.bit_rate == 0 {
                        H264_DEFAULT_BIT_RATE
                    } else {
                        stream.bit_rate
                    };
                    if no_video {
                        debug!("忽略视频流 #{i}");
                        continue;
                    }
                    if stream.codec_id == CodecId::None {
                        warn!("视频流 #{i} 编码未知, 跳过");
                        continue;
                    }
                    if !self.registry.has_decoder(stream.codec_id) {
                        warn!("视频流 #{i} ({}) 没有可用的解码器, 跳过", stream.codec_id);
                        continue;
                    }

                    let first = self.tracks.count(TrackType::Video) == 0;
                    self.tracks.push(
                        TrackType::Video,
                        StreamInfo::new(i, stream.language(), 0),
                    );
                    if first {
                        self.tracks.select(TrackType::Video, Some(0));
                        self.init_video_codec(stream)?;
                        let pmt = self
                            .source
                            .as_ref()
                            .and_then(|s| s.demuxer.pmt());
                        self.captions.scan_pmt(pmt, i);
                        self.captions.update_tracks(&mut self.tracks);
                    } else if let Err(e) = self.open_context(stream, codec_parameters(stream)) {
                        warn!("打开视频流 #{i} 的解码上下文失败: {e}");
                    }
                }
                MediaType::Audio => {
                    total_bit_rate += stream.bit_rate;
                    let channels = stream.channels();
                    if channels == 0 {
                        warn!("音频流 #{i} 声道数未知, 跳过");
                        continue;
                    }
                    if !self.registry.has_decoder(stream.codec_id) {
                        warn!("音频流 #{i} ({}) 没有可用的解码器, 跳过", stream.codec_id);
                        continue;
                    }
                    if let Err(e) = self.open_context(stream, codec_parameters(stream)) {
                        warn!("打开音频流 #{i} 的解码上下文失败: {e}");
                        continue;
                    }

                    let language = stream.language();
                    let lang_index = language_index(&mut audio_langs, language);
                    let info = StreamInfo::new(i, language, lang_index)
                        .with_stream_id(stream.id as i32)
                        .with_channels(channels);
                    let dual = stream.audio().is_some_and(|a| a.dual_language);
                    if dual {
                        let second = language_index(&mut audio_langs, language);
                        let mut other = info.clone().with_substream(1);
                        other.language_index = second;
                        self.tracks.push(TrackType::Audio, info.with_substream(0));
                        self.tracks.push(TrackType::Audio, other);
                    } else {
                        self.tracks.push(TrackType::Audio, info);
                    }
                    info!(
                        "音频轨道 #{} 为 {} 声道 {} (语言 {}{})",
                        self.tracks.count(TrackType::Audio),
                        channels,
                        stream.codec_id,
                        language.name(),
                        if dual { ", 双单声道" } else { "" }
                    );
                }
                MediaType::Subtitle => {
                    total_bit_rate += stream.bit_rate;
                    if stream.codec_id == CodecId::Text {
                        self.tracks.push(TrackType::RawText, raw_text_track(stream));
                        continue;
                    }
                    if !self.registry.has_decoder(stream.codec_id) {
                        debug!("字幕流 #{i} ({}) 没有可用的解码器, 跳过", stream.codec_id);
                        continue;
                    }
                    if let Err(e) = self.open_context(stream, codec_parameters(stream)) {
                        warn!("打开字幕流 #{i} 的解码上下文失败: {e}");
                        continue;
                    }
                    let language = stream.language();
                    let index = language_index(&mut subtitle_langs, language);
                    let mut info =
                        StreamInfo::new(i, language, index).with_stream_id(stream.id as i32);
                    info.forced = stream.disposition.contains(Disposition::FORCED);
                    info!(
                        "字幕轨道 #{} 语言 {}{}",
                        self.tracks.count(TrackType::Subtitle),
                        language.name(),
                        if info.forced { " (强制)" } else { "" }
                    );
                    self.tracks.push(TrackType::Subtitle, info);
                }
                MediaType::Attachment => {
                    if stream.codec_id == CodecId::Ttf {
                        let info = StreamInfo::new(i, stream.language(), 0)
                            .with_stream_id(stream.id as i32);
                        self.tracks.push(TrackType::Attachment, info);
                    }
                }
                MediaType::Data | MediaType::Unknown => {
                    total_bit_rate += stream.bit_rate;
                }
            }
        }

        self.bitrate_kbps = total_bit_rate.div_ceil(1000);

        if self.tracks.count(TrackType::Video) == 0 {
            self.fps = if self.config.is_ntsc_family() { NTSC_FPS } else { 25.0 };
            debug!("没有视频轨道, 帧率取 {:.3}", self.fps);
        }

        let boot_infos = self.pmt().map(scan_carousel).unwrap_or_default();
        if let Some(itv) = self.interactive.as_mut() {
            for info in &boot_infos {
                itv.set_net_boot_info(info);
            }
        }

        info!(
            "找到 {} 条视频, {} 条音频, {} 条字幕轨道",
            self.tracks.count(TrackType::Video),
            self.tracks.count(TrackType::Audio),
            self.tracks.count(TrackType::Subtitle)
        );
        Ok(())
    }

    /// 为选中的视频流确定解码路径并打开上下文
    fn init_video_codec(&mut self, stream: &Stream) -> SiftResult<()> {
        let (width, height, sar) = stream
            .video()
            .map_or((0, 0, Rational::new(1, 1)), |v| (v.width, v.height, v.sample_aspect_ratio));

        let path = select_video_path(
            &self.capabilities,
            stream.codec_id,
            width,
            height,
            self.config.disallow_hardware_decode,
        );
        info!("视频流 #{} 使用解码路径 {path}", stream.index);

        let special = self.config.special_decode;
        let mut params = codec_parameters(stream);
        params.thread_count = self.config.decode_threads(path.is_hardware());
        params.fast = !special.is_empty();
        self.lowres = 0;
        if stream.codec_id.is_mpeg_video() && special.contains(SpecialDecode::LOW_RES) {
            self.lowres = 2;
        }
        params.lowres = self.lowres;
        if stream.codec_id == CodecId::H264 && special.contains(SpecialDecode::NO_LOOP_FILTER) {
            params.skip_loop_filter = true;
        }

        if let Err(e) = self.open_context(stream, params) {
            error!("打开视频解码上下文失败 ({}): {e}", stream.codec_id);
            return Err(e);
        }
        self.video_path = Some(path);

        self.fps = normalized_fps(stream, self.format_name());
        let format = if width == 0 || height == 0 {
            // 尺寸要等第一个序列头才知道
            VideoFormat {
                width: 640,
                height: 480,
                aspect: 4.0 / 3.0,
                fps: NTSC_FPS,
            }
        } else {
            VideoFormat {
                width: width >> self.lowres,
                height: height >> self.lowres,
                aspect: display_aspect(width, height, sar),
                fps: self.fps,
            }
        };
        self.format_detector.set_current(format);
        self.host.set_keyframe_distance(self.keyframes.distance());
        self.host.set_video_params(&format);
        Ok(())
    }

    /// 打开流的解码上下文
    ///
    /// 已有同编码的上下文时沿用.
    pub(super) fn open_context(&mut self, stream: &Stream, params: CodecParameters) -> SiftResult<()> {
        let i = stream.index;
        if i >= self.contexts.len() {
            return Err(SiftError::StreamNotFound(i));
        }
        if let Some(ctx) = &self.contexts[i] {
            if ctx.codec_id() == stream.codec_id && ctx.is_open() {
                warn!("流 #{i} 的解码上下文已打开, 沿用");
                return Ok(());
            }
        }
        let mut ctx: Box<dyn Decoder> = self.registry.create_decoder(stream.codec_id)?;
        ctx.open(&params)?;
        debug!("流 #{i} 打开解码器 {}", ctx.name());
        self.contexts[i] = Some(ctx);
        Ok(())
    }
}

/// 取语言的下一个序号
fn language_index(counts: &mut HashMap<LanguageKey, u32>, language: LanguageKey) -> u32 {
    let n = counts.entry(language).or_insert(0);
    let index = *n;
    *n += 1;
    index
}
