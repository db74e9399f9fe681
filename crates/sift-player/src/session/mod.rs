//! 解码会话.
//!
//! [`DecoderSession`] 持有容器、每个流的解码上下文、轨道状态、
//! 关键帧与位置表状态, 由单个线程驱动读循环 [`DecoderSession::get_frame`].
//!
//! 锁的划分:
//! - 解码锁 (`decode_lock`): 保护上下文的打开/刷新、容器读取以及修改轨道选择的外部命令,
//!   同时交给数据包接收端, 让下游解码与会话互斥
//! - 位置表自带的锁: 只在单次插入或读取期间持有

mod classify;
mod seek;
mod tracks;

pub use tracks::SubstreamChange;

use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use sift_codec::{CodecId, CodecRegistry, Decoder, Packet};
use sift_core::rational::rescale_q;
use sift_core::timestamp::normalize_timecode;
use sift_core::{MediaType, NOPTS_VALUE, Rational, SiftError, SiftResult, TIME_BASE};
use sift_format::demuxers::mpegts;
use sift_format::psi::ProgramMapTable;
use sift_format::{Demuxer, IoContext, Stream, TsDemuxer};

use crate::audio::{AudioInfo, AudioOutput, AudioState};
use crate::captions::{CaptionServiceSource, CaptionState};
use crate::config::SessionConfig;
use crate::format_change::{FormatChangeDetector, VideoEvent, VideoFormat};
use crate::hwaccel::{CodecCapability, VideoCodecPath, build_capabilities};
use crate::keyframe::{KeyframeTracker, PtsFaultDetector};
use crate::position_map::{PositionMap, PositionMapEntry, PositionMapSource};
use crate::track::{TrackType, Tracks};

/// 探测格式时读取的字节数
pub const PROBE_BUFFER_SIZE: usize = 188 * 64;

/// 没有位置表时的默认关键帧间隔
const DEFAULT_KEYFRAME_DISTANCE: u32 = 15;

/// 读循环连续收到 "稍后重试" 的上限, 超过后把控制权交还调用方
const MAX_TRY_AGAIN: u32 = 64;

// ============================================================
// 外部协作者
// ============================================================

/// 拥有会话的播放器
///
/// 所有方法都有空实现, 按需覆盖.
pub trait PlayerHost: Send {
    /// 视频画面参数变化
    fn set_video_params(&mut self, _format: &VideoFormat) {}

    /// 关键帧间隔变化
    fn set_keyframe_distance(&mut self, _distance: u32) {}

    /// 文件长度 (秒与帧数)
    fn set_file_length(&mut self, _seconds: u64, _frames: u64) {}

    /// 节目时长 (秒)
    fn set_duration(&mut self, _seconds: u64) {}

    /// 已播放帧数 (定位后)
    fn set_frames_played(&mut self, _frames: i64) {}

    /// 丢弃已解码排队的视频帧
    fn discard_video_frames(&mut self, _next_is_keyframe: bool) {}

    /// 丢弃刚解码出的一帧 (定位后跳帧)
    fn discard_decoded_frame(&mut self) {}

    /// 当前播放速度, 0 表示暂停
    fn play_speed(&self) -> f32 {
        1.0
    }

    /// 是否停在光盘菜单或静止帧中
    fn is_in_still_frame(&self) -> bool {
        false
    }
}

/// 什么也不做的播放器
#[derive(Debug, Default)]
pub struct NullHost;

impl PlayerHost for NullHost {}

/// 数据包接收端 (下游音频或视频解码器)
pub trait PacketSink: Send {
    /// 交出一个数据包, 返回是否被消费
    ///
    /// 返回 `false` 时读循环继续读取下一个数据包.
    /// `lock` 为会话的解码锁, 解码期间由接收端自行持有.
    fn accept(&mut self, stream: &Stream, packet: &Packet, lock: &Mutex<()>) -> bool;
}

impl<F> PacketSink for F
where
    F: FnMut(&Stream, &Packet, &Mutex<()>) -> bool + Send,
{
    fn accept(&mut self, stream: &Stream, packet: &Packet, lock: &Mutex<()>) -> bool {
        self(stream, packet, lock)
    }
}

/// 交互内容引擎 (MHEG 等)
pub trait InteractiveContent: Send {
    /// 数据广播中的网络启动信息
    fn set_net_boot_info(&mut self, data: &[u8]);

    /// 初始选中的 (音频, 视频) 组件标签
    fn initial_component_tags(&self) -> (Option<i32>, Option<i32>) {
        (None, None)
    }
}

/// `get_frame` 要求的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeType {
    /// 只要视频
    Video,
    /// 只要音频
    Audio,
    /// 音视频都要
    AudioVideo,
}

impl DecodeType {
    /// 是否需要视频
    pub const fn wants_video(self) -> bool {
        matches!(self, Self::Video | Self::AudioVideo)
    }

    /// 是否需要音频
    pub const fn wants_audio(self) -> bool {
        matches!(self, Self::Audio | Self::AudioVideo)
    }
}

/// 按探测数据选择解封装器
pub fn probe_demuxer(data: &[u8]) -> Option<Box<dyn Demuxer>> {
    if mpegts::probe(data) {
        return Some(Box::new(TsDemuxer::new()));
    }
    None
}

pub(crate) fn lock_unpoisoned(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 已打开的容器
struct Source {
    io: IoContext,
    demuxer: Box<dyn Demuxer>,
}

// ============================================================
// 会话
// ============================================================

/// 解码会话
pub struct DecoderSession {
    config: SessionConfig,
    registry: CodecRegistry,
    capabilities: Vec<Box<dyn CodecCapability>>,

    host: Box<dyn PlayerHost>,
    audio_out: Box<dyn AudioOutput>,
    video_sink: Option<Box<dyn PacketSink>>,
    audio_sink: Option<Box<dyn PacketSink>>,
    caption_source: Option<Box<dyn CaptionServiceSource>>,
    interactive: Option<Box<dyn InteractiveContent>>,
    position_source: Option<Box<dyn PositionMapSource>>,

    source: Option<Source>,
    /// 每个流一个解码上下文, 以流索引访问
    contexts: Vec<Option<Box<dyn Decoder>>>,
    decode_lock: Arc<Mutex<()>>,
    stop: Arc<AtomicBool>,

    tracks: Tracks,
    captions: CaptionState,
    audio: AudioState,
    video_path: Option<VideoCodecPath>,

    format_detector: FormatChangeDetector,
    keyframes: KeyframeTracker,
    pts_detector: PtsFaultDetector,
    position_map: Arc<PositionMap>,

    fps: f64,
    bitrate_kbps: u64,
    lowres: u8,
    start_time_us: Option<i64>,
    duration_us: Option<i64>,
    frames_read: i64,
    frames_played: i64,
    total_duration_us: i64,
    /// 最近一个视频包的时间 (毫秒)
    last_video_pts_ms: i64,
    /// 只要音频时暂存的视频包
    stored_packets: VecDeque<Packet>,
    just_after_change: bool,
    no_dts_hack: bool,
    eof: bool,
    recording_has_position_map: bool,
    has_full_position_map: bool,
    dont_sync_position_map: bool,
}

impl DecoderSession {
    /// 创建会话
    pub fn new(config: SessionConfig, host: Box<dyn PlayerHost>, audio_out: Box<dyn AudioOutput>) -> Self {
        let mut registry = CodecRegistry::new();
        sift_codec::register_all(&mut registry);
        let capabilities = build_capabilities(&config.hardware_backends);
        let audio = AudioState::new(config.disable_passthrough);
        info!(
            "创建解码会话: 硬件后端 {} 个, 特殊解码 {:?}",
            capabilities.len(),
            config.special_decode
        );
        Self {
            config,
            registry,
            capabilities,
            host,
            audio_out,
            video_sink: None,
            audio_sink: None,
            caption_source: None,
            interactive: None,
            position_source: None,
            source: None,
            contexts: Vec::new(),
            decode_lock: Arc::new(Mutex::new(())),
            stop: Arc::new(AtomicBool::new(false)),
            tracks: Tracks::new(),
            captions: CaptionState::new(),
            audio,
            video_path: None,
            format_detector: FormatChangeDetector::new(),
            keyframes: KeyframeTracker::new(),
            pts_detector: PtsFaultDetector::new(),
            position_map: Arc::new(PositionMap::new()),
            fps: 0.0,
            bitrate_kbps: 0,
            lowres: 0,
            start_time_us: None,
            duration_us: None,
            frames_read: 0,
            frames_played: 0,
            total_duration_us: 0,
            last_video_pts_ms: 0,
            stored_packets: VecDeque::new(),
            just_after_change: false,
            no_dts_hack: false,
            eof: false,
            recording_has_position_map: false,
            has_full_position_map: false,
            dont_sync_position_map: false,
        }
    }

    /// 设置视频数据包接收端
    pub fn set_video_sink(&mut self, sink: Box<dyn PacketSink>) {
        self.video_sink = Some(sink);
    }

    /// 设置音频数据包接收端
    pub fn set_audio_sink(&mut self, sink: Box<dyn PacketSink>) {
        self.audio_sink = Some(sink);
    }

    /// 设置字幕服务来源
    pub fn set_caption_source(&mut self, source: Box<dyn CaptionServiceSource>) {
        self.caption_source = Some(source);
    }

    /// 设置交互内容引擎
    pub fn set_interactive(&mut self, interactive: Box<dyn InteractiveContent>) {
        self.interactive = Some(interactive);
    }

    /// 设置外部位置表
    pub fn set_position_source(&mut self, source: Box<dyn PositionMapSource>) {
        self.position_source = Some(source);
    }

    // ========================================================
    // 打开与关闭
    // ========================================================

    /// 探测并打开文件
    ///
    /// 返回值同 [`DecoderSession::open`].
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> SiftResult<bool> {
        let path = path.as_ref();
        let mut probe = Vec::with_capacity(PROBE_BUFFER_SIZE);
        std::fs::File::open(path)?
            .take(PROBE_BUFFER_SIZE as u64)
            .read_to_end(&mut probe)?;
        let Some(demuxer) = probe_demuxer(&probe) else {
            error!("探测格式失败: \"{}\"", path.display());
            return Err(SiftError::Format(format!(
                "无法识别的容器格式: {}",
                path.display()
            )));
        };
        let io = IoContext::open_read(path)?;
        self.open(io, demuxer)
    }

    /// 打开容器, 扫描流并自动选择轨道
    ///
    /// 返回是否得到了外部位置表. 打开容器失败或选中视频流的解码上下文
    /// 打开失败时返回错误, 会话不保留任何状态.
    pub fn open(&mut self, mut io: IoContext, mut demuxer: Box<dyn Demuxer>) -> SiftResult<bool> {
        self.close();

        if let Err(e) = demuxer.open(&mut io) {
            error!("打开容器失败 ({}): {e}", demuxer.format_name());
            return Err(e);
        }
        self.source = Some(Source { io, demuxer });

        self.update_stream_timings();

        if let Err(e) = self.scan_streams(self.config.no_video) {
            error!("扫描流失败: {e}");
            self.close();
            return Err(e);
        }
        self.auto_select_tracks();

        let tags = self
            .interactive
            .as_ref()
            .map_or((None, None), |itv| itv.initial_component_tags());
        if let Some(tag) = tags.0 {
            self.set_audio_by_component_tag(tag);
        }
        if let Some(tag) = tags.1 {
            self.set_video_by_component_tag(tag);
        }

        let live = self.config.live_tv;
        let watching = self.config.watching_recording;
        if self.position_source.is_some() || live || watching {
            self.recording_has_position_map |= self.sync_position_map();
            if self.recording_has_position_map && !live && !watching {
                self.has_full_position_map = true;
                self.keyframes.mark_gopset();
            }
        }

        let dur = self.duration_us.unwrap_or(0) / TIME_BASE;
        if dur > 0 && !live && !watching {
            self.host.set_duration(dur as u64);
        }

        if !self.recording_has_position_map && !live {
            info!("没有位置表, 使用容器定位");
            let secs = if dur > 0 {
                dur as f64
            } else {
                // 部分采集卡把码率报高一倍
                let bytes_per_sec = self.bitrate_kbps as f64 * 1000.0 / 8.0 / 2.0;
                let size = self.source.as_ref().and_then(|s| s.io.size()).unwrap_or(0);
                if bytes_per_sec > 0.0 { size as f64 / bytes_per_sec } else { 0.0 }
            };
            self.host.set_file_length(secs as u64, (secs * self.fps) as u64);

            let distance = if self.format_name() == "avi" { 1 } else { DEFAULT_KEYFRAME_DISTANCE };
            self.keyframes.set_distance(distance);
            self.host.set_keyframe_distance(distance);
            self.dont_sync_position_map = true;
        }

        if self.has_full_position_map {
            info!("找到完整位置表");
        } else if self.recording_has_position_map {
            info!("找到部分位置表");
        }
        info!(
            "打开成功: 格式 {}, {} 个流, 码率 {} kbps, 帧率 {:.3}",
            self.format_name(),
            self.streams().len(),
            self.bitrate_kbps,
            self.fps
        );
        self.log_chapters();

        Ok(self.recording_has_position_map)
    }

    fn log_chapters(&self) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        for (i, chapter) in source.demuxer.chapters().iter().enumerate() {
            let total = chapter.start_us as f64 / TIME_BASE as f64;
            let hours = (total / 3600.0) as i64;
            let minutes = (total / 60.0) as i64 - hours * 60;
            let secs = total - (hours * 3600 + minutes * 60) as f64;
            info!(
                "章节 {:02} @ [{hours:02}:{minutes:02}:{secs:06.3}] -> 帧 {}",
                i + 1,
                (total * self.fps) as i64
            );
        }
    }

    /// 关闭容器并清空会话状态
    ///
    /// 期望轨道保留, 以便重新打开后找回同一条轨道.
    pub fn close(&mut self) {
        if self.source.is_some() {
            debug!("关闭容器");
        }
        {
            let _guard = lock_unpoisoned(&self.decode_lock);
            self.contexts.clear();
            self.source = None;
        }
        self.tracks.clear_all();
        self.tracks.reset_selection();
        self.captions = CaptionState::new();
        self.video_path = None;
        self.format_detector = FormatChangeDetector::new();
        self.keyframes = KeyframeTracker::new();
        self.pts_detector.reset();
        self.position_map.clear();
        self.fps = 0.0;
        self.bitrate_kbps = 0;
        self.lowres = 0;
        self.start_time_us = None;
        self.duration_us = None;
        self.frames_read = 0;
        self.frames_played = 0;
        self.total_duration_us = 0;
        self.last_video_pts_ms = 0;
        self.stored_packets.clear();
        self.just_after_change = false;
        self.no_dts_hack = false;
        self.eof = false;
        self.recording_has_position_map = false;
        self.has_full_position_map = false;
        self.dont_sync_position_map = false;
    }

    // ========================================================
    // 读循环
    // ========================================================

    /// 读取并分发数据包, 直到一个所需类型的数据包被接收端消费
    ///
    /// 到达文件末尾、读取出错或收到停止请求时返回 `false`.
    pub fn get_frame(&mut self, decode_type: DecodeType) -> bool {
        if self.source.is_none() {
            return false;
        }
        {
            let lock = Arc::clone(&self.decode_lock);
            let _guard = lock_unpoisoned(&lock);
            self.auto_select_tracks_locked();
        }

        let mut try_again = 0;
        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!("读循环收到停止请求");
                return false;
            }
            self.stream_change_check();

            let replay = if decode_type.wants_video() {
                self.stored_packets.pop_front()
            } else {
                None
            };
            let (mut packet, fresh) = match replay {
                Some(packet) => (packet, false),
                None => match self.read_packet() {
                    Ok(packet) => {
                        try_again = 0;
                        (packet, true)
                    }
                    Err(SiftError::TryAgain) => {
                        try_again += 1;
                        if try_again >= MAX_TRY_AGAIN {
                            debug!("字节源持续无数据, 稍后再读");
                            return false;
                        }
                        continue;
                    }
                    Err(SiftError::Eof) => {
                        self.set_eof(true);
                        return false;
                    }
                    Err(e) => {
                        warn!("读取数据包失败: {e}");
                        self.set_eof(true);
                        return false;
                    }
                },
            };

            let Some(media_type) = self.streams().get(packet.stream_index).map(|s| s.media_type) else {
                error!("数据包流索引越界: {}", packet.stream_index);
                continue;
            };
            let index = Some(packet.stream_index);

            let consumed = match media_type {
                MediaType::Video if index == self.selected_stream(TrackType::Video) => {
                    if fresh && !self.preprocess_video_packet(&mut packet) {
                        continue;
                    }
                    if !decode_type.wants_video() {
                        self.stored_packets.push_back(packet);
                        continue;
                    }
                    self.note_video_pts(&packet);
                    let consumed = self.dispatch(TrackType::Video, &packet);
                    if consumed {
                        self.frames_played += 1;
                    }
                    consumed
                }
                MediaType::Audio if index == self.selected_stream(TrackType::Audio) => {
                    self.check_dual_language(packet.stream_index);
                    decode_type.wants_audio() && self.dispatch(TrackType::Audio, &packet)
                }
                _ => false,
            };
            if consumed {
                return true;
            }
        }
    }

    fn read_packet(&mut self) -> SiftResult<Packet> {
        let Some(source) = self.source.as_mut() else {
            return Err(SiftError::Eof);
        };
        let _guard = lock_unpoisoned(&self.decode_lock);
        source.demuxer.read_packet(&mut source.io)
    }

    fn selected_stream(&self, kind: TrackType) -> Option<usize> {
        self.tracks.selected(kind).map(|t| t.stream_index)
    }

    /// 交给接收端, 没有接收端时视为已消费
    fn dispatch(&mut self, kind: TrackType, packet: &Packet) -> bool {
        let Some(stream) = self
            .source
            .as_ref()
            .and_then(|s| s.demuxer.streams().get(packet.stream_index))
        else {
            return false;
        };
        let sink = match kind {
            TrackType::Video => self.video_sink.as_mut(),
            _ => self.audio_sink.as_mut(),
        };
        match sink {
            Some(sink) => sink.accept(stream, packet, &self.decode_lock),
            None => true,
        }
    }

    fn note_video_pts(&mut self, packet: &Packet) {
        let ts = self.pts_detector.guess(packet.pts, packet.dts);
        if ts != NOPTS_VALUE && packet.time_base.is_nonzero() {
            self.last_video_pts_ms = rescale_q(ts, packet.time_base, Rational::MILLI);
        }
    }

    /// 流集合变化时重新扫描
    fn stream_change_check(&mut self) {
        let changed = self
            .source
            .as_mut()
            .is_some_and(|s| s.demuxer.take_streams_changed());
        if !changed {
            return;
        }
        info!("流集合变化, 重新扫描");
        if let Err(e) = self.scan_streams(self.config.no_video) {
            error!("重新扫描流失败: {e}");
        }
        self.auto_select_tracks();
        self.just_after_change = true;
    }

    /// 选中音频流的双语言状态与轨道列表不一致时拆分或合并子流
    fn check_dual_language(&mut self, stream_index: usize) {
        let dual = self
            .streams()
            .get(stream_index)
            .and_then(|s| s.audio())
            .is_some_and(|a| a.dual_language);
        let split = self
            .tracks
            .list(TrackType::Audio)
            .iter()
            .any(|t| t.stream_index == stream_index && t.substream >= 0);
        if dual == split {
            return;
        }
        info!("音频流 #{stream_index} 双语言状态变化: {split} -> {dual}");
        if self.setup_audio_stream_sub_indexes(stream_index).is_some() {
            self.tracks.select(TrackType::Audio, None);
            self.auto_select_tracks();
        }
    }

    // ========================================================
    // 视频包预处理
    // ========================================================

    /// 格式变化与 GOP 检测, 返回 `false` 时丢弃该数据包
    fn preprocess_video_packet(&mut self, packet: &mut Packet) -> bool {
        let Some(stream) = self
            .source
            .as_ref()
            .and_then(|s| s.demuxer.streams().get(packet.stream_index))
        else {
            return false;
        };
        let codec_id = stream.codec_id;
        let result = if codec_id.is_mpeg_video() {
            self.format_detector
                .preprocess_mpeg(codec_id, self.lowres, &packet.data)
        } else if codec_id == CodecId::H264 {
            self.format_detector.preprocess_h264(
                &stream.extra_data,
                &packet.data,
                packet.is_keyframe,
                self.fps,
            )
        } else {
            self.format_detector.preprocess_other(packet.is_keyframe)
        };

        for event in &result.events {
            match *event {
                VideoEvent::FormatChanged(format) => self.on_format_changed(format),
                VideoEvent::GopStart { reliable } => self.handle_gop_start(packet.pos, reliable),
            }
        }
        if result.keyframe {
            packet.is_keyframe = true;
        }

        if self.frames_read == 0 && !self.just_after_change && !packet.is_keyframe {
            debug!("第一个关键帧之前的视频包被丢弃");
            return false;
        }
        if result.on_frame {
            self.frames_read += 1;
        }
        self.total_duration_us += packet.duration_us();
        self.just_after_change = false;
        true
    }

    fn on_format_changed(&mut self, format: VideoFormat) {
        self.host.set_video_params(&format);
        self.fps = format.fps;
        self.keyframes.reset_gop();
        self.pts_detector.reset();
        self.last_video_pts_ms = 0;

        if self.video_path.is_some_and(|p| p.is_hardware()) {
            if let Some(index) = self.selected_stream(TrackType::Video) {
                let _guard = lock_unpoisoned(&self.decode_lock);
                if let Some(Some(ctx)) = self.contexts.get_mut(index) {
                    debug!("硬件解码路径, 复位 {} 上下文", ctx.name());
                    ctx.flush();
                }
            }
        }
    }

    /// GOP 起点: 更新关键帧间隔, 没有权威位置表时补写位置表
    fn handle_gop_start(&mut self, pos: i64, reliable: bool) {
        let update = self
            .keyframes
            .on_gop_start(self.frames_read - 1, self.config.live_tv);
        if update.sync_position_map {
            self.sync_position_map();
        }
        if let Some(distance) = update.new_distance {
            self.host.set_keyframe_distance(distance);
        }

        if reliable
            && !self.has_full_position_map
            && !self.config.live_tv
            && !self.config.watching_recording
        {
            let last = self.position_map.last().map_or(0, |e| e.index);
            if self.frames_read > last && self.keyframes.distance() > 0 {
                self.position_map
                    .push_if_after(PositionMapEntry::new(self.frames_read, pos));
            }
        }

        if self.caption_source.is_some() {
            self.update_caption_tracks_from_streams(true, true);
        }
    }

    /// 从外部来源同步位置表, 返回是否得到了条目
    pub fn sync_position_map(&mut self) -> bool {
        if self.dont_sync_position_map {
            return false;
        }
        let Some(source) = self.position_source.as_mut() else {
            return false;
        };
        match source.load() {
            Some(entries) if !entries.is_empty() => {
                let count = entries.len();
                self.position_map.replace(entries);
                if source.is_complete() && !self.config.live_tv && !self.config.watching_recording {
                    self.has_full_position_map = true;
                }
                debug!("同步位置表: {count} 个条目");
                true
            }
            _ => false,
        }
    }

    // ========================================================
    // 状态查询
    // ========================================================

    /// 会话配置
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 容器格式名, 未打开时为空
    pub fn format_name(&self) -> &str {
        self.source.as_ref().map_or("", |s| s.demuxer.format_name())
    }

    /// 容器的全部流
    pub fn streams(&self) -> &[Stream] {
        self.source.as_ref().map_or(&[], |s| s.demuxer.streams())
    }

    /// 当前节目映射表
    pub fn pmt(&self) -> Option<&ProgramMapTable> {
        self.source.as_ref().and_then(|s| s.demuxer.pmt())
    }

    /// 节目是否包含视频
    pub fn has_video(&self) -> bool {
        if let Some(pmt) = self.pmt() {
            if (0..pmt.stream_count()).any(|i| pmt.is_video(i)) {
                return true;
            }
        }
        self.tracks.count(TrackType::Video) > 0
    }

    /// 选中视频流的解码路径
    pub fn video_path(&self) -> Option<VideoCodecPath> {
        self.video_path
    }

    /// 选中视频流的当前画面参数
    pub fn video_format(&self) -> Option<VideoFormat> {
        self.format_detector.current()
    }

    /// 当前音频输入
    pub fn audio_info(&self) -> Option<&AudioInfo> {
        self.audio.audio_in()
    }

    /// 解码上下文, 以流索引访问
    pub fn context(&self, stream_index: usize) -> Option<&dyn Decoder> {
        self.contexts.get(stream_index)?.as_deref()
    }

    /// 视频帧率
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// 全部流的码率之和 (kbps)
    pub fn bitrate_kbps(&self) -> u64 {
        self.bitrate_kbps
    }

    /// 容器起始时间 (微秒)
    pub fn start_time_us(&self) -> Option<i64> {
        self.start_time_us
    }

    /// 节目时长 (微秒)
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    /// 已读取的视频帧数
    pub fn frames_read(&self) -> i64 {
        self.frames_read
    }

    /// 已播放的视频帧数
    pub fn frames_played(&self) -> i64 {
        self.frames_played
    }

    /// 已读取视频包的累计时长 (微秒)
    pub fn total_duration_us(&self) -> i64 {
        self.total_duration_us
    }

    /// 最近一个视频包的时间 (毫秒)
    pub fn last_video_pts_ms(&self) -> i64 {
        self.last_video_pts_ms
    }

    /// PTS 与 DTS 的故障次数
    pub fn pts_faults(&self) -> (u32, u32) {
        (self.pts_detector.faulty_pts(), self.pts_detector.faulty_dts())
    }

    /// 关键帧间隔状态
    pub fn keyframes(&self) -> &KeyframeTracker {
        &self.keyframes
    }

    /// 位置表, 可在其他线程读取
    pub fn position_map(&self) -> Arc<PositionMap> {
        Arc::clone(&self.position_map)
    }

    /// 打开时是否得到了外部位置表
    pub fn recording_has_position_map(&self) -> bool {
        self.recording_has_position_map
    }

    /// 外部位置表是否完整
    pub fn has_full_position_map(&self) -> bool {
        self.has_full_position_map
    }

    /// 是否已到达文件末尾
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// 设置文件末尾标志
    pub fn set_eof(&mut self, eof: bool) {
        if eof && !self.eof {
            info!("到达文件末尾, 已读 {} 帧", self.frames_read);
        }
        self.eof = eof;
    }

    /// 停止标志, 置位后读循环在下一轮退出
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// 解码锁
    pub fn decode_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.decode_lock)
    }

    /// 把容器时间码 (毫秒) 规整到视频流起点之后
    ///
    /// 没有视频流时返回 0.
    pub fn normalize_video_timecode(&self, timecode_ms: i64) -> i64 {
        let Some(stream) = self.streams().iter().find(|s| s.media_type == MediaType::Video) else {
            return 0;
        };
        normalize_timecode(
            timecode_ms,
            stream.time_base,
            stream.pts_wrap_bits,
            self.start_time_us,
        )
    }
}

#[cfg(test)]
mod tests;
