use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sift_codec::{CodecId, Packet};
use sift_core::{Rational, SiftError, SiftResult};
use sift_format::{Chapter, Demuxer, Disposition, IoContext, MemoryBackend, SeekFlags, Stream};

use super::*;
use crate::audio::NullAudioOutput;
use crate::audio::test_util::audio_stream;
use crate::position_map::{PositionMapEntry, PositionMapSource};
use crate::track::TrackType;

// ============================================================
// 测试替身
// ============================================================

type SeekLog = Arc<Mutex<Vec<(i64, SeekFlags)>>>;

#[derive(Default)]
struct MockDemuxer {
    streams: Vec<Stream>,
    packets: VecDeque<Packet>,
    chapters: Vec<Chapter>,
    start_time: Option<i64>,
    duration: Option<i64>,
    cur_dts: Option<i64>,
    seeks: SeekLog,
    fail_open: bool,
}

impl Demuxer for MockDemuxer {
    fn format_name(&self) -> &str {
        "mock"
    }

    fn open(&mut self, _io: &mut IoContext) -> SiftResult<()> {
        if self.fail_open {
            return Err(SiftError::Format("头部损坏".into()));
        }
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, _io: &mut IoContext) -> SiftResult<Packet> {
        self.packets.pop_front().ok_or(SiftError::Eof)
    }

    fn seek(
        &mut self,
        _io: &mut IoContext,
        _stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> SiftResult<()> {
        self.seeks.lock().unwrap().push((timestamp, flags));
        Ok(())
    }

    fn flush(&mut self) {}

    fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    fn duration(&self) -> Option<i64> {
        self.duration
    }

    fn cur_dts(&self, stream_index: usize) -> Option<i64> {
        if stream_index == 0 { self.cur_dts } else { None }
    }

    fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }
}

#[derive(Debug, Default)]
struct HostLog {
    video_params: Vec<VideoFormat>,
    keyframe_distances: Vec<u32>,
    file_length: Option<(u64, u64)>,
    duration: Option<u64>,
    frames_played: Vec<i64>,
    discarded_frames: u32,
}

struct RecordingHost {
    log: Arc<Mutex<HostLog>>,
    speed: f32,
}

impl PlayerHost for RecordingHost {
    fn set_video_params(&mut self, format: &VideoFormat) {
        self.log.lock().unwrap().video_params.push(*format);
    }

    fn set_keyframe_distance(&mut self, distance: u32) {
        self.log.lock().unwrap().keyframe_distances.push(distance);
    }

    fn set_file_length(&mut self, seconds: u64, frames: u64) {
        self.log.lock().unwrap().file_length = Some((seconds, frames));
    }

    fn set_duration(&mut self, seconds: u64) {
        self.log.lock().unwrap().duration = Some(seconds);
    }

    fn set_frames_played(&mut self, frames: i64) {
        self.log.lock().unwrap().frames_played.push(frames);
    }

    fn discard_decoded_frame(&mut self) {
        self.log.lock().unwrap().discarded_frames += 1;
    }

    fn play_speed(&self) -> f32 {
        self.speed
    }
}

struct FixedMap {
    entries: Vec<PositionMapEntry>,
}

impl PositionMapSource for FixedMap {
    fn load(&mut self) -> Option<Vec<PositionMapEntry>> {
        Some(self.entries.clone())
    }

    fn is_complete(&self) -> bool {
        true
    }
}

struct TagEngine {
    boot_infos: Arc<Mutex<Vec<Vec<u8>>>>,
    audio_tag: Option<i32>,
}

impl InteractiveContent for TagEngine {
    fn set_net_boot_info(&mut self, data: &[u8]) {
        self.boot_infos.lock().unwrap().push(data.to_vec());
    }

    fn initial_component_tags(&self) -> (Option<i32>, Option<i32>) {
        (self.audio_tag, None)
    }
}

// ============================================================
// 构造辅助
// ============================================================

fn video_stream(index: usize) -> Stream {
    let mut s = Stream::new(index, CodecId::Mpeg2Video);
    s.time_base = Rational::MPEG_CLOCK;
    s.codec_time_base = Rational::new(1, 25);
    s.pts_wrap_bits = 33;
    s.bit_rate = 4_000_000;
    if let Some(v) = s.video_mut() {
        v.width = 720;
        v.height = 576;
    }
    s
}

fn seq_header() -> Vec<u8> {
    // 720x576, 16:9, 25 fps
    vec![
        0x00, 0x00, 0x01, 0xB3, 0x2D, 0x02, 0x40, 0x33, 0xFF, 0xFF, 0xE0, 0x18, 0x00, 0x00, 0x00,
        0x00,
    ]
}

fn picture() -> Vec<u8> {
    vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x0F, 0xFF, 0xF8, 0x00, 0x00, 0x01, 0x01, 0x12, 0x34]
}

fn key_payload() -> Vec<u8> {
    let mut v = seq_header();
    v.extend_from_slice(&[0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x00]);
    v.extend(picture());
    v
}

fn packet(stream_index: usize, data: Vec<u8>, pts: i64, pos: i64) -> Packet {
    let mut p = Packet::from_data(data);
    p.stream_index = stream_index;
    p.pts = pts;
    p.dts = pts;
    p.duration = 3600;
    p.time_base = Rational::MPEG_CLOCK;
    p.pos = pos;
    p
}

fn empty_io() -> IoContext {
    IoContext::new(Box::new(MemoryBackend::from_data(Vec::new())))
}

fn session_with(config: SessionConfig, speed: f32) -> (DecoderSession, Arc<Mutex<HostLog>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let log = Arc::new(Mutex::new(HostLog::default()));
    let host = RecordingHost {
        log: Arc::clone(&log),
        speed,
    };
    let session = DecoderSession::new(config, Box::new(host), Box::new(NullAudioOutput::new()));
    (session, log)
}

fn counting_sink(counter: &Arc<AtomicUsize>) -> Box<dyn PacketSink> {
    let counter = Arc::clone(counter);
    Box::new(move |_: &Stream, _: &Packet, _: &Mutex<()>| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    })
}

// ============================================================
// 打开与分类
// ============================================================

#[test]
fn test_打开并分类各类流() {
    let mut subtitle = Stream::new(3, CodecId::DvbSubtitle);
    subtitle.set_metadata("language", "fra");
    subtitle.disposition = Disposition::FORCED;
    let mut font = Stream::new(5, CodecId::Ttf);
    font.set_metadata("filename", "font.ttf");
    font.extra_data = vec![1, 2, 3];

    let demuxer = MockDemuxer {
        streams: vec![
            video_stream(0),
            audio_stream(1, CodecId::Ac3, 6, "eng"),
            audio_stream(2, CodecId::Mp2, 2, "fra"),
            subtitle,
            Stream::new(4, CodecId::Text),
            font,
            audio_stream(6, CodecId::Aac, 0, "eng"),
        ],
        duration: Some(120_000_000),
        ..Default::default()
    };
    let (mut session, log) = session_with(SessionConfig::default(), 1.0);
    assert_eq!(session.open(empty_io(), Box::new(demuxer)).unwrap(), false);

    assert_eq!(session.track_count(TrackType::Video), 1);
    // 声道数未知的流被跳过
    assert_eq!(session.track_count(TrackType::Audio), 2);
    assert_eq!(session.track_count(TrackType::Subtitle), 1);
    assert_eq!(session.track_count(TrackType::RawText), 1);
    assert_eq!(session.track_count(TrackType::Attachment), 1);

    assert_eq!(session.current_track(TrackType::Video), Some(0));
    assert_eq!(session.current_track(TrackType::Audio), Some(0));
    assert_eq!(session.current_track(TrackType::Subtitle), Some(0));
    assert!((session.fps() - 25.0).abs() < 1e-9);
    assert_eq!(session.bitrate_kbps(), 4000);
    assert_eq!(session.video_path(), Some(crate::hwaccel::VideoCodecPath::Software(CodecId::Mpeg2Video)));
    assert!(session.context(0).is_some_and(|c| c.is_open()));
    assert!(session.context(6).is_none());

    assert_eq!(session.track_description(TrackType::Audio, 0).as_deref(), Some("1: English AC3 5.1ch"));
    assert_eq!(session.track_description(TrackType::Audio, 1).as_deref(), Some("2: French MP2 2ch"));
    assert_eq!(
        session.track_description(TrackType::Subtitle, 0).as_deref(),
        Some("Subtitle 1: French (forced)")
    );
    assert_eq!(session.attachment_data(0), Some(("font.ttf", &[1u8, 2, 3][..])));
    assert!(session.attachment_data(1).is_none());

    let log = log.lock().unwrap();
    assert_eq!(log.duration, Some(120));
    assert_eq!(log.file_length, Some((120, 3000)));
    assert_eq!(log.keyframe_distances.last(), Some(&15));
    assert_eq!(log.video_params[0].width, 720);
    assert_eq!(session.keyframes().distance(), 15);
    assert!(session.audio_info().is_some_and(|a| a.codec_id == CodecId::Ac3));
}

#[test]
fn test_打开失败不保留状态() {
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        fail_open: true,
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    assert!(session.open(empty_io(), Box::new(demuxer)).is_err());
    assert!(session.streams().is_empty());
    assert!(!session.get_frame(DecodeType::AudioVideo));
}

#[test]
fn test_没有视频时按制式取帧率() {
    let demuxer = MockDemuxer {
        streams: vec![audio_stream(0, CodecId::Mp2, 2, "deu")],
        ..Default::default()
    };
    let config = SessionConfig {
        tv_format: "pal".into(),
        ..Default::default()
    };
    let (mut session, _) = session_with(config, 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.track_count(TrackType::Video), 0);
    assert!((session.fps() - 25.0).abs() < 1e-9);
    assert!(!session.has_video());
}

#[test]
fn test_忽略视频配置() {
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0), audio_stream(1, CodecId::Ac3, 2, "eng")],
        ..Default::default()
    };
    let config = SessionConfig {
        no_video: true,
        ..Default::default()
    };
    let (mut session, _) = session_with(config, 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.track_count(TrackType::Video), 0);
    // 码率仍然计入
    assert_eq!(session.bitrate_kbps(), 4000);
}

// ============================================================
// 读循环
// ============================================================

#[test]
fn test_读循环分发与暂存() {
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0), audio_stream(1, CodecId::Ac3, 2, "eng")],
        packets: VecDeque::from(vec![
            packet(0, picture(), 86_400, 0),
            packet(0, key_payload(), 90_000, 188),
            packet(1, vec![0x0B, 0x77, 0x00], 90_000, 376),
            packet(0, picture(), 93_600, 564),
            packet(1, vec![0x0B, 0x77, 0x00], 93_600, 752),
            packet(0, picture(), 97_200, 940),
        ]),
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    let video = Arc::new(AtomicUsize::new(0));
    let audio = Arc::new(AtomicUsize::new(0));
    session.set_video_sink(counting_sink(&video));
    session.set_audio_sink(counting_sink(&audio));
    session.open(empty_io(), Box::new(demuxer)).unwrap();

    // 第一个关键帧之前的包被丢弃
    assert!(session.get_frame(DecodeType::AudioVideo));
    assert_eq!(video.load(Ordering::SeqCst), 1);
    assert_eq!(session.frames_read(), 1);
    assert_eq!(session.last_video_pts_ms(), 1000);

    assert!(session.get_frame(DecodeType::AudioVideo));
    assert_eq!(audio.load(Ordering::SeqCst), 1);

    // 只要音频: 视频包暂存
    assert!(session.get_frame(DecodeType::Audio));
    assert_eq!(audio.load(Ordering::SeqCst), 2);
    assert_eq!(video.load(Ordering::SeqCst), 1);
    assert_eq!(session.frames_read(), 2);

    // 暂存的包先交出, 不重复计数
    assert!(session.get_frame(DecodeType::Video));
    assert_eq!(video.load(Ordering::SeqCst), 2);
    assert_eq!(session.frames_read(), 2);
    assert!(session.get_frame(DecodeType::Video));
    assert_eq!(video.load(Ordering::SeqCst), 3);
    assert_eq!(session.frames_played(), 3);
    assert_eq!(session.total_duration_us(), 3 * 40_000);

    assert!(!session.get_frame(DecodeType::Video));
    assert!(session.at_eof());
}

#[test]
fn test_接收端拒绝时继续读取() {
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        packets: VecDeque::from(vec![
            packet(0, key_payload(), 90_000, 0),
            packet(0, picture(), 93_600, 188),
        ]),
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    session.set_video_sink(Box::new(move |_: &Stream, _: &Packet, _: &Mutex<()>| {
        // 只接受第二个包
        counter.fetch_add(1, Ordering::SeqCst) == 1
    }));
    session.open(empty_io(), Box::new(demuxer)).unwrap();

    assert!(session.get_frame(DecodeType::Video));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(session.frames_played(), 1);
}

#[test]
fn test_停止标志() {
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        packets: VecDeque::from(vec![packet(0, key_payload(), 90_000, 0)]),
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    session.stop_handle().store(true, Ordering::Release);
    assert!(!session.get_frame(DecodeType::Video));
    assert!(!session.at_eof());
}

// ============================================================
// 轨道操作
// ============================================================

/// 当前索引指向的轨道就是已选轨道
fn assert_current_is_selected(session: &DecoderSession) {
    let tracks = session.tracks();
    let current = tracks.current(TrackType::Audio).unwrap();
    let selected = tracks.selected(TrackType::Audio).unwrap();
    let at_current = &tracks.list(TrackType::Audio)[current];
    assert_eq!(
        (at_current.stream_index, at_current.substream),
        (selected.stream_index, selected.substream)
    );
}

#[test]
fn test_双单声道拆分与合并() {
    let demuxer = MockDemuxer {
        streams: vec![
            audio_stream(0, CodecId::Mp2, 2, "swe"),
            audio_stream(1, CodecId::Mp2, 2, "swe"),
        ],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    let before = session.tracks().list(TrackType::Audio).to_vec();
    assert_eq!((before[0].language_index, before[1].language_index), (0, 1));

    assert_eq!(session.setup_audio_stream_sub_indexes(0), Some(SubstreamChange::Split));
    let list = session.tracks().list(TrackType::Audio);
    assert_eq!(list.len(), 3);
    assert_eq!((list[0].substream, list[1].substream), (0, 1));
    assert_eq!((list[0].stream_index, list[1].stream_index), (0, 0));
    // 第二个子流不占用同语言已有轨道的序号
    assert_eq!(list[1].language_index, 2);
    let mut indexes: Vec<_> = list.iter().map(|t| t.language_index).collect();
    indexes.sort_unstable();
    indexes.dedup();
    assert_eq!(indexes.len(), 3);
    assert_current_is_selected(&session);

    assert_eq!(session.setup_audio_stream_sub_indexes(0), Some(SubstreamChange::Merged));
    assert_eq!(session.tracks().list(TrackType::Audio), &before[..]);
    assert_current_is_selected(&session);

    assert_eq!(session.setup_audio_stream_sub_indexes(7), None);
}

#[test]
fn test_子流调整后当前索引跟随已选轨道() {
    let demuxer = MockDemuxer {
        streams: vec![
            audio_stream(0, CodecId::Mp2, 2, "swe"),
            audio_stream(1, CodecId::Ac3, 6, "eng"),
        ],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.set_track(TrackType::Audio, 1), Some(1));

    assert_eq!(session.setup_audio_stream_sub_indexes(0), Some(SubstreamChange::Split));
    assert_eq!(session.current_track(TrackType::Audio), Some(2));
    assert_eq!(session.tracks().selected(TrackType::Audio).unwrap().stream_index, 1);
    assert_current_is_selected(&session);

    assert_eq!(session.setup_audio_stream_sub_indexes(0), Some(SubstreamChange::Merged));
    assert_eq!(session.current_track(TrackType::Audio), Some(1));
    assert_current_is_selected(&session);
}

#[test]
fn test_已选轨道被拆分时重新选择() {
    let demuxer = MockDemuxer {
        streams: vec![
            audio_stream(0, CodecId::Mp2, 2, "swe"),
            audio_stream(1, CodecId::Ac3, 6, "eng"),
        ],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.set_track(TrackType::Audio, 0), Some(0));

    // 子流 -1 的轨道已不存在, 选择不能再指向它
    assert_eq!(session.setup_audio_stream_sub_indexes(0), Some(SubstreamChange::Split));
    let selected = session.tracks().selected(TrackType::Audio).unwrap();
    assert_ne!((selected.stream_index, selected.substream), (0, -1));
    assert_current_is_selected(&session);
}

#[test]
fn test_双语言流扫描为两条子流() {
    let mut dual = audio_stream(0, CodecId::Mp2, 2, "swe");
    if let Some(a) = dual.audio_mut() {
        a.dual_language = true;
    }
    let demuxer = MockDemuxer {
        streams: vec![dual],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    let list = session.tracks().list(TrackType::Audio);
    assert_eq!(list.len(), 2);
    assert_eq!((list[0].language_index, list[1].language_index), (0, 1));
    assert_eq!(session.current_track(TrackType::Audio), Some(0));
}

#[test]
fn test_组件标签选择音频() {
    let mut a = audio_stream(0, CodecId::Mp2, 2, "eng");
    a.component_tag = Some(0x11);
    let mut b = audio_stream(1, CodecId::Mp2, 2, "eng");
    b.component_tag = Some(0x12);
    let boot_infos = Arc::new(Mutex::new(Vec::new()));
    let demuxer = MockDemuxer {
        streams: vec![a, b],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.set_interactive(Box::new(TagEngine {
        boot_infos: Arc::clone(&boot_infos),
        audio_tag: Some(0x12),
    }));
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.current_track(TrackType::Audio), Some(1));
    assert_eq!(session.tracks().wanted(TrackType::Audio).map(|t| t.stream_index), Some(1));

    assert!(session.set_audio_by_component_tag(0x11));
    assert_eq!(session.current_track(TrackType::Audio), Some(0));
    assert!(!session.set_audio_by_component_tag(0x33));
    assert_eq!(session.current_track(TrackType::Audio), Some(0));
    // 没有节目映射表时没有启动信息
    assert!(boot_infos.lock().unwrap().is_empty());
}

#[test]
fn test_越界选择保持原轨道() {
    let demuxer = MockDemuxer {
        streams: vec![audio_stream(0, CodecId::Mp2, 2, "eng"), audio_stream(1, CodecId::Ac3, 6, "deu")],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.set_track(TrackType::Audio, 1), Some(1));
    assert!(session.audio_info().is_some_and(|a| a.codec_id == CodecId::Ac3));
    assert_eq!(session.set_track(TrackType::Audio, 9), Some(1));
}

// ============================================================
// 章节与定位
// ============================================================

#[test]
fn test_章节() {
    let chapter = |secs: i64| Chapter {
        start_us: secs * 1_000_000,
        title: None,
    };
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        chapters: vec![chapter(0), chapter(60), chapter(120)],
        ..Default::default()
    };
    let (mut session, _) = session_with(SessionConfig::default(), 1.0);
    session.open(empty_io(), Box::new(demuxer)).unwrap();

    assert_eq!(session.chapter_count(), 3);
    assert_eq!(session.chapter_times(), vec![0, 60, 120]);
    assert_eq!(session.chapter_frame(2), 1500);
    assert_eq!(session.chapter_frame(0), -1);
    assert_eq!(session.chapter_frame(4), -1);
    assert_eq!(session.current_chapter(1600), 2);
    assert_eq!(session.current_chapter(3000), 3);

    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        chapters: vec![chapter(0)],
        ..Default::default()
    };
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    assert_eq!(session.chapter_count(), 0);
    assert!(session.chapter_times().is_empty());
    assert_eq!(session.current_chapter(10), 0);
}

fn seek_fixture(cur_dts: Option<i64>, exact: bool, speed: f32) -> (DecoderSession, Arc<Mutex<HostLog>>, SeekLog) {
    let seeks = SeekLog::default();
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        start_time: Some(1_000_000),
        cur_dts,
        seeks: Arc::clone(&seeks),
        ..Default::default()
    };
    let config = SessionConfig {
        exact_seeks: exact,
        ..Default::default()
    };
    let (mut session, log) = session_with(config, speed);
    session.open(empty_io(), Box::new(demuxer)).unwrap();
    (session, log, seeks)
}

#[test]
fn test_容器定位按解码时间戳推算落点() {
    // 起点 1 秒之后 10 秒
    let (mut session, log, seeks) = seek_fixture(Some(90_000 + 900_000), false, 1.0);
    assert!(session.do_fast_forward(260, true));

    let seeks = seeks.lock().unwrap();
    assert_eq!(seeks.len(), 1);
    assert_eq!(seeks[0].0, 1_000_000 + 10_400_000);
    assert!(!seeks[0].1.backward);
    assert_eq!(session.frames_played(), 250);
    assert_eq!(session.frames_read(), 250);
    assert_eq!(session.keyframes().last_key(), 250);
    assert_eq!(log.lock().unwrap().frames_played, vec![251]);
}

#[test]
fn test_精确定位向后并补帧() {
    let (mut session, _, seeks) = seek_fixture(Some(90_000 + 900_000), true, 1.0);
    assert!(session.do_fast_forward(260, false));
    assert!(seeks.lock().unwrap()[0].1.backward);
    // 没有数据可解码, 补帧在文件末尾停止
    assert_eq!(session.frames_played(), 250);
    assert!(session.at_eof());
}

#[test]
fn test_落点在起点之前视为零() {
    let (mut session, _, _) = seek_fixture(Some(90_000 - 3600), false, 1.0);
    assert!(session.do_rewind(10, false));
    assert_eq!(session.frames_played(), 0);
}

#[test]
fn test_没有解码时间戳时以目标为落点() {
    let (mut session, _, _) = seek_fixture(None, false, 1.0);
    let previous_key = session.keyframes().last_key();
    assert!(session.do_fast_forward(400, false));
    assert_eq!(session.frames_played(), 400);
    assert_eq!(session.frames_read(), 400);
    // 关键帧位置未知, 保持原值
    assert_eq!(session.keyframes().last_key(), previous_key);
    assert_ne!(session.keyframes().last_key(), 400);
}

#[test]
fn test_暂停逐帧不走容器定位() {
    let (mut session, log, seeks) = seek_fixture(Some(90_000), false, 0.0);
    assert!(session.do_fast_forward(1, true));
    assert!(seeks.lock().unwrap().is_empty());
    assert_eq!(log.lock().unwrap().frames_played, vec![1]);
}

#[test]
fn test_位置表定位() {
    let seeks = SeekLog::default();
    let demuxer = MockDemuxer {
        streams: vec![video_stream(0)],
        seeks: Arc::clone(&seeks),
        ..Default::default()
    };
    let (mut session, log) = session_with(SessionConfig::default(), 1.0);
    session.set_position_source(Box::new(FixedMap {
        entries: vec![
            PositionMapEntry::new(0, 0),
            PositionMapEntry::new(15, 18_800),
            PositionMapEntry::new(30, 37_600),
        ],
    }));
    assert!(session.open(empty_io(), Box::new(demuxer)).unwrap());
    assert!(session.has_full_position_map());
    assert_eq!(session.position_map().len(), 3);
    assert!(log.lock().unwrap().file_length.is_none());

    assert!(session.do_fast_forward(20, false));
    let seeks = seeks.lock().unwrap();
    assert_eq!(seeks[0].0, 18_800);
    assert!(seeks[0].1.byte);
    assert_eq!(session.frames_played(), 15);
    assert_eq!(session.keyframes().last_key(), 15);
}

#[test]
fn test_时间码规整() {
    let (session, _, _) = seek_fixture(None, false, 1.0);
    assert_eq!(session.normalize_video_timecode(1000), 0);
    assert_eq!(session.normalize_video_timecode(3000), 2000);
}
