//! sift-probe - 播放会话探测工具
//!
//! 打开一个录制文件, 打印流分类与自动选轨的结果, 读取若干数据包后
//! 报告关键帧间隔与位置表. 可选地执行一次按帧定位.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use sift_codec::Packet;
use sift_core::TIME_BASE;
use sift_format::Stream;
use sift_player::{
    DecodeType, DecoderSession, NullAudioOutput, NullHost, PacketSink, PositionMapEntry,
    SessionConfig, TrackType,
};

/// Sift 播放会话探测工具
#[derive(Parser, Debug)]
#[command(name = "sift-probe", version, about = "探测录制文件的流分类、选轨与关键帧索引")]
struct Cli {
    /// 输入文件路径
    input: PathBuf,

    /// 会话配置文件 (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 最多读取的数据包数
    #[arg(short = 'n', long, default_value_t = 2000)]
    packets: u64,

    /// 读取后定位到的帧号
    #[arg(long)]
    seek: Option<i64>,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 日志目录, 不指定时只输出到控制台
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 日志详细程度 (-v / -vv / -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ============================================================
// 输出结构体
// ============================================================

#[derive(Debug, Serialize)]
struct ProbeReport {
    filename: String,
    format_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    bitrate_kbps: u64,
    fps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_size: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<String>,
    streams: Vec<StreamSummary>,
    tracks: Vec<TrackSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    chapters: Vec<i64>,
    packets: PacketSummary,
    keyframe_distance: u32,
    position_map: Vec<PositionMapEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seek: Option<SeekSummary>,
}

#[derive(Debug, Serialize)]
struct StreamSummary {
    index: usize,
    codec_type: String,
    codec_name: String,
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_tag: Option<i32>,
}

#[derive(Debug, Serialize)]
struct TrackSummary {
    kind: TrackType,
    number: usize,
    stream_index: usize,
    description: String,
    selected: bool,
}

#[derive(Debug, Default, Serialize)]
struct PacketSummary {
    video: u64,
    audio: u64,
    bytes: u64,
    frames_read: i64,
    pts_faults: u32,
    dts_faults: u32,
}

#[derive(Debug, Serialize)]
struct SeekSummary {
    target: i64,
    landed: i64,
    keyframe: i64,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    let cli = Cli::parse();
    logging::init("sift-probe", cli.verbose, cli.log_dir.as_deref());

    match run(&cli) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        eprintln!("错误: 序列化失败: {e}");
                        std::process::exit(1);
                    }
                }
            } else {
                print_report(&report);
            }
        }
        Err(e) => {
            eprintln!("错误: {e:#}");
            std::process::exit(1);
        }
    }
}

/// 计数接收端: 统计交出的数据包数与字节数
fn counting_sink(count: &Arc<AtomicU64>, bytes: &Arc<AtomicU64>) -> Box<dyn PacketSink> {
    let count = Arc::clone(count);
    let bytes = Arc::clone(bytes);
    Box::new(move |_: &Stream, packet: &Packet, _: &Mutex<()>| {
        count.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(packet.data.len() as u64, Ordering::Relaxed);
        true
    })
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("读取配置文件 {} 失败", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

fn run(cli: &Cli) -> Result<ProbeReport> {
    let config = load_config(cli.config.as_deref())?;
    let mut session = DecoderSession::new(config, Box::new(NullHost), Box::new(NullAudioOutput::new()));

    let video = Arc::new(AtomicU64::new(0));
    let audio = Arc::new(AtomicU64::new(0));
    let bytes = Arc::new(AtomicU64::new(0));
    session.set_video_sink(counting_sink(&video, &bytes));
    session.set_audio_sink(counting_sink(&audio, &bytes));

    session
        .open_file(&cli.input)
        .with_context(|| format!("无法打开 '{}'", cli.input.display()))?;
    if session.streams().is_empty() {
        bail!("'{}' 中没有可用的流", cli.input.display());
    }
    info!("开始读取, 最多 {} 个数据包", cli.packets);

    let mut read = 0;
    while read < cli.packets && session.get_frame(DecodeType::AudioVideo) {
        read += 1;
    }
    info!("读取 {read} 个数据包, 已解码帧 {}", session.frames_played());

    let seek = cli.seek.map(|target| {
        let ok = if target >= session.frames_played() {
            session.do_fast_forward(target, true)
        } else {
            session.do_rewind(target, true)
        };
        if !ok {
            tracing::warn!("定位到帧 {target} 失败");
        }
        SeekSummary {
            target,
            landed: session.frames_played(),
            keyframe: session.keyframes().last_key(),
        }
    });

    let (pts_faults, dts_faults) = session.pts_faults();
    let packets = PacketSummary {
        video: video.load(Ordering::Relaxed),
        audio: audio.load(Ordering::Relaxed),
        bytes: bytes.load(Ordering::Relaxed),
        frames_read: session.frames_read(),
        pts_faults,
        dts_faults,
    };

    Ok(build_report(&session, &cli.input, packets, seek))
}

fn build_report(
    session: &DecoderSession,
    input: &Path,
    packets: PacketSummary,
    seek: Option<SeekSummary>,
) -> ProbeReport {
    let streams = session
        .streams()
        .iter()
        .map(|s| StreamSummary {
            index: s.index,
            codec_type: s.media_type.to_string(),
            codec_name: s.codec_id.name().to_string(),
            language: s.language().as_str().to_string(),
            component_tag: s.component_tag,
        })
        .collect();

    let mut tracks = Vec::new();
    for kind in TrackType::ALL {
        let current = session.current_track(kind);
        for (n, track) in session.tracks().list(kind).iter().enumerate() {
            tracks.push(TrackSummary {
                kind,
                number: n + 1,
                stream_index: track.stream_index,
                description: session.track_description(kind, n).unwrap_or_default(),
                selected: current == Some(n),
            });
        }
    }

    let secs = |us: i64| us as f64 / TIME_BASE as f64;
    ProbeReport {
        filename: input.display().to_string(),
        format_name: session.format_name().to_string(),
        start_time: session.start_time_us().map(secs),
        duration: session.duration_us().map(secs),
        bitrate_kbps: session.bitrate_kbps(),
        fps: session.fps(),
        video_path: session.video_path().map(|p| p.to_string()),
        video_size: session.video_format().map(|f| (f.width, f.height)),
        audio: session.audio_info().map(|a| a.to_string()),
        streams,
        tracks,
        chapters: session.chapter_times(),
        packets,
        keyframe_distance: session.keyframes().distance(),
        position_map: session.position_map().snapshot(),
        seek,
    }
}

fn print_report(report: &ProbeReport) {
    println!("输入: {} ({})", report.filename, report.format_name);
    if let Some(start) = report.start_time {
        print!("  起始: {start:.3}s");
    }
    if let Some(duration) = report.duration {
        print!("  时长: {duration:.3}s");
    }
    println!("  码率: {} kb/s  帧率: {:.3}", report.bitrate_kbps, report.fps);
    if let (Some(path), Some((w, h))) = (&report.video_path, report.video_size) {
        println!("  视频: {w}x{h}, 解码路径 {path}");
    }
    if let Some(audio) = &report.audio {
        println!("  音频: {audio}");
    }

    println!();
    println!("流:");
    for s in &report.streams {
        print!("  #{}: {} {} [{}]", s.index, s.codec_type, s.codec_name, s.language);
        if let Some(tag) = s.component_tag {
            print!(" tag={tag}");
        }
        println!();
    }

    println!();
    println!("轨道:");
    for t in &report.tracks {
        let mark = if t.selected { "*" } else { " " };
        println!("  {mark} {:<18} {} (流 #{})", t.kind.name(), t.description, t.stream_index);
    }

    if !report.chapters.is_empty() {
        println!();
        println!("章节 (秒): {:?}", report.chapters);
    }

    let p = &report.packets;
    println!();
    println!(
        "数据包: 视频 {} / 音频 {}, {} 字节, 已读帧 {}",
        p.video, p.audio, p.bytes, p.frames_read
    );
    if p.pts_faults > 0 || p.dts_faults > 0 {
        println!("  时间戳故障: PTS {} / DTS {}", p.pts_faults, p.dts_faults);
    }
    println!("关键帧间隔: {}", report.keyframe_distance);
    println!("位置表: {} 个条目", report.position_map.len());
    for entry in report.position_map.iter().take(10) {
        println!("  帧 {:>8} @ 字节 {}", entry.index, entry.pos);
    }
    if report.position_map.len() > 10 {
        println!("  ...");
    }

    if let Some(seek) = &report.seek {
        println!();
        println!(
            "定位: 目标帧 {}, 落在帧 {} (关键帧 {})",
            seek.target, seek.landed, seek.keyframe
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sift-probe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_命令行参数() {
        let c = cli(&["rec.ts", "-vv", "--json", "-n", "50", "--seek", "300"]);
        assert_eq!(c.input, PathBuf::from("rec.ts"));
        assert_eq!(c.verbose, 2);
        assert!(c.json);
        assert_eq!(c.packets, 50);
        assert_eq!(c.seek, Some(300));
        assert!(c.config.is_none());

        let c = cli(&["rec.ts"]);
        assert_eq!(c.packets, 2000);
        assert!(!c.json);
        assert!(Cli::try_parse_from(["sift-probe"]).is_err());
    }

    #[test]
    fn test_读取配置文件() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"exact_seeks": true, "ui_language": "fra"}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.exact_seeks);
        assert_eq!(config.ui_language.as_str(), "fra");
        assert_eq!(load_config(None).unwrap(), SessionConfig::default());

        let err = load_config(Some(&dir.path().join("missing.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("missing.json"));
    }

    #[test]
    fn test_无法识别的输入() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text, not a container").unwrap();

        let c = cli(&[path.to_str().unwrap()]);
        let err = run(&c).unwrap_err();
        assert!(format!("{err:#}").contains("notes.txt"));
    }

    #[test]
    fn test_报告序列化() {
        let report = ProbeReport {
            filename: "rec.ts".into(),
            format_name: "mpegts".into(),
            start_time: Some(1.0),
            duration: None,
            bitrate_kbps: 0,
            fps: 25.0,
            video_path: None,
            video_size: None,
            audio: None,
            streams: Vec::new(),
            tracks: vec![TrackSummary {
                kind: TrackType::Audio,
                number: 1,
                stream_index: 1,
                description: "1: English AC3 5.1ch".into(),
                selected: true,
            }],
            chapters: Vec::new(),
            packets: PacketSummary::default(),
            keyframe_distance: 12,
            position_map: vec![PositionMapEntry::new(12, 4888)],
            seek: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["format_name"], "mpegts");
        assert!(value.get("duration").is_none());
        assert!(value.get("chapters").is_none());
        assert_eq!(value["tracks"][0]["kind"], "Audio");
        assert_eq!(value["position_map"][0]["pos"], 4888);
    }
}
