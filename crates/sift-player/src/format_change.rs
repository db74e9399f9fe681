//! 视频格式变化与 GOP 起点检测.
//!
//! 对选中视频流的每个数据包做预处理:
//! - MPEG-1/2: 扫描起始码, 从序列头读取尺寸、宽高比、帧率
//! - H.264: 增量解析 Annex B 码流, 在关键帧起点重新读取画面参数
//! - 其它: 直接信任容器的关键帧标志
//!
//! 检测器只产生事件, 由会话负责复位时间戳状态与更新位置表.

use log::{debug, info};
use sift_codec::CodecId;
use sift_codec::parsers::h264::{AnnexBParser, FieldType, ParserEvent, avcc_length_size};
use sift_codec::parsers::mpeg2::{
    GOP_START, SEQ_HEADER_MIN_LEN, SEQ_START, SLICE_MAX, SLICE_MIN, SequenceHeader, StartCodeScanner,
};

/// 帧率变化的判定阈值
const FPS_EPSILON: f64 = 0.01;

/// 视频画面参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoFormat {
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 显示宽高比
    pub aspect: f64,
    /// 帧率
    pub fps: f64,
}

impl VideoFormat {
    /// 与另一组参数相比尺寸或帧率是否变化 (宽高比不参与比较)
    pub fn differs_from(&self, other: &VideoFormat) -> bool {
        (self.fps - other.fps).abs() > FPS_EPSILON
            || self.width != other.width
            || self.height != other.height
    }
}

/// 预处理事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoEvent {
    /// 画面参数变化
    FormatChanged(VideoFormat),
    /// GOP 起点, `reliable` 表示由码流解析得出 (可用于补写位置表)
    GopStart {
        /// 码流解析得出
        reliable: bool,
    },
}

/// 一个数据包的预处理结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessed {
    /// 按出现顺序的事件
    pub events: Vec<VideoEvent>,
    /// 数据包包含新帧的起点
    pub on_frame: bool,
    /// 数据包应标记为关键帧
    pub keyframe: bool,
}

impl Preprocessed {
    fn gop(&mut self, reliable: bool) {
        self.events.push(VideoEvent::GopStart { reliable });
        self.keyframe = true;
    }
}

/// 格式变化检测器
#[derive(Default)]
pub struct FormatChangeDetector {
    scanner: StartCodeScanner,
    h264: AnnexBParser,
    seq_count: u32,
    seen_gop: bool,
    current: Option<VideoFormat>,
}

impl FormatChangeDetector {
    /// 创建
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前画面参数
    pub fn current(&self) -> Option<VideoFormat> {
        self.current
    }

    /// 以流信息初始化当前画面参数
    pub fn set_current(&mut self, format: VideoFormat) {
        self.current = Some(format);
    }

    /// 丢弃跨包扫描状态 (定位后)
    pub fn reset(&mut self) {
        self.scanner.reset();
        self.h264.reset();
        self.seq_count = 0;
        self.seen_gop = false;
    }

    fn apply(&mut self, format: VideoFormat, out: &mut Preprocessed) {
        let changed = self.current.is_none_or(|cur| format.differs_from(&cur));
        if changed {
            info!(
                "视频参数变化: {}x{} @ {:.3} fps, 宽高比 {:.3}",
                format.width, format.height, format.fps, format.aspect
            );
            out.events.push(VideoEvent::FormatChanged(format));
        }
        // 宽高比总是跟随最新的头
        self.current = Some(format);
    }

    /// MPEG-1/2 数据包
    pub fn preprocess_mpeg(&mut self, codec_id: CodecId, lowres: u8, data: &[u8]) -> Preprocessed {
        let mut out = Preprocessed {
            on_frame: true,
            ..Default::default()
        };
        let mut pos = 0;
        while let Some((code, next)) = self.scanner.find(data, pos) {
            pos = next;
            if (SLICE_MIN..=SLICE_MAX).contains(&code) {
                continue;
            }
            if code == SEQ_START {
                if next + SEQ_HEADER_MIN_LEN >= data.len() {
                    continue;
                }
                let Ok(seq) = SequenceHeader::parse(&data[next..]) else {
                    continue;
                };
                let format = VideoFormat {
                    width: seq.width >> lowres,
                    height: seq.height >> lowres,
                    aspect: seq.aspect(codec_id == CodecId::Mpeg1Video),
                    fps: seq.fps(),
                };
                self.apply(format, &mut out);

                self.seq_count += 1;
                if !self.seen_gop && self.seq_count > 1 {
                    out.gop(true);
                }
            } else if code == GOP_START {
                out.gop(true);
                self.seen_gop = true;
            }
        }
        out
    }

    /// H.264 数据包
    ///
    /// 长度前缀封装 (avcC) 无法增量解析, 此时信任容器关键帧标志.
    /// `fps` 为流的归一化帧率, 码流未给出帧率时使用.
    pub fn preprocess_h264(
        &mut self,
        extra_data: &[u8],
        data: &[u8],
        container_key: bool,
        fps: f64,
    ) -> Preprocessed {
        let mut out = Preprocessed::default();

        if let Some(size_len) = avcc_length_size(extra_data) {
            let nal_size: u32 = data.iter().take(size_len).map(|&b| u32::from(b)).sum();
            if nal_size != 0 {
                if container_key {
                    out.gop(false);
                }
                out.on_frame = true;
                return out;
            }
        }

        for event in self.h264.feed(data) {
            let ParserEvent::FrameStart { keyframe, field } = event;
            if field == FieldType::Bottom {
                continue;
            }
            out.on_frame = true;
            if !keyframe {
                continue;
            }
            if let Some(pic) = self.h264.picture_info() {
                let format = VideoFormat {
                    width: pic.width,
                    height: pic.height,
                    aspect: pic.aspect,
                    fps: pic.fps.map_or(fps, |r| r.to_f64()),
                };
                self.apply(format, &mut out);
            } else {
                debug!("H.264 关键帧前没有可用的 SPS");
            }
            out.gop(true);
        }
        out
    }

    /// 其它编码: 只看容器关键帧标志
    ///
    /// 没有关键帧标志的容器里, 第二个起的每个数据包都当作 GOP 起点.
    pub fn preprocess_other(&mut self, container_key: bool) -> Preprocessed {
        let mut out = Preprocessed {
            on_frame: true,
            ..Default::default()
        };
        if container_key {
            out.gop(false);
            self.seen_gop = true;
        } else {
            self.seq_count += 1;
            if !self.seen_gop && self.seq_count > 1 {
                out.events.push(VideoEvent::GopStart { reliable: false });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-2 序列头: 尺寸、aspect_code、frame_rate_code
    fn seq_header(width: u32, height: u32, aspect: u8, rate: u8) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, 0xB3];
        v.push((width >> 4) as u8);
        v.push((((width & 0x0F) << 4) | (height >> 8)) as u8);
        v.push((height & 0xFF) as u8);
        v.push((aspect << 4) | rate);
        // bit_rate, marker, vbv, 标志位
        v.extend_from_slice(&[0xFF, 0xFF, 0xE0, 0x18, 0x00, 0x00, 0x00, 0x00]);
        v
    }

    fn gop_header() -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0xB8, 0x00, 0x08, 0x00, 0x00]
    }

    fn picture() -> Vec<u8> {
        vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x0F, 0xFF, 0xF8, 0x00, 0x00, 0x01, 0x01, 0x12, 0x34]
    }

    #[test]
    fn test_mpeg2_序列头触发格式变化() {
        let mut det = FormatChangeDetector::new();
        let mut pkt = seq_header(720, 576, 3, 3);
        pkt.extend(gop_header());
        pkt.extend(picture());

        let out = det.preprocess_mpeg(CodecId::Mpeg2Video, 0, &pkt);
        let VideoEvent::FormatChanged(fmt) = out.events[0] else {
            panic!("缺少格式变化事件: {:?}", out.events);
        };
        assert_eq!((fmt.width, fmt.height), (720, 576));
        assert!((fmt.fps - 25.0).abs() < 1e-9);
        assert!((fmt.aspect - 16.0 / 9.0).abs() < 1e-9);
        assert_eq!(out.events[1], VideoEvent::GopStart { reliable: true });
        assert!(out.keyframe);

        // 相同参数不再报告
        let out = det.preprocess_mpeg(CodecId::Mpeg2Video, 0, &pkt);
        assert_eq!(out.events, vec![VideoEvent::GopStart { reliable: true }]);

        // 低分辨率解码
        let mut det = FormatChangeDetector::new();
        let out = det.preprocess_mpeg(CodecId::Mpeg2Video, 1, &pkt);
        assert!(matches!(
            out.events[0],
            VideoEvent::FormatChanged(VideoFormat { width: 360, height: 288, .. })
        ));
    }

    #[test]
    fn test_mpeg2_无_gop_头时第二个序列头为起点() {
        let mut det = FormatChangeDetector::new();
        let mut pkt = seq_header(352, 288, 1, 3);
        pkt.extend(picture());

        let out = det.preprocess_mpeg(CodecId::Mpeg1Video, 0, &pkt);
        assert!(!out.keyframe);
        let out = det.preprocess_mpeg(CodecId::Mpeg1Video, 0, &pkt);
        assert_eq!(out.events, vec![VideoEvent::GopStart { reliable: true }]);
        assert!(out.keyframe);
    }

    #[test]
    fn test_mpeg2_起始码跨包() {
        let mut det = FormatChangeDetector::new();
        let mut stream = picture();
        stream.extend(gop_header());
        let (a, b) = stream.split_at(picture().len() + 2);
        assert!(det.preprocess_mpeg(CodecId::Mpeg2Video, 0, a).events.is_empty());
        let out = det.preprocess_mpeg(CodecId::Mpeg2Video, 0, b);
        assert_eq!(out.events, vec![VideoEvent::GopStart { reliable: true }]);
    }

    #[test]
    fn test_mpeg2_序列头被截断() {
        let mut det = FormatChangeDetector::new();
        let pkt = seq_header(720, 480, 2, 4);
        let out = det.preprocess_mpeg(CodecId::Mpeg2Video, 0, &pkt[..10]);
        assert!(out.events.is_empty());
        assert!(det.current().is_none());
    }

    #[test]
    fn test_h264_长度前缀信任容器() {
        let mut det = FormatChangeDetector::new();
        let extra = [0x01, 0x64, 0x00, 0x28, 0xFF, 0xE1, 0x00];
        let pkt = [0x00, 0x00, 0x00, 0x05, 0x65, 0x88, 0x84, 0x00, 0x10];
        let out = det.preprocess_h264(&extra, &pkt, true, 25.0);
        assert_eq!(out.events, vec![VideoEvent::GopStart { reliable: false }]);
        assert!(out.on_frame);
        let out = det.preprocess_h264(&extra, &pkt, false, 25.0);
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_其它编码_关键帧标志() {
        let mut det = FormatChangeDetector::new();
        let out = det.preprocess_other(false);
        assert!(out.events.is_empty());
        // 没见过关键帧标志: 第二个包起都是候选起点
        let out = det.preprocess_other(false);
        assert_eq!(out.events, vec![VideoEvent::GopStart { reliable: false }]);
        assert!(!out.keyframe);

        let out = det.preprocess_other(true);
        assert!(out.keyframe);
        assert!(det.preprocess_other(false).events.is_empty());
    }
}
