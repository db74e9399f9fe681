//! 可续接的 Annex B 增量解析器.
//!
//! 数据包边界与 NAL 边界没有对应关系, 起始码与切片头都可能被截断在两次
//! `feed` 之间. 解析器把扫描进度保存在显式状态里, 每次 `feed` 只返回本次
//! 数据促成的事件.

use log::trace;
use sift_core::bitreader::BitReader;
use sift_core::{Rational, SiftError};

use super::nal::{NalUnitType, remove_emulation_prevention};
use super::sps::{Pps, Sps, parse_pps, parse_sps};

/// 图像的场类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 帧图像
    Frame,
    /// 顶场
    Top,
    /// 底场
    Bottom,
}

/// 解析事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserEvent {
    /// 新图像 (帧或场) 的第一个切片
    FrameStart {
        /// 是否可独立解码
        keyframe: bool,
        /// 场类型
        field: FieldType,
    },
}

/// 当前活动 SPS 给出的画面参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PictureInfo {
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 显示宽高比
    pub aspect: f64,
    /// 帧率 (VUI 未给出时为 None)
    pub fps: Option<Rational>,
}

/// 字节扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 尚未遇到第一个起始码
    SeekingStartCode,
    /// 正在收集 NAL 数据
    InNal,
}

/// Annex B 增量解析器
pub struct AnnexBParser {
    state: ScanState,
    /// 尚未确定归属的连续 0 字节数
    zero_run: usize,
    nal: Vec<u8>,
    /// 当前 NAL 的切片头是否已处理
    slice_examined: bool,
    sps: Vec<Option<Sps>>,
    pps: Vec<Option<Pps>>,
    active_sps: Option<u32>,
    seen_recovery_point: bool,
    sps_since_frame: bool,
}

impl AnnexBParser {
    /// 创建解析器
    pub fn new() -> Self {
        Self {
            state: ScanState::SeekingStartCode,
            zero_run: 0,
            nal: Vec::new(),
            slice_examined: false,
            sps: vec![None; 32],
            pps: vec![None; 256],
            active_sps: None,
            seen_recovery_point: false,
            sps_since_frame: false,
        }
    }

    /// 丢弃扫描进度, 保留已知参数集
    pub fn reset(&mut self) {
        self.state = ScanState::SeekingStartCode;
        self.zero_run = 0;
        self.nal.clear();
        self.slice_examined = false;
        self.seen_recovery_point = false;
        self.sps_since_frame = false;
    }

    /// 当前活动 SPS 的画面参数
    pub fn picture_info(&self) -> Option<PictureInfo> {
        let sps = self.sps.get(self.active_sps? as usize)?.as_ref()?;
        Some(PictureInfo {
            width: sps.width,
            height: sps.height,
            aspect: sps.display_aspect(),
            fps: sps.fps,
        })
    }

    /// 送入一段码流, 返回本段数据促成的事件
    pub fn feed(&mut self, data: &[u8]) -> Vec<ParserEvent> {
        let mut events = Vec::new();

        for &b in data {
            if b == 0x00 {
                self.zero_run += 1;
                continue;
            }
            if b == 0x01 && self.zero_run >= 2 {
                self.finish_nal(&mut events);
                self.state = ScanState::InNal;
                self.zero_run = 0;
                continue;
            }
            if self.state == ScanState::InNal {
                self.nal.extend(std::iter::repeat_n(0u8, self.zero_run));
                self.nal.push(b);
            }
            self.zero_run = 0;
        }

        // 切片头通常在同一数据包内, 尽早判定帧边界
        if self.state == ScanState::InNal && !self.slice_examined {
            self.examine_slice(&mut events);
        }
        events
    }

    fn finish_nal(&mut self, events: &mut Vec<ParserEvent>) {
        if self.nal.is_empty() {
            self.slice_examined = false;
            return;
        }
        let nal_type = NalUnitType::from_type_id(self.nal[0] & 0x1F);
        match nal_type {
            NalUnitType::Sps => {
                let rbsp = remove_emulation_prevention(&self.nal[1..]);
                match parse_sps(&rbsp) {
                    Ok(sps) => {
                        let id = sps.sps_id as usize;
                        if self.active_sps.is_none() {
                            self.active_sps = Some(sps.sps_id);
                        }
                        self.sps[id] = Some(sps);
                        self.sps_since_frame = true;
                    }
                    Err(e) => trace!("H.264: 忽略无法解析的 SPS: {}", e),
                }
            }
            NalUnitType::Pps => {
                let rbsp = remove_emulation_prevention(&self.nal[1..]);
                match parse_pps(&rbsp) {
                    Ok(pps) => self.pps[pps.pps_id as usize] = Some(pps),
                    Err(e) => trace!("H.264: 忽略无法解析的 PPS: {}", e),
                }
            }
            NalUnitType::Sei => {
                let rbsp = remove_emulation_prevention(&self.nal[1..]);
                if sei_has_recovery_point(&rbsp) {
                    self.seen_recovery_point = true;
                }
            }
            t if t.has_slice_header() && !self.slice_examined => {
                self.examine_slice(events);
            }
            _ => {}
        }
        self.nal.clear();
        self.slice_examined = false;
    }

    /// 解析切片头前几个字段, 数据不足时留待下次
    fn examine_slice(&mut self, events: &mut Vec<ParserEvent>) {
        let Some(&header) = self.nal.first() else {
            return;
        };
        let nal_type = NalUnitType::from_type_id(header & 0x1F);
        if !nal_type.has_slice_header() {
            return;
        }
        let rbsp = remove_emulation_prevention(&self.nal[1..]);
        let slice = match self.parse_slice_header(&rbsp) {
            Ok(slice) => slice,
            Err(SiftError::Eof) => return,
            Err(e) => {
                trace!("H.264: 切片头无效: {}", e);
                self.slice_examined = true;
                return;
            }
        };
        self.slice_examined = true;

        if slice.first_mb != 0 {
            return;
        }
        let intra = slice.slice_type % 5 == 2 || slice.slice_type % 5 == 4;
        let keyframe = nal_type == NalUnitType::SliceIdr
            || (intra && (self.seen_recovery_point || self.sps_since_frame));
        self.seen_recovery_point = false;
        self.sps_since_frame = false;
        if let Some(sps_id) = slice.sps_id {
            self.active_sps = Some(sps_id);
        }
        events.push(ParserEvent::FrameStart {
            keyframe,
            field: slice.field,
        });
    }

    fn parse_slice_header(&self, rbsp: &[u8]) -> Result<SliceHeader, SiftError> {
        let mut br = BitReader::new(rbsp);
        let first_mb = br.read_ue()?;
        let slice_type = br.read_ue()?;
        if slice_type > 9 {
            return Err(SiftError::InvalidData(format!(
                "slice_type 非法: {}",
                slice_type
            )));
        }
        let pps_id = br.read_ue()?;
        let sps = self
            .pps
            .get(pps_id as usize)
            .and_then(Option::as_ref)
            .and_then(|pps| self.sps.get(pps.sps_id as usize)?.as_ref());

        let Some(sps) = sps else {
            // 参数集未知时只能按帧处理
            return Ok(SliceHeader {
                first_mb,
                slice_type,
                sps_id: None,
                field: FieldType::Frame,
            });
        };

        br.skip_bits(sps.log2_max_frame_num)?; // frame_num
        let mut field = FieldType::Frame;
        if !sps.frame_mbs_only && br.read_flag()? {
            field = if br.read_flag()? {
                FieldType::Bottom
            } else {
                FieldType::Top
            };
        }
        Ok(SliceHeader {
            first_mb,
            slice_type,
            sps_id: Some(sps.sps_id),
            field,
        })
    }
}

impl Default for AnnexBParser {
    fn default() -> Self {
        Self::new()
    }
}

struct SliceHeader {
    first_mb: u32,
    slice_type: u32,
    sps_id: Option<u32>,
    field: FieldType,
}

/// SEI 中是否包含 recovery point (payloadType 6)
fn sei_has_recovery_point(rbsp: &[u8]) -> bool {
    let mut pos = 0;
    while pos + 1 < rbsp.len() {
        let mut payload_type = 0usize;
        while pos < rbsp.len() && rbsp[pos] == 0xFF {
            payload_type += 255;
            pos += 1;
        }
        let Some(&last) = rbsp.get(pos) else {
            return false;
        };
        payload_type += usize::from(last);
        pos += 1;

        let mut payload_size = 0usize;
        while pos < rbsp.len() && rbsp[pos] == 0xFF {
            payload_size += 255;
            pos += 1;
        }
        let Some(&last) = rbsp.get(pos) else {
            return false;
        };
        payload_size += usize::from(last);
        pos += 1;

        if payload_type == 6 {
            return true;
        }
        pos += payload_size;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::super::sps::test_util::*;
    use super::*;

    /// 加起始码并插入防竞争字节
    fn nal(header: u8, rbsp: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 1, header];
        let mut zeros = 0;
        for &b in rbsp {
            if zeros >= 2 && b <= 3 {
                out.push(0x03);
                zeros = 0;
            }
            out.push(b);
            zeros = if b == 0 { zeros + 1 } else { 0 };
        }
        out
    }

    fn headers(frame_mbs_only: bool) -> Vec<u8> {
        let mut out = nal(0x67, &sps_rbsp(45, 36, frame_mbs_only, Some((50, 1))));
        out.extend(nal(0x68, &pps_rbsp()));
        out
    }

    #[test]
    fn test_idr_与_p_帧() {
        let mut p = AnnexBParser::new();
        let mut pkt = headers(true);
        pkt.extend(nal(0x65, &slice_rbsp(7, 0, None)));
        let ev = p.feed(&pkt);
        assert_eq!(
            ev,
            vec![ParserEvent::FrameStart {
                keyframe: true,
                field: FieldType::Frame
            }]
        );
        let info = p.picture_info().unwrap();
        assert_eq!((info.width, info.height), (720, 576));
        assert!((info.fps.unwrap().to_f64() - 25.0).abs() < 1e-9);

        let ev = p.feed(&nal(0x41, &slice_rbsp(5, 1, None)));
        assert_eq!(
            ev,
            vec![ParserEvent::FrameStart {
                keyframe: false,
                field: FieldType::Frame
            }]
        );
    }

    #[test]
    fn test_起始码跨越两次送入() {
        let mut p = AnnexBParser::new();
        assert!(p.feed(&headers(true)).is_empty());
        let slice = nal(0x65, &slice_rbsp(7, 0, None));
        // 第一次只送入起始码的一部分
        assert!(p.feed(&slice[..2]).is_empty());
        let ev = p.feed(&slice[2..]);
        assert_eq!(ev.len(), 1);
    }

    #[test]
    fn test_场编码_顶底场() {
        let mut p = AnnexBParser::new();
        let mut pkt = headers(false);
        pkt.extend(nal(0x65, &slice_rbsp(7, 0, Some(false))));
        pkt.extend(nal(0x41, &slice_rbsp(5, 0, Some(true))));
        let ev = p.feed(&pkt);
        assert_eq!(
            ev,
            vec![
                ParserEvent::FrameStart {
                    keyframe: true,
                    field: FieldType::Top
                },
                ParserEvent::FrameStart {
                    keyframe: false,
                    field: FieldType::Bottom
                },
            ]
        );
    }

    #[test]
    fn test_恢复点_i_帧视为关键帧() {
        let mut p = AnnexBParser::new();
        let mut pkt = headers(true);
        pkt.extend(nal(0x41, &slice_rbsp(5, 0, None)));
        // SPS 之后的第一个非 I 帧不是关键帧
        assert_eq!(
            p.feed(&pkt),
            vec![ParserEvent::FrameStart {
                keyframe: false,
                field: FieldType::Frame
            }]
        );
        let mut pkt = nal(0x06, &[0x06, 0x01, 0x84, 0x80]);
        pkt.extend(nal(0x41, &slice_rbsp(7, 1, None)));
        assert_eq!(
            p.feed(&pkt),
            vec![ParserEvent::FrameStart {
                keyframe: true,
                field: FieldType::Frame
            }]
        );
    }

    #[test]
    fn test_sei_recovery_point() {
        assert!(sei_has_recovery_point(&[0x06, 0x01, 0x84, 0x80]));
        assert!(!sei_has_recovery_point(&[0x05, 0x01, 0x00, 0x80]));
        assert!(sei_has_recovery_point(&[0x05, 0x01, 0x00, 0x06, 0x01, 0x84, 0x80]));
    }
}
