//! MPEG-1/2 视频起始码扫描与序列头解析.
//!
//! 起始码为 `00 00 01 xx`, 扫描状态跨数据包保留,
//! 因此被包边界截断的起始码也能被识别.

use sift_core::bitreader::BitReader;
use sift_core::{SiftError, SiftResult};

/// 图像起始码
pub const PICTURE_START: u32 = 0x0000_0100;
/// 第一个切片起始码
pub const SLICE_MIN: u32 = 0x0000_0101;
/// 最后一个切片起始码
pub const SLICE_MAX: u32 = 0x0000_01AF;
/// 序列头起始码
pub const SEQ_START: u32 = 0x0000_01B3;
/// 扩展起始码
pub const EXT_START: u32 = 0x0000_01B5;
/// 序列结束码
pub const SEQ_END: u32 = 0x0000_01B7;
/// GOP 起始码
pub const GOP_START: u32 = 0x0000_01B8;

/// 序列头去掉起始码后至少需要的字节数
pub const SEQ_HEADER_MIN_LEN: usize = 11;

/// frame_rate_code 对应的帧率 (分子, 分母)
const FRAME_RATE_TABLE: [(u32, u32); 9] = [
    (0, 1),
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
];

/// MPEG-1 像素宽高比 (像素高/像素宽)
const MPEG1_PEL_ASPECT: [f64; 15] = [
    0.0, 1.0, 0.6735, 0.7031, 0.7615, 0.8055, 0.8437, 0.8935, 0.9157, 0.9815, 1.0255, 1.0695,
    1.0950, 1.1575, 1.2015,
];

/// 跨调用保持状态的起始码扫描器
#[derive(Debug, Clone)]
pub struct StartCodeScanner {
    state: u32,
}

impl StartCodeScanner {
    /// 创建扫描器
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// 丢弃部分匹配的状态
    pub fn reset(&mut self) {
        self.state = 0xFFFF_FFFF;
    }

    /// 从 `from` 开始查找下一个起始码
    ///
    /// 返回 (起始码, 起始码之后的偏移). 数据耗尽时返回 `None`,
    /// 已扫描的尾部字节保留在状态里供下一次调用继续匹配.
    pub fn find(&mut self, data: &[u8], from: usize) -> Option<(u32, usize)> {
        let mut i = from;
        while i < data.len() {
            self.state = (self.state << 8) | u32::from(data[i]);
            i += 1;
            if self.state & 0xFFFF_FF00 == 0x0000_0100 {
                return Some((self.state, i));
            }
        }
        None
    }
}

impl Default for StartCodeScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// 序列头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    /// 水平尺寸
    pub width: u32,
    /// 垂直尺寸
    pub height: u32,
    /// aspect_ratio_information
    pub aspect_code: u8,
    /// frame_rate_code
    pub frame_rate_code: u8,
}

impl SequenceHeader {
    /// 解析序列头 (`data` 从起始码之后开始)
    pub fn parse(data: &[u8]) -> SiftResult<Self> {
        if data.len() < SEQ_HEADER_MIN_LEN {
            return Err(SiftError::NeedMoreData);
        }
        let mut br = BitReader::new(data);
        let width = br.read_bits(12)?;
        let height = br.read_bits(12)?;
        let aspect_code = br.read_bits(4)? as u8;
        let frame_rate_code = br.read_bits(4)? as u8;
        if width == 0 || height == 0 {
            return Err(SiftError::InvalidData(format!(
                "MPEG 序列头尺寸非法: {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            aspect_code,
            frame_rate_code,
        })
    }

    /// 帧率, 未知代码返回 0
    pub fn fps(&self) -> f64 {
        match FRAME_RATE_TABLE.get(self.frame_rate_code as usize) {
            Some(&(num, den)) => f64::from(num) / f64::from(den),
            None => 0.0,
        }
    }

    /// 显示宽高比
    pub fn aspect(&self, mpeg1: bool) -> f64 {
        let square = f64::from(self.width) / f64::from(self.height);
        if mpeg1 {
            return match MPEG1_PEL_ASPECT.get(self.aspect_code as usize) {
                Some(&par) if par > 0.0 => square / par,
                _ => square,
            };
        }
        match self.aspect_code {
            2 => 4.0 / 3.0,
            3 => 16.0 / 9.0,
            4 => 2.21,
            _ => square,
        }
    }
}
