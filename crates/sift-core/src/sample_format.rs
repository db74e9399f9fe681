//! 音频采样格式定义.

use std::fmt;

/// 音频采样格式
///
/// 仅覆盖容器/解码器上报、音频输出需要区分的交错格式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 未指定
    None,
    /// 无符号 8 位整数
    U8,
    /// 有符号 16 位整数
    S16,
    /// 有符号 32 位整数 (有效位数可能只有 24)
    S32,
    /// 32 位浮点
    F32,
    /// 64 位浮点
    F64,
}

impl SampleFormat {
    /// 每个采样点占用的字节数
    pub const fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::F64 => "dbl",
        };
        write!(f, "{name}")
    }
}
