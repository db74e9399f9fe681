//! 时间戳类型与规整工具.
//!
//! 容器时间戳带有任意时间基与回绕位宽 (MPEG-TS 为 33 位),
//! 这里把它们换算到统一的毫秒/微秒时间域, 并相对流起点解开回绕.

use crate::rational::{Rational, rescale};
use std::fmt;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 全局时间基: 每秒的微秒数
pub const TIME_BASE: i64 = 1_000_000;

/// 时间戳
///
/// 实际时间 (秒) = pts * time_base.num / time_base.den.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    /// 创建新的时间戳
    pub const fn new(pts: i64, time_base: Rational) -> Self {
        Self { pts, time_base }
    }

    /// 创建未定义的时间戳
    pub const fn none() -> Self {
        Self {
            pts: NOPTS_VALUE,
            time_base: Rational::UNDEFINED,
        }
    }

    /// 判断时间戳是否有效 (非 NOPTS_VALUE)
    pub const fn is_valid(&self) -> bool {
        self.pts != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 转换为秒 (f64)
    ///
    /// 无效时间戳返回 `f64::NAN`.
    pub fn to_seconds(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.pts as f64 * self.time_base.to_f64()
    }

    /// 将时间戳重缩放到新的时间基
    pub fn rescale(&self, new_time_base: Rational) -> Self {
        if !self.is_valid() || !new_time_base.is_nonzero() {
            return Self::none();
        }
        Self {
            pts: crate::rational::rescale_q(self.pts, self.time_base, new_time_base),
            time_base: new_time_base,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "NOPTS")
        } else {
            write!(f, "{:.6}s", self.to_seconds())
        }
    }
}

// ============================================================
// 回绕处理
// ============================================================

/// 回绕掩码, 位宽 >= 64 时不做掩码
pub const fn wrap_mask(bits: u32) -> i64 {
    if bits >= 64 {
        -1
    } else {
        ((1u64 << bits) - 1) as i64
    }
}

/// 基于低位重建: 以 `base` 为参照解开 `bits` 位宽计数器的回绕
pub const fn lsb_unwrap(value: i64, base: i64, bits: u32) -> i64 {
    value.wrapping_sub(base) & wrap_mask(bits)
}

/// 把以毫秒表示的容器时间码规整到流起点之后的毫秒数
///
/// - `time_base`: 流自身的时间基
/// - `wrap_bits`: 流时间戳回绕位宽
/// - `start_time_us`: 容器起始时间 (微秒), 缺省视为 0
///
/// 流没有可用时间基时返回 0.
pub fn normalize_timecode(
    timecode_ms: i64,
    time_base: Rational,
    wrap_bits: u32,
    start_time_us: Option<i64>,
) -> i64 {
    if !time_base.is_nonzero() {
        return 0;
    }
    let num = i64::from(time_base.num);
    let den = i64::from(time_base.den);

    let start_pts = start_time_us
        .filter(|&s| s != NOPTS_VALUE)
        .map(|s| rescale(s, den, TIME_BASE * num))
        .unwrap_or(0);
    let pts = rescale(timecode_ms, den, 1000 * num);
    let unwrapped = lsb_unwrap(pts, start_pts, wrap_bits);
    rescale(unwrapped, 1000 * num, den)
}
