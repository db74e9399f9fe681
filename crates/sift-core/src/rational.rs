//! 有理数类型, 用于时间基 (time_base)、帧率、宽高比等场景.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 例如: 时间基 1/90000 表示 90kHz 时钟, 帧率 30000/1001 表示 29.97fps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 零值
    pub const ZERO: Self = Self { num: 0, den: 1 };

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 常用时间基: 微秒 (1/1_000_000)
    pub const MICRO: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// 常用时间基: 毫秒 (1/1_000)
    pub const MILLI: Self = Self { num: 1, den: 1_000 };

    /// MPEG 系统时钟: 90kHz
    pub const MPEG_CLOCK: Self = Self { num: 1, den: 90_000 };

    /// NTSC 帧率 30000/1001
    pub const NTSC_FPS: Self = Self {
        num: 30_000,
        den: 1001,
    };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 分子与分母均非零
    pub const fn is_nonzero(&self) -> bool {
        self.den != 0 && self.num != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 如果分母为 0, 返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 对有理数进行约分
    pub fn reduce(self) -> Self {
        if self.den == 0 {
            return self;
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs());
        if g == 0 {
            return self;
        }
        let g = g as i32;
        // 保证分母为正
        let sign = if self.den < 0 { -1 } else { 1 };
        Self {
            num: sign * self.num / g,
            den: sign * self.den / g,
        }
    }

    /// 求倒数
    pub const fn invert(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }
}

impl std::ops::Mul for Rational {
    type Output = Self;

    /// 两个有理数相乘
    fn mul(self, other: Self) -> Self {
        Self {
            num: self.num * other.num,
            den: self.den * other.den,
        }
        .reduce()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self { num, den }
    }
}

/// 计算 `a * b / c`, 四舍五入 (远离零), 中间结果使用 i128 防止溢出
///
/// `c == 0` 时返回 0.
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    if c == 0 {
        return 0;
    }
    let prod = i128::from(a) * i128::from(b);
    let c = i128::from(c);
    let half = c.abs() / 2;
    let rounded = if (prod < 0) != (c < 0) {
        (prod - if prod < 0 { half } else { -half }) / c
    } else {
        (prod + if prod < 0 { -half } else { half }) / c
    };
    rounded.clamp(i128::from(i64::MIN + 1), i128::from(i64::MAX)) as i64
}

/// 将 `a` 从时间基 `from` 换算到时间基 `to`
pub fn rescale_q(a: i64, from: Rational, to: Rational) -> i64 {
    rescale(
        a,
        i64::from(from.num) * i64::from(to.den),
        i64::from(from.den) * i64::from(to.num),
    )
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_to_float() {
        let r = Rational::new(30000, 1001);
        assert!((r.to_f64() - 29.97).abs() < 0.001);
        assert!(Rational::UNDEFINED.to_f64().is_nan());
    }

    #[test]
    fn test_rational_reduce() {
        assert_eq!(Rational::new(30, 60).reduce(), Rational::new(1, 2));
        assert_eq!(Rational::new(3, -6).reduce(), Rational::new(-1, 2));
    }

    #[test]
    fn test_rescale_四舍五入() {
        assert_eq!(rescale(1, 1, 2), 1);
        assert_eq!(rescale(-1, 1, 2), -1);
        assert_eq!(rescale(10, 3, 4), 8);
        assert_eq!(rescale(5, 0, 7), 0);
        assert_eq!(rescale(5, 1, 0), 0);
    }

    #[test]
    fn test_rescale_q_时间基换算() {
        // 1 秒 90kHz -> 微秒
        assert_eq!(
            rescale_q(90_000, Rational::MPEG_CLOCK, Rational::MICRO),
            1_000_000
        );
        // 33 位最大值不溢出
        let max = (1i64 << 33) - 1;
        assert_eq!(
            rescale_q(max, Rational::MPEG_CLOCK, Rational::MILLI),
            95_443_718
        );
    }
}
