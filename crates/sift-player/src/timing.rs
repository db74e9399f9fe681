//! 帧率与宽高比的推算.

use log::debug;
use sift_core::Rational;
use sift_format::Stream;

/// 帧率的合理上限 (不含)
const MAX_SANE_FPS: f64 = 121.0;

/// NTSC 帧率
pub const NTSC_FPS: f64 = 30000.0 / 1001.0;

fn rate(r: Rational) -> f64 {
    if r.is_nonzero() { r.to_f64() } else { 0.0 }
}

/// 时间基对应的帧率 (1 / time_base)
fn inverse_rate(r: Rational) -> f64 {
    if r.is_nonzero() { r.invert().to_f64() } else { 0.0 }
}

fn sane(fps: f64, low: f64, high: f64) -> bool {
    fps > low && fps < high
}

/// 综合多个来源推算视频流帧率
///
/// 候选: 平均帧率、编解码器时间基、容器时间基、估计帧率.
/// 优先级: 容器族特定来源 → 编解码器帧率 → 容器帧率 → 估计帧率 → 编解码器帧率.
/// 结果不在 `[0, 121)` 内时按 NTSC 处理. `format_name` 按子串匹配,
/// 如 `"matroska,webm"`.
pub fn normalized_fps(stream: &Stream, format_name: &str) -> f64 {
    let avg_fps = rate(stream.avg_frame_rate);

    let ticks = f64::from(stream.ticks_per_frame.max(1));
    let mut codec_tb = stream.codec_time_base;
    let mut codec_fps = inverse_rate(codec_tb) / ticks;
    // 有的码流把 1001 写成了 1; 修正后的时间基直接就是帧间隔, 不再按 ticks 折算
    if codec_fps > MAX_SANE_FPS && codec_tb.den > 10000 && codec_tb.num == 1 {
        codec_tb.num = 1001;
        codec_fps = inverse_rate(codec_tb);
    }

    let container_fps = inverse_rate(stream.time_base);
    let estimated_fps = rate(stream.r_frame_rate);

    let fps = if format_name.contains("matroska") && sane(avg_fps, 3.0, MAX_SANE_FPS) {
        avg_fps
    } else if format_name.contains("avi") && sane(container_fps, 3.0, MAX_SANE_FPS) {
        container_fps
    } else if sane(codec_fps, 3.0, MAX_SANE_FPS) {
        codec_fps
    } else if sane(container_fps, 3.0, MAX_SANE_FPS) {
        container_fps
    } else if sane(estimated_fps, 20.0, 70.0) {
        estimated_fps
    } else {
        codec_fps
    };

    debug!(
        "帧率候选: avg {avg_fps:.3} codec {codec_fps:.3} container {container_fps:.3} estimated {estimated_fps:.3} -> {fps:.3}"
    );

    if !(0.0..MAX_SANE_FPS).contains(&fps) || fps.is_nan() {
        NTSC_FPS
    } else {
        fps
    }
}

/// 显示宽高比
///
/// 采样宽高比不可用或结果离谱 (<= 0 或 > 6) 时退回像素宽高比,
/// 高度为 0 时为 4:3.
pub fn display_aspect(width: u32, height: u32, sample_aspect: Rational) -> f64 {
    let sar = rate(sample_aspect);
    let aspect = if height > 0 {
        sar * f64::from(width) / f64::from(height)
    } else {
        0.0
    };
    if aspect <= 0.0 || aspect > 6.0 {
        if height > 0 {
            f64::from(width) / f64::from(height)
        } else {
            4.0 / 3.0
        }
    } else {
        aspect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_codec::CodecId;

    fn video_stream() -> Stream {
        let mut s = Stream::new(0, CodecId::Mpeg2Video);
        s.time_base = Rational::MPEG_CLOCK;
        s
    }

    #[test]
    fn test_编解码器帧率优先() {
        let mut s = video_stream();
        s.codec_time_base = Rational::new(1001, 60000);
        s.ticks_per_frame = 2;
        let fps = normalized_fps(&s, "mpegts");
        assert!((fps - NTSC_FPS).abs() < 1e-6);
    }

    #[test]
    fn test_编解码器时间基修正_1001() {
        let mut s = video_stream();
        s.codec_time_base = Rational::new(1, 30000);
        let fps = normalized_fps(&s, "mpegts");
        assert!((fps - NTSC_FPS).abs() < 1e-6);

        // 修正后不再除以 ticks_per_frame
        s.codec_time_base = Rational::new(1, 60000);
        s.ticks_per_frame = 2;
        let fps = normalized_fps(&s, "mpegts");
        assert!((fps - 60000.0 / 1001.0).abs() < 1e-6);
    }

    #[test]
    fn test_容器与估计帧率() {
        let mut s = video_stream();
        s.time_base = Rational::new(1, 25);
        assert!((normalized_fps(&s, "avi") - 25.0).abs() < 1e-9);
        assert!((normalized_fps(&s, "mpegts") - 25.0).abs() < 1e-9);

        // 90k 时间基不合理, 用估计值
        let mut s = video_stream();
        s.r_frame_rate = Rational::new(50, 1);
        assert!((normalized_fps(&s, "mpegts") - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_matroska_平均帧率() {
        let mut s = video_stream();
        s.avg_frame_rate = Rational::new(24000, 1001);
        s.codec_time_base = Rational::new(1, 25);
        assert!((normalized_fps(&s, "matroska") - 23.976).abs() < 1e-3);
        assert!((normalized_fps(&s, "matroska,webm") - 23.976).abs() < 1e-3);
        assert!((normalized_fps(&s, "mpegts") - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_超出范围时为_ntsc() {
        let mut s = video_stream();
        s.codec_time_base = Rational::new(1, 200);
        assert!((normalized_fps(&s, "mpegts") - NTSC_FPS).abs() < 1e-9);
    }

    #[test]
    fn test_宽高比() {
        assert!((display_aspect(720, 576, Rational::new(16, 11)) - 720.0 * 16.0 / 11.0 / 576.0).abs() < 1e-9);
        assert!((display_aspect(1920, 1080, Rational::UNDEFINED) - 16.0 / 9.0).abs() < 1e-9);
        assert!((display_aspect(640, 0, Rational::new(1, 1)) - 4.0 / 3.0).abs() < 1e-9);
        // SAR 离谱
        assert!((display_aspect(100, 10, Rational::new(1, 1)) - 10.0).abs() < 1e-9);
    }
}
