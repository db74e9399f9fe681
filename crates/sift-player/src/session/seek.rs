//! 定位: 位置表定位、容器原生定位与定位后的复位.

use std::sync::Arc;

use log::{debug, error, info};
use sift_core::rational::{rescale, rescale_q};
use sift_core::timestamp::{lsb_unwrap, wrap_mask};
use sift_core::{MediaType, Rational, TIME_BASE};
use sift_format::SeekFlags;

use super::{DecodeType, DecoderSession, lock_unpoisoned};
use crate::position_map::PositionMapEntry;

impl DecoderSession {
    /// 向前定位到第 `desired` 帧
    pub fn do_fast_forward(&mut self, desired: i64, discard: bool) -> bool {
        info!(
            "快进到帧 {desired} (当前 {}), {}丢弃已解码帧",
            self.frames_played,
            if discard { "" } else { "不" }
        );
        self.do_seek(desired, discard, false)
    }

    /// 向后定位到第 `desired` 帧
    pub fn do_rewind(&mut self, desired: i64, discard: bool) -> bool {
        info!(
            "快退到帧 {desired} (当前 {}), {}丢弃已解码帧",
            self.frames_played,
            if discard { "" } else { "不" }
        );
        self.do_seek(desired, discard, true)
    }

    fn do_seek(&mut self, desired: i64, discard: bool, rewind: bool) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.set_eof(false);
        if self.recording_has_position_map || self.config.live_tv {
            self.index_seek(desired, discard)
        } else {
            self.native_seek(desired, discard, rewind)
        }
    }

    /// 用位置表定位到目标之前最近的关键帧, 再解码跳过余下的帧
    fn index_seek(&mut self, desired: i64, discard: bool) -> bool {
        let entry = self
            .position_map
            .find_at_or_before(desired)
            .unwrap_or_else(|| PositionMapEntry::new(0, 0));
        debug!(
            "位置表定位: 目标帧 {desired}, 关键帧 {} @ 字节 {}",
            entry.index, entry.pos
        );

        {
            let Some(source) = self.source.as_mut() else {
                return false;
            };
            let _guard = lock_unpoisoned(&self.decode_lock);
            let flags = SeekFlags {
                byte: true,
                ..SeekFlags::default()
            };
            if let Err(e) = source.demuxer.seek(&mut source.io, None, entry.pos, flags) {
                error!("按字节定位到 {} 失败: {e}", entry.pos);
                return false;
            }
        }

        self.keyframes.set_last_key(entry.index);
        self.frames_played = entry.index;
        self.frames_read = entry.index;
        let skip = u64::try_from(desired - entry.index).unwrap_or(0);
        self.seek_reset(entry.index, skip, true, discard);
        true
    }

    /// 容器原生定位
    ///
    /// 定位后以视频流的当前解码时间戳推算实际落点.
    fn native_seek(&mut self, desired: i64, discard: bool, rewind: bool) -> bool {
        let Some(stream) = self
            .streams()
            .iter()
            .find(|s| s.media_type == MediaType::Video)
        else {
            return false;
        };
        let (video_index, time_base, wrap_bits) = (stream.index, stream.time_base, stream.pts_wrap_bits);
        if self.fps <= 0.0 {
            error!("帧率未知, 无法按帧定位");
            return false;
        }

        // 暂停时逐帧步进不走容器定位
        let delta = desired - self.frames_played;
        if (0..2).contains(&delta) && !rewind && self.host.play_speed() == 0.0 {
            self.seek_reset(self.frames_played, delta as u64, false, true);
            self.host.set_frames_played(self.frames_played + 1);
            return true;
        }

        let seek_us = (desired as f64 * TIME_BASE as f64 / self.fps) as i64;
        let ts = self.start_time_us.unwrap_or(0) + seek_us;
        let exact = self.config.exact_seeks;
        let flags = SeekFlags {
            backward: rewind || exact,
            ..SeekFlags::default()
        };

        let cur_dts = {
            let Some(source) = self.source.as_mut() else {
                return false;
            };
            let _guard = lock_unpoisoned(&self.decode_lock);
            if let Err(e) = source.demuxer.seek(&mut source.io, None, ts, flags) {
                error!("定位到 {ts} us 失败: {e}");
                return false;
            }
            source.demuxer.cur_dts(video_index)
        };

        let mut skip = 0;
        let last_key = match cur_dts.filter(|_| time_base.is_nonzero()) {
            Some(dts) => {
                let mut adj_cur = dts;
                if let Some(start) = self.start_time_us {
                    let start_dts = rescale_q(start, Rational::MICRO, time_base);
                    adj_cur = lsb_unwrap(adj_cur, start_dts, wrap_bits);
                }
                let adj_seek = rescale_q(seek_us, Rational::MICRO, time_base);
                let max_dts = wrap_mask(wrap_bits);
                // 落点在起点之前时回绕结果接近最大值
                if adj_seek < max_dts / 64 && adj_cur > max_dts / 2 {
                    adj_cur = 0;
                }
                let new_us = rescale(
                    adj_cur,
                    TIME_BASE * i64::from(time_base.num),
                    i64::from(time_base.den),
                );
                let last_key = (new_us as f64 * self.fps / TIME_BASE as f64) as i64;
                if exact {
                    skip = u64::try_from(desired - last_key).unwrap_or(0);
                }
                self.no_dts_hack = false;
                self.keyframes.set_last_key(last_key);
                self.frames_played = last_key;
                self.frames_read = last_key;
                last_key
            }
            None => {
                // 关键帧位置未知, 沿用上一个关键帧
                info!("定位后没有解码时间戳, 帧计数直接取目标帧");
                self.no_dts_hack = true;
                self.frames_played = desired;
                self.frames_read = desired;
                self.keyframes.last_key()
            }
        };

        self.seek_reset(last_key, skip, true, discard);
        if discard {
            self.host.set_frames_played(self.frames_played + 1);
        }
        true
    }

    /// 定位后的复位
    ///
    /// `do_flush` 时清空时间戳检测、容器与解码器缓冲、暂存的数据包和 GOP 状态;
    /// 之后解码并丢弃 `skip` 帧以对齐到目标帧.
    pub fn seek_reset(&mut self, new_key: i64, skip: u64, do_flush: bool, discard: bool) {
        if self.host.is_in_still_frame() || new_key == 0 {
            return;
        }
        debug!(
            "定位复位: 关键帧 {new_key}, 跳过 {skip} 帧, {}刷新, {}丢弃",
            if do_flush { "" } else { "不" },
            if discard { "" } else { "不" }
        );

        if do_flush {
            self.pts_detector.reset();
            self.last_video_pts_ms = 0;
            let lock = Arc::clone(&self.decode_lock);
            let _guard = lock_unpoisoned(&lock);
            if let Some(source) = self.source.as_mut() {
                source.demuxer.flush();
                // 外部位置表定位时读指针由外部决定
                if self.recording_has_position_map || self.config.live_tv {
                    source.io.sync_to_backend();
                }
            }
            for ctx in self.contexts.iter_mut().flatten() {
                ctx.flush();
            }
            self.format_detector.reset();
        }

        if discard {
            self.host.discard_video_frames(do_flush);
        }

        if do_flush {
            self.stored_packets.clear();
            self.keyframes.reset_gop();
            if !self.no_dts_hack {
                self.frames_played = new_key;
                self.frames_read = new_key;
            }
            self.no_dts_hack = false;
        }

        let mut remaining = skip;
        while remaining > 0 && !self.eof {
            if self.get_frame(DecodeType::Video) {
                self.host.discard_decoded_frame();
            }
            remaining -= 1;
        }
    }

    // ========================================================
    // 章节
    // ========================================================

    /// 章节数, 只有一个章节时视为没有
    pub fn chapter_count(&self) -> usize {
        let n = self
            .source
            .as_ref()
            .map_or(0, |s| s.demuxer.chapters().len());
        if n > 1 { n } else { 0 }
    }

    /// 各章节的起始时间 (秒)
    pub fn chapter_times(&self) -> Vec<i64> {
        if self.chapter_count() == 0 {
            return Vec::new();
        }
        self.chapter_starts().map(|secs| secs as i64).collect()
    }

    /// 已播放帧所在的章节 (从 1 开始), 没有章节时为 0
    pub fn current_chapter(&self, frames_played: i64) -> usize {
        if self.chapter_count() == 0 {
            return 0;
        }
        let starts: Vec<f64> = self.chapter_starts().collect();
        for (i, secs) in starts.iter().enumerate().rev() {
            let frame = (secs * self.fps) as i64;
            if frames_played >= frame {
                debug!("当前章节 {} (起始帧 {frame})", i + 1);
                return i + 1;
            }
        }
        0
    }

    /// 第 `chapter` 章 (从 1 开始) 的起始帧, 不存在时为 -1
    pub fn chapter_frame(&self, chapter: usize) -> i64 {
        if chapter < 1 || chapter > self.chapter_count() {
            return -1;
        }
        self.chapter_starts()
            .nth(chapter - 1)
            .map_or(-1, |secs| (secs * self.fps) as i64)
    }

    fn chapter_starts(&self) -> impl Iterator<Item = f64> + '_ {
        self.source
            .iter()
            .flat_map(|s| s.demuxer.chapters())
            .map(|c| c.start_us as f64 / TIME_BASE as f64)
    }
}
