//! 关键帧间隔跟踪与时间戳故障检测.

use log::info;
use sift_core::NOPTS_VALUE;

/// 一次 GOP 起点处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GopUpdate {
    /// 需要从外部同步位置表
    pub sync_position_map: bool,
    /// 关键帧间隔有了新值
    pub new_distance: Option<u32>,
}

/// 关键帧间隔状态
///
/// 第二个 GOP 起点确定初始间隔 (`gopset`), 之后每个 GOP 与上一个
/// GOP 的帧距离为正且不同于当前间隔时采用新值.
#[derive(Debug, Clone, Default)]
pub struct KeyframeTracker {
    /// 当前关键帧间隔, 0 表示未知
    distance: u32,
    max_distance: u32,
    gopset: bool,
    prev_gop: Option<i64>,
    last_key: i64,
}

impl KeyframeTracker {
    /// 创建
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前关键帧间隔
    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// 观察到的最大间隔
    pub fn max_distance(&self) -> u32 {
        self.max_distance
    }

    /// 是否已见过两个关键帧
    pub fn gopset(&self) -> bool {
        self.gopset
    }

    /// 最近一个关键帧的帧序号
    pub fn last_key(&self) -> i64 {
        self.last_key
    }

    /// 设置默认间隔 (打开文件时)
    pub fn set_distance(&mut self, distance: u32) {
        self.distance = distance;
        self.max_distance = self.max_distance.max(distance);
    }

    /// 已有完整位置表时不再需要从码流确定间隔
    pub fn mark_gopset(&mut self) {
        self.gopset = true;
    }

    /// 定位后以落点作为最近关键帧
    pub fn set_last_key(&mut self, frame_index: i64) {
        self.last_key = frame_index;
    }

    /// 复位 GOP 基准 (格式变化与定位后)
    pub fn reset_gop(&mut self) {
        self.gopset = false;
        self.prev_gop = None;
    }

    /// 处理一个 GOP 起点
    ///
    /// `frame_index` 为该数据包所在帧的序号 (已读帧数减一).
    pub fn on_gop_start(&mut self, frame_index: i64, live: bool) -> GopUpdate {
        let mut update = GopUpdate::default();

        if let Some(prev) = self.prev_gop.filter(|_| self.distance != 1) {
            let observed = frame_index - prev;
            let mut adopt = false;

            if !self.gopset || live {
                info!("尚未确定关键帧间隔, 同步位置表");
                update.sync_position_map = true;
                if observed > 0 && !live {
                    info!("初始关键帧间隔: {observed}");
                    self.gopset = true;
                    adopt = true;
                }
            } else if observed > 0 && observed != i64::from(self.distance) {
                info!("关键帧间隔由 {} 变为 {observed}", self.distance);
                adopt = true;
            }

            if adopt {
                let distance = u32::try_from(observed).unwrap_or(u32::MAX);
                self.distance = distance;
                self.max_distance = self.max_distance.max(distance);
                update.new_distance = Some(distance);
            }
        }

        self.prev_gop = Some(frame_index);
        self.last_key = frame_index;
        update
    }
}

/// PTS/DTS 故障检测
///
/// 分别统计 PTS 与 DTS 不递增的次数, 取故障较少的一方作为帧时间.
#[derive(Debug, Clone)]
pub struct PtsFaultDetector {
    faulty_pts: u32,
    faulty_dts: u32,
    last_pts: i64,
    last_dts: i64,
}

impl Default for PtsFaultDetector {
    fn default() -> Self {
        Self {
            faulty_pts: 0,
            faulty_dts: 0,
            last_pts: NOPTS_VALUE,
            last_dts: NOPTS_VALUE,
        }
    }
}

impl PtsFaultDetector {
    /// 创建
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// PTS 故障次数
    pub fn faulty_pts(&self) -> u32 {
        self.faulty_pts
    }

    /// DTS 故障次数
    pub fn faulty_dts(&self) -> u32 {
        self.faulty_dts
    }

    /// 记录一个数据包的时间戳, 返回更可靠的那个
    pub fn guess(&mut self, pts: i64, dts: i64) -> i64 {
        if dts != NOPTS_VALUE {
            if self.last_dts != NOPTS_VALUE && dts <= self.last_dts {
                self.faulty_dts += 1;
            }
            self.last_dts = dts;
        }
        if pts != NOPTS_VALUE {
            if self.last_pts != NOPTS_VALUE && pts <= self.last_pts {
                self.faulty_pts += 1;
            }
            self.last_pts = pts;
        }

        if pts != NOPTS_VALUE && (self.faulty_pts <= self.faulty_dts || dts == NOPTS_VALUE) {
            pts
        } else {
            dts
        }
    }
}
