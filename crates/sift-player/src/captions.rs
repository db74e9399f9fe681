//! 隐藏字幕与图文电视的子扫描.
//!
//! 从节目映射表的描述符中列出 ATSC 字幕服务与图文电视页,
//! 与字幕解码器在码流中实际看到的服务合并成确定的轨道顺序.
//!
//! 608 与 708 的服务分别以 [`CaptionKey::Line21`] 与
//! [`CaptionKey::Digital`] 为键记录 "在表中" 与 "在轨道中" 两组集合,
//! 两组集合的差异决定是否需要重建轨道列表.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use log::{debug, info};
use sift_core::LanguageKey;
use sift_format::psi::{
    CaptionServiceDescriptor, DataBroadcastIdDescriptor, ProgramMapTable, TeletextDescriptor,
    stream_type, tag,
};
use sift_format::Stream;

use crate::track::{StreamInfo, TrackType, Tracks};

/// 统计码流中出现过的字幕服务所用的时间窗口
pub const CAPTION_SEEN_WINDOW: Duration = Duration::from_secs(15);

/// 608 通道数
pub const CC608_CHANNELS: usize = 4;
/// 708 服务号上限 (不含)
pub const CC708_SERVICES: usize = 64;

/// 字幕解码器报告码流中出现过的服务
pub trait CaptionServiceSource: Send {
    /// 窗口内出现过的 608 通道 (CC1..CC4)
    fn seen_608(&self, window: Duration) -> [bool; CC608_CHANNELS];

    /// 窗口内出现过的 708 服务 (下标即服务号, 0 未使用)
    fn seen_708(&self, window: Duration) -> [bool; CC708_SERVICES];
}

/// 字幕服务键
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CaptionKey {
    /// 608 通道 (1..=4)
    Line21(u8),
    /// 708 服务号 (1..=63)
    Digital(u8),
}

impl CaptionKey {
    fn for_track(kind: TrackType, service: i32) -> Option<Self> {
        let n = u8::try_from(service).ok()?;
        match kind {
            TrackType::Cc608 => Some(Self::Line21(n)),
            TrackType::Cc708 => Some(Self::Digital(n)),
            _ => None,
        }
    }
}

/// ATSC 字幕扫描状态
#[derive(Debug, Clone, Default)]
pub struct CaptionState {
    /// 表中声明的字幕轨道
    pmt_tracks: Vec<(TrackType, StreamInfo)>,
    /// 码流中观察到的字幕轨道
    stream_tracks: Vec<(TrackType, StreamInfo)>,
    in_pmt: BTreeSet<CaptionKey>,
    in_tracks: BTreeSet<CaptionKey>,
}

impl CaptionState {
    /// 创建空状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 表中声明的字幕轨道
    pub fn pmt_tracks(&self) -> impl Iterator<Item = &StreamInfo> {
        self.pmt_tracks.iter().map(|(_, si)| si)
    }

    /// 服务是否在表中声明
    pub fn in_pmt(&self, key: CaptionKey) -> bool {
        self.in_pmt.contains(&key)
    }

    /// 服务是否在轨道列表中
    pub fn in_tracks(&self, key: CaptionKey) -> bool {
        self.in_tracks.contains(&key)
    }

    /// 从节目映射表读取字幕服务描述符
    ///
    /// 只看第一条视频流上的描述符以及节目级描述符.
    pub fn scan_pmt(&mut self, pmt: Option<&ProgramMapTable>, video_index: usize) {
        self.in_pmt.clear();
        self.pmt_tracks.clear();

        let Some(pmt) = pmt else {
            debug!("没有节目映射表, 跳过 ATSC 字幕扫描");
            return;
        };
        let Some(i) = (0..pmt.stream_count()).find(|&i| pmt.is_video(i)) else {
            return;
        };

        let descriptors = pmt
            .descriptors(i, tag::CAPTION_SERVICE)
            .chain(
                pmt.program_descriptors
                    .iter()
                    .filter(|d| d.tag == tag::CAPTION_SERVICE),
            );
        for desc in descriptors {
            let Ok(csd) = CaptionServiceDescriptor::parse(desc) else {
                continue;
            };
            for svc in &csd.services {
                let (kind, service, key) = if svc.digital_cc {
                    (
                        TrackType::Cc708,
                        i32::from(svc.service_number),
                        CaptionKey::Digital(svc.service_number),
                    )
                } else {
                    let line21 = if svc.line21_field { 3 } else { 1 };
                    (TrackType::Cc608, i32::from(line21), CaptionKey::Line21(line21))
                };
                let mut si = StreamInfo::new(video_index, svc.language, 0).with_stream_id(service);
                si.easy_reader = svc.easy_reader;
                si.wide_aspect = svc.wide_aspect;
                self.in_pmt.insert(key);
                self.pmt_tracks.push((kind, si));
            }
        }
    }

    /// 合并表中轨道与码流轨道, 写入 608/708 轨道列表
    ///
    /// 两个来源各自保持原顺序, 按服务号做有序合并; 服务号相同时
    /// 表中的条目先出. 每种类型按语言重新编号.
    pub fn update_tracks(&mut self, tracks: &mut Tracks) {
        tracks.clear(TrackType::Cc608);
        tracks.clear(TrackType::Cc708);
        self.in_tracks.clear();

        let mut lang_count: HashMap<(TrackType, LanguageKey), u32> = HashMap::new();
        let (mut p, mut s) = (0, 0);
        loop {
            let from_pmt = match (self.pmt_tracks.get(p), self.stream_tracks.get(s)) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some((_, pi)), Some((_, si))) => si.stream_id.cmp(&pi.stream_id) != Ordering::Less,
            };
            let (kind, si) = if from_pmt {
                p += 1;
                &self.pmt_tracks[p - 1]
            } else {
                s += 1;
                &self.stream_tracks[s - 1]
            };

            let mut nsi = si.clone();
            let counter = lang_count.entry((*kind, nsi.language)).or_insert(0);
            nsi.language_index = *counter;
            *counter += 1;

            info!(
                "字幕服务 #{} 的语言为 {}",
                nsi.stream_id,
                nsi.language.name()
            );
            if let Some(key) = CaptionKey::for_track(*kind, nsi.stream_id) {
                self.in_tracks.insert(key);
            }
            tracks.push(*kind, nsi);
        }
    }

    /// 对比码流中出现的服务与当前轨道, 必要时重建码流轨道并重新合并
    ///
    /// 返回是否重建了轨道列表.
    pub fn update_from_streams(
        &mut self,
        source: &dyn CaptionServiceSource,
        check_608: bool,
        check_708: bool,
        pmt: Option<&ProgramMapTable>,
        video_index: usize,
        tracks: &mut Tracks,
    ) -> bool {
        let mut need_608 = false;
        let mut seen_608 = [false; CC608_CHANNELS];
        if check_608 {
            seen_608 = source.seen_608(CAPTION_SEEN_WINDOW);
            for (i, &seen) in seen_608.iter().enumerate() {
                let key = CaptionKey::Line21(i as u8 + 1);
                need_608 |= self.service_changed(key, seen);
            }
        }

        let mut need_708 = false;
        let mut seen_708 = [false; CC708_SERVICES];
        if check_708 || need_608 {
            seen_708 = source.seen_708(CAPTION_SEEN_WINDOW);
            for (i, &seen) in seen_708.iter().enumerate().skip(1) {
                if need_608 || need_708 {
                    break;
                }
                need_708 |= self.service_changed(CaptionKey::Digital(i as u8), seen);
            }
            if need_708 && !check_608 {
                seen_608 = source.seen_608(CAPTION_SEEN_WINDOW);
            }
        }

        if !need_608 && !need_708 {
            return false;
        }

        self.scan_pmt(pmt, video_index);

        self.stream_tracks.clear();
        for (i, &seen) in seen_708.iter().enumerate().skip(1) {
            if seen && !self.in_pmt(CaptionKey::Digital(i as u8)) {
                let mut si = StreamInfo::new(video_index, LanguageKey::UNDEFINED, 0)
                    .with_stream_id(i as i32);
                si.wide_aspect = true;
                self.stream_tracks.push((TrackType::Cc708, si));
            }
        }
        for (i, &seen) in seen_608.iter().enumerate() {
            if seen && !self.in_pmt(CaptionKey::Line21(i as u8 + 1)) {
                // CC1/CC3 与 708 服务 1/2 通常是同一语言
                let language = match i {
                    0 => self.pmt_language(TrackType::Cc708, 1),
                    2 => self.pmt_language(TrackType::Cc708, 2),
                    _ => LanguageKey::UNDEFINED,
                };
                let si = StreamInfo::new(video_index, language, 0).with_stream_id(i as i32 + 1);
                self.stream_tracks.push((TrackType::Cc608, si));
            }
        }

        debug!(
            "码流字幕服务变化 (608: {need_608}, 708: {need_708}), 重建 {} 条码流轨道",
            self.stream_tracks.len()
        );
        self.update_tracks(tracks);
        true
    }

    /// 在码流中出现却不在轨道里, 或在轨道里却既不在码流也不在表中
    fn service_changed(&self, key: CaptionKey, seen: bool) -> bool {
        let in_tracks = self.in_tracks(key);
        (seen && !in_tracks) || (!seen && in_tracks && !self.in_pmt(key))
    }

    fn pmt_language(&self, kind: TrackType, service: i32) -> LanguageKey {
        self.pmt_tracks
            .iter()
            .find(|(k, si)| *k == kind && si.stream_id == service)
            .map(|(_, si)| si.language)
            .unwrap_or(LanguageKey::UNDEFINED)
    }
}

/// 从节目映射表扫描图文电视页
///
/// 字幕页列表已有内容时不再扫描; 假定只有一条复用的图文电视流.
pub fn scan_teletext(pmt: Option<&ProgramMapTable>, stream_index: usize, tracks: &mut Tracks) {
    let Some(pmt) = pmt else {
        return;
    };
    if tracks.count(TrackType::TeletextCaptions) > 0 {
        return;
    }

    for i in 0..pmt.stream_count() {
        if pmt.stream_type(i) != Some(stream_type::PRIVATE_DATA) {
            continue;
        }
        for desc in pmt.descriptors(i, tag::TELETEXT) {
            let Ok(td) = TeletextDescriptor::parse(desc) else {
                continue;
            };
            for (k, entry) in td.entries.iter().enumerate() {
                let kind = match entry.teletext_type {
                    2 => TrackType::TeletextCaptions,
                    1 => TrackType::TeletextMenu,
                    _ => continue,
                };
                let magazine = if entry.magazine == 0 { 8 } else { entry.magazine };
                let page_key = (u32::from(magazine) << 8) | u32::from(entry.page);
                let si = StreamInfo::new(stream_index, entry.language, page_key)
                    .with_stream_id(page_key as i32);
                info!(
                    "图文电视流 #{k} ({}) 语言 {}, 页 {} {:02X}",
                    if kind == TrackType::TeletextCaptions { "字幕" } else { "菜单" },
                    entry.language.name(),
                    magazine,
                    entry.page
                );
                tracks.push(kind, si);
            }
        }
        if tracks.count(TrackType::TeletextCaptions) > 0 {
            break;
        }
    }
}

/// 纯文本字幕流的轨道记录
pub fn raw_text_track(stream: &Stream) -> StreamInfo {
    StreamInfo::new(stream.index, stream.language(), 0)
}

/// 扫描对象轮播流的数据广播描述符, 返回其中的网络启动信息
pub fn scan_carousel(pmt: &ProgramMapTable) -> Vec<Vec<u8>> {
    let mut boot_infos = Vec::new();
    for i in 0..pmt.stream_count() {
        if !pmt.is_object_carousel(i) {
            continue;
        }
        for desc in pmt.descriptors(i, tag::DATA_BROADCAST_ID) {
            if let Ok(dbid) = DataBroadcastIdDescriptor::parse(desc) {
                boot_infos.extend(dbid.network_boot_infos());
            }
        }
    }
    boot_infos
}
