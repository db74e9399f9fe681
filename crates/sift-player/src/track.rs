//! 轨道模型.
//!
//! 每种轨道类型维护一个有序列表, 以及 "期望 / 已选 / 当前索引" 三元组.
//! 列表顺序决定用户看到的轨道编号, 也是选择时的平局裁决依据.

use std::fmt;

use log::warn;
use serde::Serialize;
use sift_core::LanguageKey;

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackType {
    /// 视频
    Video,
    /// 音频
    Audio,
    /// 字幕
    Subtitle,
    /// 图文电视字幕页
    TeletextCaptions,
    /// 图文电视菜单页
    TeletextMenu,
    /// 纯文本字幕
    RawText,
    /// EIA-608 隐藏字幕
    Cc608,
    /// CEA-708 数字字幕
    Cc708,
    /// 附件 (字体)
    Attachment,
}

impl TrackType {
    /// 全部轨道类型
    pub const ALL: [TrackType; 9] = [
        Self::Video,
        Self::Audio,
        Self::Subtitle,
        Self::TeletextCaptions,
        Self::TeletextMenu,
        Self::RawText,
        Self::Cc608,
        Self::Cc708,
        Self::Attachment,
    ];

    /// 类型总数
    pub const COUNT: usize = Self::ALL.len();

    const fn slot(self) -> usize {
        match self {
            Self::Video => 0,
            Self::Audio => 1,
            Self::Subtitle => 2,
            Self::TeletextCaptions => 3,
            Self::TeletextMenu => 4,
            Self::RawText => 5,
            Self::Cc608 => 6,
            Self::Cc708 => 7,
            Self::Attachment => 8,
        }
    }

    /// 类型名称
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::TeletextCaptions => "teletext-captions",
            Self::TeletextMenu => "teletext-menu",
            Self::RawText => "raw-text",
            Self::Cc608 => "cc608",
            Self::Cc708 => "cc708",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一条基本流的分类记录
///
/// `(stream_index, substream, stream_id)` 在同一类型的列表中唯一.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    /// 容器流索引
    pub stream_index: usize,
    /// 语言
    pub language: LanguageKey,
    /// 同语言中的第几条轨道
    pub language_index: u32,
    /// 字幕服务号、图文电视页组合键或直通逻辑标识
    pub stream_id: i32,
    /// 声道数
    pub channels: u32,
    /// 双单声道子流序号, -1 表示不是双单声道
    pub substream: i32,
    /// 强制字幕
    pub forced: bool,
    /// 简易读本字幕
    pub easy_reader: bool,
    /// 宽屏字幕
    pub wide_aspect: bool,
}

impl StreamInfo {
    /// 创建记录, 其余字段取默认值
    pub fn new(stream_index: usize, language: LanguageKey, language_index: u32) -> Self {
        Self {
            stream_index,
            language,
            language_index,
            stream_id: -1,
            channels: 0,
            substream: -1,
            forced: false,
            easy_reader: false,
            wide_aspect: false,
        }
    }

    /// 设置服务号 / 逻辑标识
    pub fn with_stream_id(mut self, stream_id: i32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// 设置声道数
    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    /// 设置子流序号
    pub fn with_substream(mut self, substream: i32) -> Self {
        self.substream = substream;
        self
    }

    /// 列表内的唯一键
    pub fn key(&self) -> (usize, i32, i32) {
        (self.stream_index, self.substream, self.stream_id)
    }
}

/// 每种类型的轨道列表与选择状态
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    lists: [Vec<StreamInfo>; TrackType::COUNT],
    wanted: [Option<StreamInfo>; TrackType::COUNT],
    selected: [Option<StreamInfo>; TrackType::COUNT],
    current: [Option<usize>; TrackType::COUNT],
}

impl Tracks {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定类型的轨道列表
    pub fn list(&self, kind: TrackType) -> &[StreamInfo] {
        &self.lists[kind.slot()]
    }

    /// 轨道数
    pub fn count(&self, kind: TrackType) -> usize {
        self.lists[kind.slot()].len()
    }

    /// 追加轨道, 重复的 (流, 子流, 服务号) 键被拒绝
    pub fn push(&mut self, kind: TrackType, info: StreamInfo) -> bool {
        let list = &mut self.lists[kind.slot()];
        if list.iter().any(|t| t.key() == info.key()) {
            warn!(
                "{kind} 轨道重复: 流 #{} 子流 {}",
                info.stream_index, info.substream
            );
            return false;
        }
        list.push(info);
        true
    }

    /// 在指定位置插入轨道 (子流拆分)
    pub(crate) fn insert(&mut self, kind: TrackType, index: usize, info: StreamInfo) {
        self.lists[kind.slot()].insert(index, info);
    }

    /// 删除指定位置的轨道 (子流合并)
    pub(crate) fn remove(&mut self, kind: TrackType, index: usize) -> StreamInfo {
        self.lists[kind.slot()].remove(index)
    }

    /// 可变访问单条轨道
    pub(crate) fn get_mut(&mut self, kind: TrackType, index: usize) -> Option<&mut StreamInfo> {
        self.lists[kind.slot()].get_mut(index)
    }

    /// 整体替换列表
    pub fn replace(&mut self, kind: TrackType, list: Vec<StreamInfo>) {
        self.lists[kind.slot()] = list;
    }

    /// 清空列表
    pub fn clear(&mut self, kind: TrackType) {
        self.lists[kind.slot()].clear();
    }

    /// 清空所有列表 (选择状态保留, 由 `reset_selection` 处理)
    pub fn clear_all(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    /// 复位当前索引与已选轨道, 期望轨道保留以便重新定位
    pub fn reset_selection(&mut self) {
        self.current = Default::default();
        self.selected = Default::default();
    }

    /// 当前索引
    pub fn current(&self, kind: TrackType) -> Option<usize> {
        self.current[kind.slot()].filter(|&i| i < self.count(kind))
    }

    /// 已选轨道
    pub fn selected(&self, kind: TrackType) -> Option<&StreamInfo> {
        self.selected[kind.slot()].as_ref()
    }

    /// 期望轨道
    pub fn wanted(&self, kind: TrackType) -> Option<&StreamInfo> {
        self.wanted[kind.slot()].as_ref()
    }

    /// 设置期望轨道
    pub fn set_wanted(&mut self, kind: TrackType, info: Option<StreamInfo>) {
        self.wanted[kind.slot()] = info;
    }

    /// 列表变动后让当前索引重新指向已选轨道
    ///
    /// 按 (流, 子流) 查找. 已选轨道已不在列表中时清除选择并返回 `false`.
    pub(crate) fn relocate_selected(&mut self, kind: TrackType) -> bool {
        let slot = kind.slot();
        let Some(selected) = self.selected[slot].as_ref() else {
            self.current[slot] = None;
            return true;
        };
        let found = self.lists[slot]
            .iter()
            .position(|t| t.stream_index == selected.stream_index && t.substream == selected.substream);
        match found {
            Some(i) => {
                self.current[slot] = Some(i);
                true
            }
            None => {
                self.current[slot] = None;
                self.selected[slot] = None;
                false
            }
        }
    }

    /// 选中第 `index` 条轨道, `None` 表示不选
    ///
    /// 越界索引视为不选. 返回是否选中了轨道.
    pub fn select(&mut self, kind: TrackType, index: Option<usize>) -> bool {
        let slot = kind.slot();
        match index.and_then(|i| self.lists[slot].get(i).map(|t| (i, t.clone()))) {
            Some((i, info)) => {
                self.current[slot] = Some(i);
                self.selected[slot] = Some(info);
                true
            }
            None => {
                self.current[slot] = None;
                self.selected[slot] = None;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eng() -> LanguageKey {
        LanguageKey::from_code("eng")
    }

    #[test]
    fn test_重复键被拒绝() {
        let mut tracks = Tracks::new();
        assert!(tracks.push(TrackType::Audio, StreamInfo::new(1, eng(), 0)));
        assert!(!tracks.push(TrackType::Audio, StreamInfo::new(1, eng(), 1)));
        assert!(tracks.push(TrackType::Audio, StreamInfo::new(1, eng(), 1).with_substream(0)));
        assert_eq!(tracks.count(TrackType::Audio), 2);
        // 不同类型互不影响
        assert!(tracks.push(TrackType::Subtitle, StreamInfo::new(1, eng(), 0)));
    }

    #[test]
    fn test_选择与复位() {
        let mut tracks = Tracks::new();
        tracks.push(TrackType::Audio, StreamInfo::new(3, eng(), 0).with_channels(2));
        assert!(tracks.select(TrackType::Audio, Some(0)));
        assert_eq!(tracks.current(TrackType::Audio), Some(0));
        assert_eq!(tracks.selected(TrackType::Audio).unwrap().stream_index, 3);

        assert!(!tracks.select(TrackType::Audio, Some(5)));
        assert!(tracks.selected(TrackType::Audio).is_none());

        tracks.select(TrackType::Audio, Some(0));
        tracks.set_wanted(TrackType::Audio, tracks.selected(TrackType::Audio).cloned());
        tracks.reset_selection();
        assert!(tracks.current(TrackType::Audio).is_none());
        assert!(tracks.wanted(TrackType::Audio).is_some());
    }

    #[test]
    fn test_列表变短后当前索引失效() {
        let mut tracks = Tracks::new();
        tracks.push(TrackType::Audio, StreamInfo::new(1, eng(), 0));
        tracks.push(TrackType::Audio, StreamInfo::new(2, eng(), 1));
        tracks.select(TrackType::Audio, Some(1));
        tracks.clear(TrackType::Audio);
        assert!(tracks.current(TrackType::Audio).is_none());
    }
}
