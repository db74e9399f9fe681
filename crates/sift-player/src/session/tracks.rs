//! 轨道选择、音频配置与附件查询.

use std::sync::Arc;

use log::{debug, info, warn};
use sift_core::MediaType;
use sift_format::Stream;

use super::{DecoderSession, lock_unpoisoned};
use crate::audio::AudioOutput;
use crate::select::{AudioSelectContext, auto_select_audio_track, auto_select_track};
use crate::track::{StreamInfo, TrackType, Tracks};

/// 双单声道子流调整的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstreamChange {
    /// 一条轨道拆成了子流 0/1
    Split,
    /// 子流 0/1 合并回一条轨道
    Merged,
}

/// 需要自动选择的轨道类型 (视频在扫描时已选定, 附件不参与)
const AUTO_SELECT_KINDS: [TrackType; 6] = [
    TrackType::Subtitle,
    TrackType::TeletextCaptions,
    TrackType::TeletextMenu,
    TrackType::RawText,
    TrackType::Cc608,
    TrackType::Cc708,
];

impl DecoderSession {
    /// 全部轨道
    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    /// 指定类型的轨道数
    pub fn track_count(&self, kind: TrackType) -> usize {
        self.tracks.count(kind)
    }

    /// 指定类型的当前轨道
    pub fn current_track(&self, kind: TrackType) -> Option<usize> {
        self.tracks.current(kind)
    }

    /// 用户选择第 `index` 条轨道
    ///
    /// 越界时保持原选择. 返回选择后的当前索引.
    pub fn set_track(&mut self, kind: TrackType, index: usize) -> Option<usize> {
        if index >= self.tracks.count(kind) {
            warn!("{kind} 轨道 #{index} 不存在, 共 {} 条", self.tracks.count(kind));
            return self.tracks.current(kind);
        }
        {
            let lock = Arc::clone(&self.decode_lock);
            let _guard = lock_unpoisoned(&lock);
            self.tracks.select(kind, Some(index));
            let selected = self.tracks.selected(kind).cloned();
            self.tracks.set_wanted(kind, selected);
        }
        info!("选择 {kind} 轨道 #{index}");
        if kind == TrackType::Audio {
            self.setup_audio_stream();
        }
        self.tracks.current(kind)
    }

    /// 为所有类型自动选择轨道
    pub fn auto_select_tracks(&mut self) {
        let lock = Arc::clone(&self.decode_lock);
        let _guard = lock_unpoisoned(&lock);
        self.auto_select_tracks_locked();
    }

    /// 调用方已持有解码锁
    pub(super) fn auto_select_tracks_locked(&mut self) {
        {
            let audio = &self.audio;
            let output: &dyn AudioOutput = &*self.audio_out;
            let passthrough = |stream: &Stream, with_profile: bool| {
                audio.do_passthrough(output, stream, with_profile)
            };
            let streams = self.source.as_ref().map_or(&[][..], |s| s.demuxer.streams());
            let ctx = AudioSelectContext {
                streams,
                ui_language: self.config.ui_language,
                language_preference: &self.config.language_preference,
                can_dts_hd: output.can_dts_hd(),
                passthrough: &passthrough,
            };
            auto_select_audio_track(&mut self.tracks, &ctx);
        }
        self.setup_audio_stream();

        for kind in AUTO_SELECT_KINDS {
            auto_select_track(
                &mut self.tracks,
                kind,
                self.config.ui_language,
                &self.config.language_preference,
            );
        }
    }

    /// 按选中的音频轨道配置音频输出, 返回音频输入是否变化
    pub fn setup_audio_stream(&mut self) -> bool {
        let selected = self.tracks.selected(TrackType::Audio);
        let orig_channels = selected.map_or(2, |t| if t.channels == 0 { 2 } else { t.channels });
        let stream = selected.and_then(|t| {
            self.source
                .as_ref()
                .and_then(|s| s.demuxer.streams().get(t.stream_index))
        });
        self.audio.setup(&mut *self.audio_out, stream, orig_channels)
    }

    /// 禁止或允许音频直通, 一旦禁止不再恢复
    pub fn set_disable_passthrough(&mut self, disable: bool) {
        let has_selection = self.tracks.selected(TrackType::Audio).is_some();
        if self.audio.set_disable_passthrough(disable, has_selection) {
            let lock = Arc::clone(&self.decode_lock);
            let _guard = lock_unpoisoned(&lock);
            self.setup_audio_stream();
        }
    }

    /// 流能否直通
    pub fn do_passthrough(&self, stream: &Stream, with_profile: bool) -> bool {
        self.audio.do_passthrough(&*self.audio_out, stream, with_profile)
    }

    /// 轨道的显示名称
    ///
    /// 音频如 `"1: English AC3 5.1ch"`, 字幕如 `"Subtitle 2: French (forced)"`.
    pub fn track_description(&self, kind: TrackType, n: usize) -> Option<String> {
        let track = self.tracks.list(kind).get(n)?;
        let language = track.language.name();
        match kind {
            TrackType::Audio => {
                let codec = self
                    .streams()
                    .get(track.stream_index)
                    .map_or_else(String::new, |s| s.codec_id.name().to_uppercase());
                let channels = match track.channels {
                    0 => "?ch".to_string(),
                    c if c > 4 && c % 2 == 0 => format!("{}.1ch", c - 1),
                    c => format!("{c}ch"),
                };
                Some(format!("{}: {language} {codec} {channels}", n + 1))
            }
            TrackType::Subtitle => Some(format!(
                "Subtitle {}: {language}{}",
                n + 1,
                if track.forced { " (forced)" } else { "" }
            )),
            _ => Some(format!("{}: {language}", n + 1)),
        }
    }

    /// 按组件标签选择音频轨道
    ///
    /// 标签不大于 0 时匹配没有标签的流.
    pub fn set_audio_by_component_tag(&mut self, tag: i32) -> bool {
        let streams = self.streams();
        let found = self.tracks.list(TrackType::Audio).iter().position(|t| {
            streams.get(t.stream_index).is_some_and(|s| match s.component_tag {
                Some(ct) if ct > 0 => ct == tag,
                _ => tag <= 0,
            })
        });
        match found {
            Some(i) => self.set_track(TrackType::Audio, i).is_some(),
            None => {
                debug!("没有组件标签为 {tag} 的音频轨道");
                false
            }
        }
    }

    /// 按组件标签选择视频流
    ///
    /// 流不在视频轨道里时追加一条.
    pub fn set_video_by_component_tag(&mut self, tag: i32) -> bool {
        let Some(stream) = self
            .streams()
            .iter()
            .find(|s| {
                s.media_type == MediaType::Video
                    && match s.component_tag {
                        Some(ct) if ct > 0 => ct == tag,
                        _ => tag <= 0,
                    }
            })
            .map(|s| (s.index, s.language()))
        else {
            debug!("没有组件标签为 {tag} 的视频流");
            return false;
        };
        let (index, language) = stream;
        let position = self
            .tracks
            .list(TrackType::Video)
            .iter()
            .position(|t| t.stream_index == index);
        let position = match position {
            Some(p) => p,
            None => {
                let lock = Arc::clone(&self.decode_lock);
                let _guard = lock_unpoisoned(&lock);
                self.tracks
                    .push(TrackType::Video, StreamInfo::new(index, language, 0));
                self.tracks.count(TrackType::Video) - 1
            }
        };
        self.set_track(TrackType::Video, position).is_some()
    }

    /// 按流的双语言状态拆分或合并音频子流
    ///
    /// 轨道只有一条且子流为 -1 时拆为子流 0/1; 已拆分且下一条轨道属于
    /// 同一流时合并回 -1. 其它情况记录后不做处理.
    ///
    /// 列表变动后当前索引跟随已选轨道; 已选轨道被拆分或合并掉时重新自动选择.
    pub fn setup_audio_stream_sub_indexes(&mut self, stream_index: usize) -> Option<SubstreamChange> {
        let lock = Arc::clone(&self.decode_lock);
        let _guard = lock_unpoisoned(&lock);

        let change = self.split_or_merge_substreams(stream_index)?;
        if !self.tracks.relocate_selected(TrackType::Audio) {
            debug!("已选音频轨道随子流调整消失, 重新选择");
            self.auto_select_tracks_locked();
        }
        Some(change)
    }

    fn split_or_merge_substreams(&mut self, stream_index: usize) -> Option<SubstreamChange> {
        let list = self.tracks.list(TrackType::Audio);
        let Some(pos) = list.iter().position(|t| t.stream_index == stream_index) else {
            warn!("音频流 #{stream_index} 没有对应的轨道");
            return None;
        };

        if list[pos].substream == -1 {
            let first = list[pos].clone().with_substream(0);
            let mut second = first.clone().with_substream(1);
            // 与扫描时一致: 第二个子流取该语言下一个空闲序号
            second.language_index = list
                .iter()
                .filter(|t| t.language == first.language)
                .map(|t| t.language_index + 1)
                .max()
                .unwrap_or(0);
            if let Some(t) = self.tracks.get_mut(TrackType::Audio, pos) {
                *t = first;
            }
            self.tracks.insert(TrackType::Audio, pos + 1, second);
            info!("音频流 #{stream_index} 拆分为双单声道子流");
            return Some(SubstreamChange::Split);
        }

        if list.get(pos + 1).is_some_and(|t| t.stream_index == stream_index) {
            self.tracks.remove(TrackType::Audio, pos + 1);
            if let Some(t) = self.tracks.get_mut(TrackType::Audio, pos) {
                t.substream = -1;
            }
            info!("音频流 #{stream_index} 的子流合并");
            return Some(SubstreamChange::Merged);
        }

        warn!("音频流 #{stream_index} 的子流布局异常, 不做调整");
        None
    }

    /// 对比字幕解码器报告的服务, 必要时重建 608/708 轨道
    pub fn update_caption_tracks_from_streams(&mut self, check_608: bool, check_708: bool) -> bool {
        let Some(source) = self.caption_source.as_deref() else {
            return false;
        };
        let video_index = self
            .tracks
            .selected(TrackType::Video)
            .map_or(0, |t| t.stream_index);
        let pmt = self.source.as_ref().and_then(|s| s.demuxer.pmt());
        let changed = self.captions.update_from_streams(
            source,
            check_608,
            check_708,
            pmt,
            video_index,
            &mut self.tracks,
        );
        if changed {
            for kind in [TrackType::Cc608, TrackType::Cc708] {
                self.tracks.select(kind, None);
                auto_select_track(
                    &mut self.tracks,
                    kind,
                    self.config.ui_language,
                    &self.config.language_preference,
                );
            }
        }
        changed
    }

    /// 第 `n` 条附件的文件名与数据
    pub fn attachment_data(&self, n: usize) -> Option<(&str, &[u8])> {
        let track = self.tracks.list(TrackType::Attachment).get(n)?;
        let stream = self.streams().get(track.stream_index)?;
        let name = stream.metadata_value("filename").unwrap_or("");
        Some((name, stream.extra_data.as_slice()))
    }

    /// 第 `n` 条字幕轨道的编解码头
    pub fn subtitle_header(&self, n: usize) -> Option<&[u8]> {
        let track = self.tracks.list(TrackType::Subtitle).get(n)?;
        let stream = self.streams().get(track.stream_index)?;
        Some(stream.extra_data.as_slice())
    }
}
