//! 音频轨道自动选择.
//!
//! 选择顺序:
//!
//! 1. 当前选择仍有效时保持不变
//! 2. 只有一条轨道时选它
//! 3. 容器标记为默认的轨道
//! 4. 上次期望的双单声道子流 (忽略流索引, 频道切换后流可能重新编号)
//! 5. 上次期望的语言, 同语言序号优先
//! 6. 编码优先级级联: 界面语言, 偏好语言列表, 不限语言
//!
//! 级联的每一轮依次尝试 DTS-HD MA (需 DTS-HD 直通), TrueHD,
//! DTS-HD HRA (需 DTS-HD 直通), E-AC3, DTS, AC3, 任意编码;
//! 同一轮内取声道最多者, 相同时先出现者胜出.

use log::info;
use sift_codec::{CodecId, profile};
use sift_core::LanguageKey;
use sift_format::{Disposition, Stream};

use crate::track::{TrackType, Tracks};

/// 自动选择音频轨道所需的外部输入
pub struct AudioSelectContext<'a> {
    /// 容器的全部流, 以流索引访问
    pub streams: &'a [Stream],
    /// 界面语言
    pub ui_language: LanguageKey,
    /// 偏好语言 (按优先级)
    pub language_preference: &'a [LanguageKey],
    /// 输出能否直通 DTS-HD
    pub can_dts_hd: bool,
    /// 流能否直通, 第二个参数为是否按流自身的 profile 判断
    pub passthrough: &'a dyn Fn(&Stream, bool) -> bool,
}

impl AudioSelectContext<'_> {
    fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }
}

/// 编码过滤条件
#[derive(Debug, Clone, Copy)]
enum CodecFilter {
    Any,
    Codec(CodecId),
    DtsProfile(i32),
}

/// 从候选轨道中取声道数最多的一条
fn filter_max_ch(
    tracks: &Tracks,
    candidates: &[usize],
    filter: CodecFilter,
    ctx: &AudioSelectContext<'_>,
) -> Option<usize> {
    let list = tracks.list(TrackType::Audio);
    let mut selected = None;
    let mut max_seen: i64 = -1;
    for &i in candidates {
        let Some(stream) = list.get(i).and_then(|t| ctx.stream(t.stream_index)) else {
            continue;
        };
        let accepted = match filter {
            CodecFilter::Any => true,
            CodecFilter::Codec(CodecId::Dts) => {
                stream.codec_id == CodecId::Dts && (ctx.passthrough)(stream, false)
            }
            CodecFilter::Codec(id) => stream.codec_id == id,
            // 无法解码 DTS-HD, 只在可以直通时选择
            CodecFilter::DtsProfile(p) => {
                stream.codec_id == CodecId::Dts
                    && stream.profile() == p
                    && (ctx.passthrough)(stream, true)
            }
        };
        let channels = i64::from(stream.channels());
        if accepted && channels > max_seen {
            selected = Some(i);
            max_seen = channels;
        }
    }
    selected
}

/// 在一组候选轨道上执行编码优先级级联
fn codec_cascade(tracks: &Tracks, candidates: &[usize], ctx: &AudioSelectContext<'_>) -> Option<usize> {
    let mut order = Vec::with_capacity(7);
    if ctx.can_dts_hd {
        order.push(CodecFilter::DtsProfile(profile::DTS_HD_MA));
    }
    order.push(CodecFilter::Codec(CodecId::TrueHd));
    if ctx.can_dts_hd {
        order.push(CodecFilter::DtsProfile(profile::DTS_HD_HRA));
    }
    order.extend([
        CodecFilter::Codec(CodecId::Eac3),
        CodecFilter::Codec(CodecId::Dts),
        CodecFilter::Codec(CodecId::Ac3),
        CodecFilter::Any,
    ]);
    order
        .into_iter()
        .find_map(|filter| filter_max_ch(tracks, candidates, filter, ctx))
}

fn filter_lang(tracks: &Tracks, language: Option<LanguageKey>) -> Vec<usize> {
    tracks
        .list(TrackType::Audio)
        .iter()
        .enumerate()
        .filter(|(_, t)| language.is_none_or(|l| t.language == l))
        .map(|(i, _)| i)
        .collect()
}

/// 按优先级挑选音频轨道索引, 不修改选择状态
fn pick_audio_track(tracks: &Tracks, ctx: &AudioSelectContext<'_>) -> Option<usize> {
    let list = tracks.list(TrackType::Audio);
    if list.is_empty() {
        return None;
    }
    if list.len() == 1 {
        return Some(0);
    }

    info!("尝试选择默认音频轨道");
    let default = list.iter().position(|t| {
        ctx.stream(t.stream_index)
            .is_some_and(|s| s.disposition.contains(Disposition::DEFAULT))
    });
    if default.is_some() {
        return default;
    }

    let wanted = tracks.wanted(TrackType::Audio);
    if let Some(w) = wanted.filter(|w| w.substream >= 0) {
        info!("尝试重新选择音频子流 {}", w.substream);
        if let Some(i) = list.iter().position(|t| t.substream == w.substream) {
            return Some(i);
        }
    }

    if let Some(w) = wanted {
        info!("尝试重新选择音频轨道 ({} #{})", w.language, w.language_index);
        let mut found = None;
        for (i, t) in list.iter().enumerate() {
            if t.language == w.language {
                found = Some(i);
                if t.language_index == w.language_index {
                    break;
                }
            }
        }
        if found.is_some() {
            return found;
        }
    }

    info!("按语言选择音频轨道 (界面语言 {})", ctx.ui_language);
    let languages = std::iter::once(ctx.ui_language).chain(ctx.language_preference.iter().copied());
    for language in languages {
        let candidates = filter_lang(tracks, Some(language));
        if let Some(i) = codec_cascade(tracks, &candidates, ctx) {
            return Some(i);
        }
    }

    info!("不限语言选择音频轨道");
    codec_cascade(tracks, &filter_lang(tracks, None), ctx)
}

/// 自动选择音频轨道
///
/// 选中后若期望轨道为空则以选中者初始化. 找不到时选择置为无.
/// 调用方随后需要重新配置音频输出.
pub fn auto_select_audio_track(tracks: &mut Tracks, ctx: &AudioSelectContext<'_>) -> Option<usize> {
    if let Some(current) = tracks.current(TrackType::Audio) {
        return Some(current);
    }

    match pick_audio_track(tracks, ctx) {
        Some(i) => {
            tracks.select(TrackType::Audio, Some(i));
            if tracks.wanted(TrackType::Audio).is_none() {
                let selected = tracks.selected(TrackType::Audio).cloned();
                tracks.set_wanted(TrackType::Audio, selected);
            }
            if let Some(s) = tracks.selected(TrackType::Audio) {
                info!("选中音频轨道 {} (流 #{})", i + 1, s.stream_index);
            }
            Some(i)
        }
        None => {
            if tracks.selected(TrackType::Audio).is_some() || tracks.count(TrackType::Audio) > 0 {
                info!("没有合适的音频轨道");
            }
            tracks.select(TrackType::Audio, None);
            None
        }
    }
}

/// 自动选择字幕类轨道
///
/// 当前选择有效时保持; 否则先按期望轨道的语言与语言序号找回,
/// 再按界面语言与偏好语言, 都不匹配时选第一条.
pub fn auto_select_track(
    tracks: &mut Tracks,
    kind: TrackType,
    ui_language: LanguageKey,
    language_preference: &[LanguageKey],
) -> Option<usize> {
    if let Some(current) = tracks.current(kind) {
        return Some(current);
    }
    let list = tracks.list(kind);
    if list.is_empty() {
        tracks.select(kind, None);
        return None;
    }

    let by_wanted = tracks.wanted(kind).and_then(|w| {
        list.iter()
            .position(|t| t.language == w.language && t.language_index == w.language_index)
            .or_else(|| list.iter().position(|t| t.language == w.language))
    });
    let index = by_wanted
        .or_else(|| {
            std::iter::once(ui_language)
                .chain(language_preference.iter().copied())
                .find_map(|lang| list.iter().position(|t| t.language == lang))
        })
        .unwrap_or(0);

    tracks.select(kind, Some(index));
    if tracks.wanted(kind).is_none() {
        let selected = tracks.selected(kind).cloned();
        tracks.set_wanted(kind, selected);
    }
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_util::audio_stream;
    use crate::track::StreamInfo;
    use std::collections::HashMap;

    fn tracks_for(streams: &[Stream]) -> Tracks {
        let mut tracks = Tracks::new();
        let mut per_lang: HashMap<LanguageKey, u32> = HashMap::new();
        for s in streams {
            let n = per_lang.entry(s.language()).or_insert(0);
            tracks.push(
                TrackType::Audio,
                StreamInfo::new(s.index, s.language(), *n).with_channels(s.channels()),
            );
            *n += 1;
        }
        tracks
    }

    fn no_passthrough(_: &Stream, _: bool) -> bool {
        false
    }

    fn ctx<'a>(
        streams: &'a [Stream],
        prefs: &'a [LanguageKey],
        passthrough: &'a dyn Fn(&Stream, bool) -> bool,
    ) -> AudioSelectContext<'a> {
        AudioSelectContext {
            streams,
            ui_language: LanguageKey::from_code("eng"),
            language_preference: prefs,
            can_dts_hd: false,
            passthrough,
        }
    }

    #[test]
    fn test_单条轨道直接选中() {
        let streams = vec![audio_stream(0, CodecId::Mp2, 2, "fra")];
        let mut tracks = tracks_for(&streams);
        let prefs = [LanguageKey::from_code("deu")];
        let c = ctx(&streams, &prefs, &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(0));
        assert_eq!(tracks.wanted(TrackType::Audio).unwrap().stream_index, 0);
    }

    #[test]
    fn test_空列表与已有选择() {
        let streams: Vec<Stream> = Vec::new();
        let mut tracks = Tracks::new();
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), None);
        assert!(tracks.selected(TrackType::Audio).is_none());

        let streams = vec![
            audio_stream(0, CodecId::Mp2, 2, "eng"),
            audio_stream(1, CodecId::Ac3, 6, "eng"),
        ];
        let mut tracks = tracks_for(&streams);
        tracks.select(TrackType::Audio, Some(0));
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(0));
    }

    #[test]
    fn test_默认轨道优先() {
        let mut streams = vec![
            audio_stream(0, CodecId::Ac3, 6, "eng"),
            audio_stream(1, CodecId::Mp2, 2, "deu"),
        ];
        streams[1].disposition |= Disposition::DEFAULT;
        let mut tracks = tracks_for(&streams);
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));
    }

    #[test]
    fn test_语言偏好与编码级联() {
        // langA = fra, langB = spa; 无直通能力时跳过 DTS
        let streams = vec![
            audio_stream(0, CodecId::Ac3, 2, "fra"),
            audio_stream(1, CodecId::Dts, 6, "fra"),
            audio_stream(2, CodecId::Ac3, 6, "spa"),
        ];
        let mut tracks = tracks_for(&streams);
        let prefs = [LanguageKey::from_code("fra")];
        let c = ctx(&streams, &prefs, &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(0));

        // 可以直通 DTS 时选 DTS
        let mut tracks = tracks_for(&streams);
        let dts_ok = |s: &Stream, _: bool| s.codec_id == CodecId::Dts;
        let c = ctx(&streams, &prefs, &dts_ok);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));
    }

    #[test]
    fn test_同编码取声道最多_相同取先出现() {
        let streams = vec![
            audio_stream(0, CodecId::Mp2, 2, "eng"),
            audio_stream(1, CodecId::Ac3, 2, "eng"),
            audio_stream(2, CodecId::Ac3, 6, "eng"),
            audio_stream(3, CodecId::Ac3, 6, "eng"),
        ];
        let mut tracks = tracks_for(&streams);
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(2));
    }

    #[test]
    fn test_界面语言缺失时不限语言() {
        let streams = vec![
            audio_stream(0, CodecId::Mp2, 2, "ita"),
            audio_stream(1, CodecId::Eac3, 6, "por"),
        ];
        let mut tracks = tracks_for(&streams);
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));
    }

    #[test]
    fn test_dts_hd_ma_需要直通() {
        let mut streams = vec![
            audio_stream(0, CodecId::TrueHd, 8, "eng"),
            audio_stream(1, CodecId::Dts, 8, "eng"),
        ];
        if let Some(a) = streams[1].audio_mut() {
            a.profile = profile::DTS_HD_MA;
        }
        let ma_ok = |s: &Stream, with_profile: bool| {
            s.codec_id == CodecId::Dts && with_profile && s.profile() == profile::DTS_HD_MA
        };
        let mut c = ctx(&streams, &[], &ma_ok);
        c.can_dts_hd = true;
        let mut tracks = tracks_for(&streams);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));

        // 输出不支持 DTS-HD 时 TrueHD 优先
        c.can_dts_hd = false;
        let mut tracks = tracks_for(&streams);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(0));
    }

    #[test]
    fn test_重新编号后按语言序号找回() {
        let streams = vec![
            audio_stream(0, CodecId::Mp2, 2, "deu"),
            audio_stream(1, CodecId::Mp2, 2, "deu"),
            audio_stream(2, CodecId::Ac3, 6, "eng"),
        ];
        let mut tracks = tracks_for(&streams);
        tracks.set_wanted(
            TrackType::Audio,
            Some(StreamInfo::new(7, LanguageKey::from_code("deu"), 1)),
        );
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));
        // 期望轨道已有值, 不被覆盖
        assert_eq!(tracks.wanted(TrackType::Audio).unwrap().stream_index, 7);
    }

    #[test]
    fn test_子流重新定位() {
        let streams = vec![audio_stream(4, CodecId::Mp2, 2, "")];
        let mut tracks = Tracks::new();
        let und = LanguageKey::UNDEFINED;
        tracks.push(TrackType::Audio, StreamInfo::new(0, und, 0).with_substream(0));
        tracks.push(TrackType::Audio, StreamInfo::new(0, und, 1).with_substream(1));
        tracks.set_wanted(
            TrackType::Audio,
            Some(StreamInfo::new(3, und, 0).with_substream(1)),
        );
        let c = ctx(&streams, &[], &no_passthrough);
        assert_eq!(auto_select_audio_track(&mut tracks, &c), Some(1));
    }

    #[test]
    fn test_字幕类轨道选择() {
        let mut tracks = Tracks::new();
        let (deu, eng) = (LanguageKey::from_code("deu"), LanguageKey::from_code("eng"));
        assert_eq!(auto_select_track(&mut tracks, TrackType::Subtitle, eng, &[]), None);

        tracks.push(TrackType::Subtitle, StreamInfo::new(3, deu, 0));
        tracks.push(TrackType::Subtitle, StreamInfo::new(4, eng, 0));
        tracks.push(TrackType::Subtitle, StreamInfo::new(5, eng, 1));
        assert_eq!(auto_select_track(&mut tracks, TrackType::Subtitle, eng, &[]), Some(1));

        // 期望轨道优先于界面语言
        tracks.reset_selection();
        tracks.set_wanted(TrackType::Subtitle, Some(StreamInfo::new(9, eng, 1)));
        assert_eq!(auto_select_track(&mut tracks, TrackType::Subtitle, deu, &[]), Some(2));

        // 没有匹配的语言时选第一条
        let mut tracks = Tracks::new();
        tracks.push(TrackType::Cc608, StreamInfo::new(0, deu, 0).with_stream_id(1));
        let fra = LanguageKey::from_code("fra");
        assert_eq!(auto_select_track(&mut tracks, TrackType::Cc608, fra, &[eng]), Some(0));
    }
}
