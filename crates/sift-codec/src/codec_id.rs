//! 编解码器标识符.

use std::fmt;
use sift_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// H.263
    H263,
    /// MPEG-4 Part 2
    Mpeg4,
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VC-1
    Vc1,
    /// WMV3
    Wmv3,
    /// Motion JPEG
    Mjpeg,

    // ========================
    // 音频编解码器
    // ========================
    /// MP2 (MPEG Audio Layer II)
    Mp2,
    /// MP3
    Mp3,
    /// AAC (ADTS)
    Aac,
    /// AAC (LATM)
    AacLatm,
    /// AC-3 (Dolby Digital)
    Ac3,
    /// E-AC-3 (Dolby Digital Plus)
    Eac3,
    /// DTS (含 DTS-HD 各规格, 通过 profile 区分)
    Dts,
    /// Dolby TrueHD
    TrueHd,
    /// FLAC
    Flac,
    /// Vorbis
    Vorbis,
    /// Opus
    Opus,
    /// PCM 有符号 16 位大端 (蓝光 LPCM)
    PcmS16be,
    /// PCM 有符号 16 位小端
    PcmS16le,

    // ========================
    // 字幕
    // ========================
    /// DVB 位图字幕
    DvbSubtitle,
    /// DVD 位图字幕
    DvdSubtitle,
    /// 蓝光 PGS 字幕
    HdmvPgsSubtitle,
    /// DVB 图文电视 (由专用图文解码器处理)
    DvbTeletext,
    /// 原始文本字幕
    Text,
    /// SubRip
    Srt,
    /// ASS/SSA
    Ass,

    // ========================
    // 附件
    // ========================
    /// TrueType 字体
    Ttf,
}

/// 音频 profile 常量 (目前只有 DTS 家族需要区分)
pub mod profile {
    /// 未知 profile
    pub const UNKNOWN: i32 = -99;
    /// DTS 核心
    pub const DTS: i32 = 20;
    /// DTS-ES
    pub const DTS_ES: i32 = 30;
    /// DTS 96/24
    pub const DTS_96_24: i32 = 40;
    /// DTS-HD 高分辨率
    pub const DTS_HD_HRA: i32 = 50;
    /// DTS-HD 主音频 (无损)
    pub const DTS_HD_MA: i32 = 60;
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Unknown,

            Self::Mpeg1Video
            | Self::Mpeg2Video
            | Self::H263
            | Self::Mpeg4
            | Self::H264
            | Self::H265
            | Self::Vc1
            | Self::Wmv3
            | Self::Mjpeg => MediaType::Video,

            Self::Mp2
            | Self::Mp3
            | Self::Aac
            | Self::AacLatm
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::TrueHd
            | Self::Flac
            | Self::Vorbis
            | Self::Opus
            | Self::PcmS16be
            | Self::PcmS16le => MediaType::Audio,

            Self::DvbSubtitle
            | Self::DvdSubtitle
            | Self::HdmvPgsSubtitle
            | Self::DvbTeletext
            | Self::Text
            | Self::Srt
            | Self::Ass => MediaType::Subtitle,

            Self::Ttf => MediaType::Attachment,
        }
    }

    /// 硬件解码能力查询使用的 "MPEG 版本号"
    ///
    /// 0 表示该编解码器没有对应的硬件解码路径.
    pub const fn mpeg_version(&self) -> u8 {
        match self {
            Self::Mpeg1Video => 1,
            Self::Mpeg2Video => 2,
            Self::H263 => 3,
            Self::Mpeg4 => 4,
            Self::H264 => 5,
            Self::Vc1 => 6,
            Self::Wmv3 => 7,
            _ => 0,
        }
    }

    /// 是否为 MPEG-1/2 视频 (起始码状态机适用)
    pub const fn is_mpeg_video(&self) -> bool {
        matches!(self, Self::Mpeg1Video | Self::Mpeg2Video)
    }

    /// 获取编解码器的名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::H263 => "h263",
            Self::Mpeg4 => "mpeg4",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vc1 => "vc1",
            Self::Wmv3 => "wmv3",
            Self::Mjpeg => "mjpeg",
            Self::Mp2 => "mp2",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::AacLatm => "aac_latm",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Dts => "dts",
            Self::TrueHd => "truehd",
            Self::Flac => "flac",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::PcmS16be => "pcm_s16be",
            Self::PcmS16le => "pcm_s16le",
            Self::DvbSubtitle => "dvb_subtitle",
            Self::DvdSubtitle => "dvd_subtitle",
            Self::HdmvPgsSubtitle => "hdmv_pgs_subtitle",
            Self::DvbTeletext => "dvb_teletext",
            Self::Text => "text",
            Self::Srt => "srt",
            Self::Ass => "ass",
            Self::Ttf => "ttf",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
