//! 节目映射表 (PMT) 快照与描述符解码.
//!
//! 播放核心只读取 PMT: 流数量、每条流的 stream_type / PID 以及
//! 描述符列表. 这里提供解析后的只读视图和几种常用描述符的解码.
//!
//! # PMT 段结构
//! ```text
//! table_id(8) | section_syntax(1) '0'(1) reserved(2) section_length(12)
//! program_number(16) | reserved(2) version(5) current_next(1)
//! section_number(8) | last_section_number(8)
//! reserved(3) PCR_PID(13) | reserved(4) program_info_length(12)
//! program descriptors...
//! { stream_type(8) reserved(3) PID(13) reserved(4) ES_info_length(12) descriptors... }*
//! CRC_32
//! ```

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use sift_core::{LanguageKey, SiftError, SiftResult};

/// 描述符标签
pub mod tag {
    /// ISO 639 语言描述符
    pub const ISO_639_LANGUAGE: u8 = 0x0A;
    /// DVB 流标识描述符 (组件标签)
    pub const STREAM_IDENTIFIER: u8 = 0x52;
    /// DVB 图文电视描述符
    pub const TELETEXT: u8 = 0x56;
    /// DVB 字幕描述符
    pub const SUBTITLING: u8 = 0x59;
    /// DVB 数据广播标识描述符
    pub const DATA_BROADCAST_ID: u8 = 0x66;
    /// DVB AC-3 描述符
    pub const DVB_AC3: u8 = 0x6A;
    /// DVB E-AC-3 描述符
    pub const DVB_EAC3: u8 = 0x7A;
    /// ATSC 字幕服务描述符
    pub const CAPTION_SERVICE: u8 = 0x86;
}

/// 常见 stream_type
pub mod stream_type {
    /// MPEG-1 视频
    pub const MPEG1_VIDEO: u8 = 0x01;
    /// MPEG-2 视频
    pub const MPEG2_VIDEO: u8 = 0x02;
    /// MPEG-1 音频
    pub const MPEG1_AUDIO: u8 = 0x03;
    /// MPEG-2 音频
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// PES 私有数据
    pub const PRIVATE_DATA: u8 = 0x06;
    /// DSM-CC 类型 B
    pub const DSMCC_B: u8 = 0x0B;
    /// DSM-CC 类型 D
    pub const DSMCC_D: u8 = 0x0D;
    /// AAC (ADTS)
    pub const AAC_ADTS: u8 = 0x0F;
    /// MPEG-4 Part 2 视频
    pub const MPEG4_VIDEO: u8 = 0x10;
    /// AAC (LATM)
    pub const AAC_LATM: u8 = 0x11;
    /// H.264
    pub const H264: u8 = 0x1B;
    /// H.265
    pub const H265: u8 = 0x24;
    /// ATSC AC-3
    pub const AC3: u8 = 0x81;
    /// DTS
    pub const DTS: u8 = 0x82;
    /// TrueHD
    pub const TRUEHD: u8 = 0x83;
    /// ATSC E-AC-3
    pub const EAC3: u8 = 0x87;
    /// VC-1 (私有)
    pub const VC1: u8 = 0xEA;
}

/// 原始描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// 描述符标签
    pub tag: u8,
    /// 描述符负载 (不含 tag 与 length)
    pub data: Vec<u8>,
}

/// 解析描述符循环
pub fn parse_descriptors(mut data: &[u8]) -> Vec<Descriptor> {
    let mut out = Vec::new();
    while data.len() >= 2 {
        let tag = data[0];
        let len = data[1] as usize;
        if 2 + len > data.len() {
            debug!("PSI: 描述符 0x{tag:02X} 长度 {len} 越界, 截断");
            break;
        }
        out.push(Descriptor {
            tag,
            data: data[2..2 + len].to_vec(),
        });
        data = &data[2 + len..];
    }
    out
}

/// PMT 中的一条基本流
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// stream_type
    pub stream_type: u8,
    /// ES PID
    pub pid: u16,
    /// ES 描述符
    pub descriptors: Vec<Descriptor>,
}

/// 节目映射表快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMapTable {
    /// 节目号
    pub program_number: u16,
    /// PCR PID
    pub pcr_pid: u16,
    /// 版本号
    pub version: u8,
    /// 节目级描述符
    pub program_descriptors: Vec<Descriptor>,
    /// 基本流
    pub streams: Vec<PmtStream>,
}

impl ProgramMapTable {
    /// 解析 PMT 段 (`section` 从 table_id 开始, CRC 不校验)
    pub fn parse(section: &[u8]) -> SiftResult<Self> {
        if section.len() < 16 {
            return Err(SiftError::InvalidData("PMT: 段长度不足".into()));
        }
        if section[0] != 0x02 {
            return Err(SiftError::InvalidData(format!(
                "PMT: table_id 0x{:02X} 不是 0x02",
                section[0]
            )));
        }
        let section_length = (BigEndian::read_u16(&section[1..3]) & 0x0FFF) as usize;
        let end = (3 + section_length).min(section.len());
        if end < 16 {
            return Err(SiftError::InvalidData("PMT: section_length 非法".into()));
        }
        // 去掉 CRC
        let body_end = end - 4;

        let program_number = BigEndian::read_u16(&section[3..5]);
        let version = (section[5] >> 1) & 0x1F;
        let pcr_pid = BigEndian::read_u16(&section[8..10]) & 0x1FFF;
        let prog_info_len = (BigEndian::read_u16(&section[10..12]) & 0x0FFF) as usize;

        let mut pos = 12 + prog_info_len;
        if pos > body_end {
            return Err(SiftError::InvalidData("PMT: program_info_length 越界".into()));
        }
        let program_descriptors = parse_descriptors(&section[12..pos]);

        let mut streams = Vec::new();
        while pos + 5 <= body_end {
            let stream_type = section[pos];
            let pid = BigEndian::read_u16(&section[pos + 1..pos + 3]) & 0x1FFF;
            let es_info_len = (BigEndian::read_u16(&section[pos + 3..pos + 5]) & 0x0FFF) as usize;
            let desc_start = pos + 5;
            let desc_end = (desc_start + es_info_len).min(body_end);
            streams.push(PmtStream {
                stream_type,
                pid,
                descriptors: parse_descriptors(&section[desc_start..desc_end]),
            });
            pos = desc_start + es_info_len;
        }

        Ok(Self {
            program_number,
            pcr_pid,
            version,
            program_descriptors,
            streams,
        })
    }

    /// 基本流数量
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// 第 i 条流的 stream_type
    pub fn stream_type(&self, i: usize) -> Option<u8> {
        self.streams.get(i).map(|s| s.stream_type)
    }

    /// 第 i 条流的 PID
    pub fn stream_pid(&self, i: usize) -> Option<u16> {
        self.streams.get(i).map(|s| s.pid)
    }

    /// 第 i 条流是否为视频 (按 DVB 的 stream_type 解释)
    pub fn is_video(&self, i: usize) -> bool {
        matches!(
            self.stream_type(i),
            Some(
                stream_type::MPEG1_VIDEO
                    | stream_type::MPEG2_VIDEO
                    | stream_type::MPEG4_VIDEO
                    | stream_type::H264
                    | stream_type::H265
                    | stream_type::VC1
            )
        )
    }

    /// 第 i 条流是否为 DSM-CC 对象轮播
    pub fn is_object_carousel(&self, i: usize) -> bool {
        matches!(
            self.stream_type(i),
            Some(t) if (stream_type::DSMCC_B..=stream_type::DSMCC_D).contains(&t)
        )
    }

    /// 第 i 条流上标签为 `tag` 的描述符
    pub fn descriptors(&self, i: usize, tag: u8) -> impl Iterator<Item = &Descriptor> {
        self.streams
            .get(i)
            .into_iter()
            .flat_map(|s| s.descriptors.iter())
            .filter(move |d| d.tag == tag)
    }

    /// 按 PID 查找流序号
    pub fn index_of_pid(&self, pid: u16) -> Option<usize> {
        self.streams.iter().position(|s| s.pid == pid)
    }
}

// ============================================================
// 描述符解码
// ============================================================

fn check_tag(desc: &Descriptor, expected: u8, name: &str) -> SiftResult<()> {
    if desc.tag != expected {
        return Err(SiftError::InvalidArgument(format!(
            "{name}: 标签 0x{:02X} 不匹配",
            desc.tag
        )));
    }
    Ok(())
}

fn language_at(data: &[u8]) -> LanguageKey {
    LanguageKey::from_code(&String::from_utf8_lossy(&data[..3]))
}

/// ATSC 字幕服务条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionServiceEntry {
    /// 语言
    pub language: LanguageKey,
    /// 是否为数字字幕 (708)
    pub digital_cc: bool,
    /// 608: 是否位于第 21 行的第二场
    pub line21_field: bool,
    /// 708: 服务号
    pub service_number: u8,
    /// 简易阅读
    pub easy_reader: bool,
    /// 宽屏
    pub wide_aspect: bool,
}

/// ATSC 字幕服务描述符 (0x86)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionServiceDescriptor {
    /// 服务列表
    pub services: Vec<CaptionServiceEntry>,
}

impl CaptionServiceDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::CAPTION_SERVICE, "caption_service")?;
        let data = &desc.data;
        if data.is_empty() {
            return Err(SiftError::InvalidData("caption_service: 空描述符".into()));
        }
        let count = (data[0] & 0x1F) as usize;
        let mut services = Vec::with_capacity(count);
        for entry in data[1..].chunks_exact(6).take(count) {
            let digital_cc = entry[3] & 0x80 != 0;
            let flags = BigEndian::read_u16(&entry[4..6]);
            services.push(CaptionServiceEntry {
                language: language_at(entry),
                digital_cc,
                line21_field: !digital_cc && entry[3] & 0x01 != 0,
                service_number: if digital_cc { entry[3] & 0x3F } else { 0 },
                easy_reader: flags & 0x8000 != 0,
                wide_aspect: flags & 0x4000 != 0,
            });
        }
        Ok(Self { services })
    }
}

/// 图文电视条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeletextEntry {
    /// 语言
    pub language: LanguageKey,
    /// teletext_type (1 = 首页/菜单, 2 = 字幕)
    pub teletext_type: u8,
    /// 杂志号 (0 表示 8)
    pub magazine: u8,
    /// 页号 (BCD)
    pub page: u8,
}

/// DVB 图文电视描述符 (0x56)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextDescriptor {
    /// 条目
    pub entries: Vec<TeletextEntry>,
}

impl TeletextDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::TELETEXT, "teletext")?;
        let entries = desc
            .data
            .chunks_exact(5)
            .map(|e| TeletextEntry {
                language: language_at(e),
                teletext_type: e[3] >> 3,
                magazine: e[3] & 0x07,
                page: e[4],
            })
            .collect();
        Ok(Self { entries })
    }
}

/// DVB 字幕条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitlingEntry {
    /// 语言
    pub language: LanguageKey,
    /// subtitling_type
    pub subtitling_type: u8,
    /// composition_page_id
    pub composition_page: u16,
    /// ancillary_page_id
    pub ancillary_page: u16,
}

/// DVB 字幕描述符 (0x59)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlingDescriptor {
    /// 条目
    pub entries: Vec<SubtitlingEntry>,
}

impl SubtitlingDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::SUBTITLING, "subtitling")?;
        let entries = desc
            .data
            .chunks_exact(8)
            .map(|e| SubtitlingEntry {
                language: language_at(e),
                subtitling_type: e[3],
                composition_page: BigEndian::read_u16(&e[4..6]),
                ancillary_page: BigEndian::read_u16(&e[6..8]),
            })
            .collect();
        Ok(Self { entries })
    }
}

/// ISO 639 语言描述符 (0x0A)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    /// (语言, audio_type)
    pub languages: Vec<(LanguageKey, u8)>,
}

impl Iso639LanguageDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::ISO_639_LANGUAGE, "iso_639_language")?;
        let languages = desc
            .data
            .chunks_exact(4)
            .map(|e| (language_at(e), e[3]))
            .collect();
        Ok(Self { languages })
    }

    /// 是否声明了两种语言 (双单声道)
    pub fn is_dual_language(&self) -> bool {
        self.languages.len() >= 2
    }
}

/// DVB 流标识描述符 (0x52)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamIdentifierDescriptor {
    /// 组件标签
    pub component_tag: u8,
}

impl StreamIdentifierDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::STREAM_IDENTIFIER, "stream_identifier")?;
        let component_tag = *desc
            .data
            .first()
            .ok_or_else(|| SiftError::InvalidData("stream_identifier: 空描述符".into()))?;
        Ok(Self { component_tag })
    }
}

/// 英国 MHEG 配置对应的 data_broadcast_id
pub const DATA_BROADCAST_UK_PROFILE: u16 = 0x0106;
/// 英国 MHEG 应用类型
pub const APP_TYPE_UK_MHEG: u16 = 0x0101;
/// 网络启动信息子描述符标签
pub const SUB_DESC_NETWORK_BOOT_INFO: u8 = 0x01;

/// DVB 数据广播标识描述符 (0x66)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBroadcastIdDescriptor {
    /// data_broadcast_id
    pub data_broadcast_id: u16,
    /// id_selector 字节
    pub selector: Vec<u8>,
}

impl DataBroadcastIdDescriptor {
    /// 解码
    pub fn parse(desc: &Descriptor) -> SiftResult<Self> {
        check_tag(desc, tag::DATA_BROADCAST_ID, "data_broadcast_id")?;
        if desc.data.len() < 2 {
            return Err(SiftError::InvalidData("data_broadcast_id: 长度不足".into()));
        }
        Ok(Self {
            data_broadcast_id: BigEndian::read_u16(&desc.data[0..2]),
            selector: desc.data[2..].to_vec(),
        })
    }

    /// 提取英国 MHEG 应用的网络启动信息
    ///
    /// selector 由若干应用条目组成:
    /// `application_type_code(16) boot_priority_hint(8) app_specific_data_length(8) data...`,
    /// MHEG 应用的 data 是子描述符循环.
    pub fn network_boot_infos(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        if self.data_broadcast_id != DATA_BROADCAST_UK_PROFILE {
            return out;
        }
        let mut sel = self.selector.as_slice();
        while sel.len() >= 4 {
            let app_type = BigEndian::read_u16(&sel[0..2]);
            let len = sel[3] as usize;
            let end = (4 + len).min(sel.len());
            if app_type == APP_TYPE_UK_MHEG {
                let mut sub = &sel[4..end];
                while sub.len() >= 2 {
                    let sub_tag = sub[0];
                    let sub_len = (sub[1] as usize).min(sub.len() - 2);
                    if sub_tag == SUB_DESC_NETWORK_BOOT_INFO {
                        out.push(sub[2..2 + sub_len].to_vec());
                    }
                    sub = &sub[2 + sub_len..];
                }
            }
            sel = &sel[end..];
        }
        out
    }
}
