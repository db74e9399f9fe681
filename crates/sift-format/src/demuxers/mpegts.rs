//! MPEG-TS (Transport Stream) 解封装器.
//!
//! MPEG-TS 是一种基于固定大小 (188 字节) 包的传输流格式,
//! 广泛用于数字广播 (DVB/ATSC).
//!
//! # TS 包结构 (188 字节)
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ 同步字节 (0x47)                    1 byte│
//! │ TEI(1) + PUSI(1) + Priority(1) +         │
//! │   PID(13)                         2 bytes│
//! │ TSC(2) + AFC(2) + CC(4)          1 byte │
//! │ [Adaptation Field]               可变     │
//! │ [Payload]                        可变     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # 关键 PID
//! - PID 0x0000: PAT (Program Association Table)
//! - PID 0x1FFF: Null packet (填充)
//!
//! PMT 版本号变化时重建流集合, 并通过 `take_streams_changed` 通知上层.
//! 基于时间戳的定位在字节偏移上二分查找, 每个探测点重新同步到包边界.

use std::collections::{HashMap, VecDeque};
use std::io::SeekFrom;

use bytes::Bytes;
use log::{debug, warn};
use sift_codec::{CodecId, Packet};
use sift_core::rational::rescale_q;
use sift_core::timestamp::{lsb_unwrap, wrap_mask};
use sift_core::{MediaType, Rational, SampleFormat, SiftError, SiftResult};

use crate::demuxer::{Demuxer, SeekFlags};
use crate::io::IoContext;
use crate::psi::{
    Iso639LanguageDescriptor, PmtStream, ProgramMapTable, StreamIdentifierDescriptor,
    SubtitlingDescriptor, TeletextDescriptor, stream_type, tag,
};
use crate::stream::{Disposition, Stream};

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;
/// PAT PID
const PID_PAT: u16 = 0x0000;
/// 空包 PID
const PID_NULL: u16 = 0x1FFF;
/// PTS/DTS 位宽
const PTS_WRAP_BITS: u32 = 33;
/// 打开时最多预读的 TS 包数
const MAX_PROBE_PACKETS: usize = 4000;
/// 定位时每个探测点最多扫描的字节数
const SEEK_PROBE_BYTES: u64 = (TS_PACKET_SIZE * 2048) as u64;
/// 估算时长时从文件尾部扫描的字节数
const DURATION_PROBE_BYTES: u64 = (TS_PACKET_SIZE * 4096) as u64;

/// MPEG-TS stream_type → CodecId 映射
fn stream_type_to_codec(entry: &PmtStream) -> CodecId {
    let has = |t: u8| entry.descriptors.iter().any(|d| d.tag == t);
    match entry.stream_type {
        // 视频
        stream_type::MPEG1_VIDEO => CodecId::Mpeg1Video,
        stream_type::MPEG2_VIDEO => CodecId::Mpeg2Video,
        stream_type::MPEG4_VIDEO => CodecId::Mpeg4,
        stream_type::H264 => CodecId::H264,
        stream_type::H265 => CodecId::H265,
        stream_type::VC1 => CodecId::Vc1,
        // 音频
        stream_type::MPEG1_AUDIO | stream_type::MPEG2_AUDIO => CodecId::Mp2,
        stream_type::AAC_ADTS => CodecId::Aac,
        stream_type::AAC_LATM => CodecId::AacLatm,
        stream_type::AC3 => CodecId::Ac3,
        stream_type::EAC3 => CodecId::Eac3,
        stream_type::DTS => CodecId::Dts,
        stream_type::TRUEHD => CodecId::TrueHd,
        // 私有数据, 由描述符确定
        stream_type::PRIVATE_DATA => {
            if has(tag::TELETEXT) {
                CodecId::DvbTeletext
            } else if has(tag::SUBTITLING) {
                CodecId::DvbSubtitle
            } else if has(tag::DVB_AC3) {
                CodecId::Ac3
            } else if has(tag::DVB_EAC3) {
                CodecId::Eac3
            } else {
                CodecId::None
            }
        }
        _ => CodecId::None,
    }
}

/// 由 PMT 条目构造流描述
fn build_stream(index: usize, entry: &PmtStream, codec_id: CodecId) -> Stream {
    let mut stream = Stream::new(index, codec_id);
    if codec_id == CodecId::None {
        stream.media_type = MediaType::Data;
    }
    stream.id = u32::from(entry.pid);
    stream.time_base = Rational::MPEG_CLOCK;
    stream.pts_wrap_bits = PTS_WRAP_BITS;

    let mut dual_language = false;
    for desc in &entry.descriptors {
        match desc.tag {
            tag::ISO_639_LANGUAGE => {
                if let Ok(d) = Iso639LanguageDescriptor::parse(desc) {
                    if let Some((lang, _)) = d.languages.first() {
                        stream.set_metadata("language", lang.as_str());
                    }
                    dual_language = d.is_dual_language();
                }
            }
            tag::TELETEXT => {
                if let Ok(d) = TeletextDescriptor::parse(desc) {
                    if let Some(e) = d.entries.first() {
                        stream.set_metadata("language", e.language.as_str());
                    }
                }
            }
            tag::SUBTITLING => {
                if let Ok(d) = SubtitlingDescriptor::parse(desc) {
                    if let Some(e) = d.entries.first() {
                        stream.set_metadata("language", e.language.as_str());
                        // 0x20..=0x24 为听障字幕
                        if (0x20..=0x24).contains(&e.subtitling_type) {
                            stream.disposition |= Disposition::HEARING_IMPAIRED;
                        }
                    }
                }
            }
            tag::STREAM_IDENTIFIER => {
                if let Ok(d) = StreamIdentifierDescriptor::parse(desc) {
                    stream.component_tag = Some(i32::from(d.component_tag));
                }
            }
            _ => {}
        }
    }

    if let Some(audio) = stream.audio_mut() {
        let (sample_rate, channels, sample_format) = match codec_id {
            CodecId::Mp2 | CodecId::Mp3 => (48000, 2, SampleFormat::S16),
            CodecId::Ac3 | CodecId::Eac3 | CodecId::Dts => (48000, 6, SampleFormat::F32),
            CodecId::TrueHd => (48000, 8, SampleFormat::S32),
            _ => (48000, 2, SampleFormat::F32),
        };
        audio.sample_rate = sample_rate;
        audio.channels = channels;
        audio.sample_format = sample_format;
        audio.dual_language = dual_language;
    }

    stream
}

/// PES (Packetized Elementary Stream) 重组缓冲区
struct PesBuffer {
    /// 缓冲数据
    data: Vec<u8>,
    /// PTS (90kHz 时钟, -1 表示无)
    pts: i64,
    /// DTS
    dts: i64,
    /// 是否为随机访问点 (关键帧)
    random_access: bool,
    /// PES 起始所在 TS 包的字节偏移
    pos: i64,
    /// 对应的流索引
    stream_index: usize,
}

impl PesBuffer {
    fn new(stream_index: usize) -> Self {
        Self {
            data: Vec::new(),
            pts: -1,
            dts: -1,
            random_access: false,
            pos: -1,
            stream_index,
        }
    }

    fn clear(&mut self) {
        self.data.clear();
        self.pts = -1;
        self.dts = -1;
        self.random_access = false;
        self.pos = -1;
    }
}

/// 定位扫描时发现的 PES 起点
#[derive(Debug, Clone, Copy)]
struct PesStart {
    pos: u64,
    pts: i64,
    dts: i64,
    key: bool,
}

/// MPEG-TS 解封装器
pub struct TsDemuxer {
    /// 流信息
    streams: Vec<Stream>,
    /// PMT PID (从 PAT 获取)
    pmt_pid: u16,
    /// PID → 流索引映射
    pid_to_stream: HashMap<u16, usize>,
    /// PID → PES 缓冲区
    pes_buffers: HashMap<u16, PesBuffer>,
    /// PID → 未完成的 PSI 段
    psi_sections: HashMap<u16, Vec<u8>>,
    /// 已完成的数据包队列
    packet_queue: VecDeque<Packet>,
    /// PAT 是否已解析
    pat_parsed: bool,
    /// 当前 PMT
    pmt: Option<ProgramMapTable>,
    /// 流集合变化标志
    streams_changed: bool,
    /// 每个流的当前 DTS
    cur_dts: Vec<Option<i64>>,
    /// 第一个同步字节所在偏移
    data_start: u64,
    /// 最早的 PTS (90kHz)
    first_pts: Option<i64>,
    /// 容器时长 (微秒)
    duration_us: Option<i64>,
}

impl TsDemuxer {
    /// 创建 MPEG-TS 解封装器实例 (工厂函数)
    pub fn create() -> SiftResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建实例
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            pmt_pid: 0,
            pid_to_stream: HashMap::new(),
            pes_buffers: HashMap::new(),
            psi_sections: HashMap::new(),
            packet_queue: VecDeque::new(),
            pat_parsed: false,
            pmt: None,
            streams_changed: false,
            cur_dts: Vec::new(),
            data_start: 0,
            first_pts: None,
            duration_us: None,
        }
    }

    /// 读取一个 188 字节的 TS 包, 返回 (包起始偏移, 包数据)
    fn read_ts_packet(&self, io: &mut IoContext) -> SiftResult<(u64, [u8; TS_PACKET_SIZE])> {
        let pos = io.position()?;
        let mut pkt = [0u8; TS_PACKET_SIZE];
        match io.read_exact(&mut pkt) {
            Ok(()) => {}
            Err(SiftError::TryAgain) => {
                // 回到包边界, 下次重试时重新读取整个包
                if io.is_seekable() {
                    io.seek(SeekFrom::Start(pos))?;
                }
                return Err(SiftError::TryAgain);
            }
            Err(e) => return Err(e),
        }
        if pkt[0] != TS_SYNC_BYTE {
            debug!("TS: 偏移 {pos} 处同步字节丢失, 重新同步");
            io.seek(SeekFrom::Start(pos + 1))?;
            self.sync_to_packet(io)?;
            let pos = io.position()?;
            io.read_exact(&mut pkt)?;
            return Ok((pos, pkt));
        }
        Ok((pos, pkt))
    }

    /// 同步到下一个有效的 TS 包
    fn sync_to_packet(&self, io: &mut IoContext) -> SiftResult<()> {
        let max_search = 65536;
        for _ in 0..max_search {
            let b = io.read_u8()?;
            if b == TS_SYNC_BYTE {
                // 验证: 检查 188 字节后是否还有同步字节
                let pos = io.position()?;
                let mut check = [0u8; TS_PACKET_SIZE];
                let verified = match io.read_exact(&mut check) {
                    Ok(()) => check[TS_PACKET_SIZE - 1] == TS_SYNC_BYTE,
                    // 只剩最后一个包
                    Err(SiftError::Eof) => true,
                    Err(e) => return Err(e),
                };
                io.seek(SeekFrom::Start(if verified { pos - 1 } else { pos }))?;
                if verified {
                    return Ok(());
                }
            }
        }
        Err(SiftError::InvalidData("TS: 找不到同步字节".into()))
    }

    /// 解析 TS 包头 (4 字节)
    fn parse_ts_header(pkt: &[u8; TS_PACKET_SIZE]) -> (u16, bool, u8) {
        let pid = (u16::from(pkt[1] & 0x1F) << 8) | u16::from(pkt[2]);
        let pusi = (pkt[1] & 0x40) != 0;
        let afc = (pkt[3] >> 4) & 0x03;
        (pid, pusi, afc)
    }

    /// 获取 payload 的偏移与 random_access_indicator
    fn payload_offset(pkt: &[u8; TS_PACKET_SIZE], afc: u8) -> (usize, bool) {
        let mut offset = 4;
        let mut has_random_access = false;

        if afc == 2 || afc == 3 {
            let af_len = pkt[offset] as usize;
            if af_len > 0 && offset + 1 < TS_PACKET_SIZE {
                has_random_access = (pkt[offset + 1] & 0x40) != 0;
            }
            offset += 1 + af_len;
        }

        if afc == 1 || afc == 3 {
            (offset.min(TS_PACKET_SIZE), has_random_access)
        } else {
            (TS_PACKET_SIZE, has_random_access)
        }
    }

    /// 收集 PSI 段, 完整时返回
    fn collect_section(&mut self, pid: u16, payload: &[u8], pusi: bool) -> Option<Vec<u8>> {
        if pusi {
            let pointer = *payload.first()? as usize;
            let start = 1 + pointer;
            if start >= payload.len() {
                return None;
            }
            self.psi_sections.insert(pid, payload[start..].to_vec());
        } else if let Some(buf) = self.psi_sections.get_mut(&pid) {
            buf.extend_from_slice(payload);
        } else {
            return None;
        }

        let buf = self.psi_sections.get(&pid)?;
        if buf.len() < 3 {
            return None;
        }
        let total = 3 + ((usize::from(buf[1] & 0x0F) << 8) | usize::from(buf[2]));
        if buf.len() < total {
            return None;
        }
        let mut section = self.psi_sections.remove(&pid)?;
        section.truncate(total);
        Some(section)
    }

    /// 解析 PAT (Program Association Table)
    fn parse_pat(&mut self, section: &[u8]) {
        if self.pat_parsed || section.len() < 12 {
            return;
        }
        let section_length = (usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]);

        // 跳过 transport_stream_id(2) + version/flags(1) + section_number(1) + last_section(1)
        let entries_start = 8;
        let entries_end = (3 + section_length).min(section.len()).saturating_sub(4);
        if entries_end <= entries_start {
            return;
        }

        for chunk in section[entries_start..entries_end].chunks_exact(4) {
            let program_number = u16::from(chunk[0]) << 8 | u16::from(chunk[1]);
            let pid = (u16::from(chunk[2] & 0x1F) << 8) | u16::from(chunk[3]);
            if program_number != 0 {
                self.pmt_pid = pid;
                debug!("TS PAT: program={program_number} PMT_PID={pid:#06X}");
                break; // 只取第一个节目
            }
        }

        self.pat_parsed = true;
    }

    /// 解析 PMT (Program Map Table), 版本变化时重建流集合
    fn parse_pmt(&mut self, section: &[u8]) {
        let pmt = match ProgramMapTable::parse(section) {
            Ok(p) => p,
            Err(e) => {
                debug!("TS PMT: 解析失败: {e}");
                return;
            }
        };

        if let Some(old) = &self.pmt {
            if old.version == pmt.version {
                return;
            }
            debug!("TS PMT: 版本 {} -> {}, 重建流集合", old.version, pmt.version);
            self.streams_changed = true;
        }

        self.streams.clear();
        self.pid_to_stream.clear();
        self.pes_buffers.clear();
        self.packet_queue.clear();

        for (i, entry) in pmt.streams.iter().enumerate() {
            let codec_id = stream_type_to_codec(entry);
            if codec_id == CodecId::None && !pmt.is_object_carousel(i) {
                debug!(
                    "TS PMT: 跳过未知 stream_type=0x{:02X} PID={:#06X}",
                    entry.stream_type, entry.pid
                );
                continue;
            }

            let stream_index = self.streams.len();
            let stream = build_stream(stream_index, entry, codec_id);
            debug!(
                "TS PMT: stream_type=0x{:02X} PID={:#06X} codec={} lang={}",
                entry.stream_type,
                entry.pid,
                codec_id,
                stream.language()
            );

            self.pid_to_stream.insert(entry.pid, stream_index);
            self.pes_buffers
                .insert(entry.pid, PesBuffer::new(stream_index));
            self.streams.push(stream);
        }

        self.cur_dts = vec![None; self.streams.len()];
        self.pmt = Some(pmt);
    }

    /// 处理 PES 数据
    fn handle_pes_data(
        &mut self,
        pid: u16,
        payload: &[u8],
        pusi: bool,
        random_access: bool,
        pos: u64,
    ) {
        if !self.pid_to_stream.contains_key(&pid) {
            return;
        }

        if pusi {
            // Payload Unit Start: 先 flush 旧数据, 再开始新 PES
            self.flush_pes(pid);

            if let Some(buf) = self.pes_buffers.get_mut(&pid) {
                buf.random_access = random_access;
                buf.pos = pos as i64;
                if let Some((pts, dts, header_len)) = parse_pes_header(payload) {
                    buf.pts = pts;
                    buf.dts = dts;
                    buf.data.extend_from_slice(&payload[header_len.min(payload.len())..]);
                } else {
                    buf.data.extend_from_slice(payload);
                }
            }
        } else if let Some(buf) = self.pes_buffers.get_mut(&pid) {
            // 续包: 追加到缓冲区. 没有起点的续包直接丢弃.
            if buf.pos < 0 {
                return;
            }
            buf.data.extend_from_slice(payload);
            if random_access {
                buf.random_access = true;
            }
        }
    }

    /// 将 PES 缓冲区刷新为数据包
    fn flush_pes(&mut self, pid: u16) {
        let Some(buf) = self.pes_buffers.get_mut(&pid) else {
            return;
        };
        if buf.data.is_empty() {
            buf.clear();
            return;
        }

        let mut pkt = Packet::from_data(Bytes::from(std::mem::take(&mut buf.data)));
        pkt.stream_index = buf.stream_index;
        pkt.pts = if buf.pts >= 0 { buf.pts } else { sift_core::NOPTS_VALUE };
        pkt.dts = if buf.dts >= 0 { buf.dts } else { pkt.pts };
        pkt.is_keyframe = buf.random_access;
        pkt.time_base = Rational::MPEG_CLOCK;
        pkt.pos = buf.pos;

        if pkt.dts != sift_core::NOPTS_VALUE {
            if let Some(slot) = self.cur_dts.get_mut(pkt.stream_index) {
                *slot = Some(pkt.dts);
            }
        }

        self.packet_queue.push_back(pkt);
        buf.clear();
    }

    /// 刷新所有 PES 缓冲区 (按 PID 排序, 保证输出顺序确定)
    fn flush_all_pes(&mut self) {
        let mut pids: Vec<u16> = self.pes_buffers.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            self.flush_pes(pid);
        }
    }

    /// 处理一个 TS 包
    fn process_packet(&mut self, pos: u64, pkt: &[u8; TS_PACKET_SIZE]) {
        let (pid, pusi, afc) = Self::parse_ts_header(pkt);

        if pid == PID_NULL {
            return;
        }

        let (payload_off, random_access) = Self::payload_offset(pkt, afc);
        if payload_off >= TS_PACKET_SIZE {
            return;
        }

        let payload = &pkt[payload_off..];

        // PSI 表处理
        if pid == PID_PAT {
            if let Some(section) = self.collect_section(pid, payload, pusi) {
                self.parse_pat(&section);
            }
            return;
        }

        if pid == self.pmt_pid && self.pat_parsed {
            if let Some(section) = self.collect_section(pid, payload, pusi) {
                self.parse_pmt(&section);
            }
            return;
        }

        // ES 数据
        if self.pmt.is_some() {
            self.handle_pes_data(pid, payload, pusi, random_access, pos);
        }
    }

    /// 从 `from` 开始扫描到 `to`, 收集指定 PID 上的 PES 起点
    ///
    /// 只解析包头, 不改变解封装状态.
    fn scan_pes_starts(
        &self,
        io: &mut IoContext,
        from: u64,
        to: u64,
        pid: u16,
        first_only: bool,
    ) -> SiftResult<Vec<PesStart>> {
        io.seek(SeekFrom::Start(from))?;
        if from != self.data_start {
            match self.sync_to_packet(io) {
                Ok(()) => {}
                Err(SiftError::Eof) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            }
        }

        let mut found = Vec::new();
        loop {
            let pos = io.position()?;
            if pos >= to {
                break;
            }
            let mut pkt = [0u8; TS_PACKET_SIZE];
            match io.read_exact(&mut pkt) {
                Ok(()) => {}
                Err(SiftError::Eof) => break,
                Err(e) => return Err(e),
            }
            if pkt[0] != TS_SYNC_BYTE {
                match self.sync_to_packet(io) {
                    Ok(()) => continue,
                    Err(SiftError::Eof) => break,
                    Err(e) => return Err(e),
                }
            }
            let (pkt_pid, pusi, afc) = Self::parse_ts_header(&pkt);
            if pkt_pid != pid || !pusi {
                continue;
            }
            let (off, key) = Self::payload_offset(&pkt, afc);
            if off >= TS_PACKET_SIZE {
                continue;
            }
            if let Some((pts, dts, _)) = parse_pes_header(&pkt[off..]) {
                if pts >= 0 {
                    found.push(PesStart {
                        pos,
                        pts,
                        dts: if dts >= 0 { dts } else { pts },
                        key,
                    });
                    if first_only {
                        break;
                    }
                }
            }
        }
        Ok(found)
    }

    /// 扫描开头的 PES, 确定每个流的起始时间
    fn probe_start_times(&mut self, io: &mut IoContext) -> SiftResult<()> {
        let mut first: Vec<Option<i64>> = vec![None; self.streams.len()];
        for _ in 0..MAX_PROBE_PACKETS {
            let (pos, pkt) = match self.read_ts_packet(io) {
                Ok(p) => p,
                Err(SiftError::Eof) => break,
                Err(e) => return Err(e),
            };
            self.process_packet(pos, &pkt);
            while let Some(p) = self.packet_queue.pop_front() {
                if p.pts != sift_core::NOPTS_VALUE {
                    if let Some(slot) = first.get_mut(p.stream_index) {
                        slot.get_or_insert(p.pts);
                    }
                }
            }
            let all_found = self
                .streams
                .iter()
                .zip(&first)
                .all(|(s, f)| f.is_some() || !matches!(s.media_type, MediaType::Video | MediaType::Audio));
            if all_found {
                break;
            }
        }

        for (stream, pts) in self.streams.iter_mut().zip(&first) {
            if let Some(pts) = pts {
                stream.start_time = *pts;
            }
        }
        // 回绕附近取 "最早" 需要以其中一个为参照比较
        self.first_pts = first.iter().flatten().copied().reduce(|a, b| {
            if lsb_unwrap(b, a, PTS_WRAP_BITS) > wrap_mask(PTS_WRAP_BITS) / 2 {
                b
            } else {
                a
            }
        });
        Ok(())
    }

    /// 从文件尾部扫描最大的 PTS, 估算时长
    fn probe_duration(&mut self, io: &mut IoContext) -> SiftResult<()> {
        let (Some(size), Some(first)) = (io.size(), self.first_pts) else {
            return Ok(());
        };
        if !io.is_seekable() || io.is_streamed() {
            return Ok(());
        }
        let from = size.saturating_sub(DURATION_PROBE_BYTES).max(self.data_start);
        let mut last: Option<i64> = None;
        let pids: Vec<u16> = self.pid_to_stream.keys().copied().collect();
        for pid in pids {
            for start in self.scan_pes_starts(io, from, size, pid, false)? {
                let rel = lsb_unwrap(start.pts, first, PTS_WRAP_BITS);
                last = Some(last.map_or(rel, |l: i64| l.max(rel)));
            }
        }
        if let Some(rel) = last {
            self.duration_us = Some(rescale_q(rel, Rational::MPEG_CLOCK, Rational::MICRO));
            debug!("TS: 估算时长 {} us", rel * 100 / 9);
        }
        Ok(())
    }

    /// 定位使用的参照流
    fn reference_stream(&self, stream_index: Option<usize>) -> Option<usize> {
        stream_index
            .filter(|&i| i < self.streams.len())
            .or_else(|| {
                self.streams
                    .iter()
                    .position(|s| s.media_type == MediaType::Video)
            })
            .or_else(|| {
                self.streams
                    .iter()
                    .position(|s| s.media_type == MediaType::Audio)
            })
    }
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析 PES 包头, 提取 PTS/DTS
///
/// 返回 (pts, dts, header_length), 不存在的时间戳为 -1.
fn parse_pes_header(data: &[u8]) -> Option<(i64, i64, usize)> {
    // PES start code: 00 00 01 + stream_id
    if data.len() < 9 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return None;
    }

    // PES optional header: data[6] 为 10xxxxxx
    if (data[6] & 0xC0) != 0x80 {
        return Some((-1, -1, 6));
    }

    let pts_dts_flags = (data[7] >> 6) & 0x03;
    let pes_header_data_len = data[8] as usize;
    let header_len = 9 + pes_header_data_len;

    if header_len > data.len() {
        return Some((-1, -1, data.len().min(9)));
    }

    let mut pts: i64 = -1;
    let mut dts: i64 = -1;

    if pts_dts_flags >= 2 && data.len() >= 14 {
        pts = parse_timestamp(&data[9..14]);
    }

    if pts_dts_flags == 3 && data.len() >= 19 {
        dts = parse_timestamp(&data[14..19]);
    }

    Some((pts, dts, header_len))
}

/// 从 5 字节中提取 33-bit 时间戳
fn parse_timestamp(data: &[u8]) -> i64 {
    let b0 = i64::from(data[0]);
    let b1 = i64::from(data[1]);
    let b2 = i64::from(data[2]);
    let b3 = i64::from(data[3]);
    let b4 = i64::from(data[4]);

    ((b0 >> 1) & 0x07) << 30 | b1 << 22 | (b2 >> 1) << 15 | b3 << 7 | b4 >> 1
}

impl Demuxer for TsDemuxer {
    fn format_name(&self) -> &str {
        "mpegts"
    }

    fn open(&mut self, io: &mut IoContext) -> SiftResult<()> {
        // 同步到第一个 TS 包
        self.sync_to_packet(io)?;
        self.data_start = io.position()?;

        // 预读 TS 包直到解析出 PAT + PMT
        for _ in 0..MAX_PROBE_PACKETS {
            let (pos, pkt) = match self.read_ts_packet(io) {
                Ok(p) => p,
                Err(SiftError::Eof) => break,
                Err(e) => return Err(e),
            };

            self.process_packet(pos, &pkt);

            if self.pmt.is_some() && !self.streams.is_empty() {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(SiftError::InvalidData(
                "TS: 未找到任何流 (PAT/PMT 解析失败)".into(),
            ));
        }

        self.probe_start_times(io)?;
        self.probe_duration(io)?;

        // 回到数据起点重新读取
        io.seek(SeekFrom::Start(self.data_start))?;
        self.flush();
        self.cur_dts = vec![None; self.streams.len()];
        self.streams_changed = false;

        debug!(
            "TS: 打开完成, {} 个流, 起始 {:?} us",
            self.streams.len(),
            self.start_time()
        );
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> SiftResult<Packet> {
        loop {
            if let Some(pkt) = self.packet_queue.pop_front() {
                return Ok(pkt);
            }

            match self.read_ts_packet(io) {
                Ok((pos, pkt)) => self.process_packet(pos, &pkt),
                Err(SiftError::Eof) => {
                    // 文件结束, 输出缓冲区中剩余的 PES
                    self.flush_all_pes();
                    return self.packet_queue.pop_front().ok_or(SiftError::Eof);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> SiftResult<()> {
        if !io.is_seekable() {
            return Err(SiftError::Unsupported("TS: 字节源不支持随机访问".into()));
        }
        let size = io
            .size()
            .ok_or_else(|| SiftError::Unsupported("TS: 未知文件大小, 无法定位".into()))?;
        let ref_index = self
            .reference_stream(stream_index)
            .ok_or(SiftError::StreamNotFound(stream_index.unwrap_or(0)))?;
        let pid = self.streams[ref_index].id as u16;
        let first = self.first_pts.unwrap_or(0);

        if flags.byte {
            let target = (timestamp.max(0) as u64).max(self.data_start).min(size);
            io.seek(SeekFrom::Start(target))?;
            self.sync_to_packet(io)?;
            self.flush();
            return Ok(());
        }

        let target_pts = match stream_index {
            Some(_) => rescale_q(timestamp, self.streams[ref_index].time_base, Rational::MPEG_CLOCK),
            None => rescale_q(timestamp, Rational::MICRO, Rational::MPEG_CLOCK),
        } & wrap_mask(PTS_WRAP_BITS);
        let target_rel = lsb_unwrap(target_pts, first, PTS_WRAP_BITS);

        // 字节偏移上二分查找: lo 处的 PTS 不晚于目标
        let align = TS_PACKET_SIZE as u64;
        let mut lo = self.data_start;
        let mut hi = size;
        while hi - lo > align * 16 {
            let mid = lo + ((hi - lo) / 2) / align * align;
            let probe = self.scan_pes_starts(io, mid, mid + SEEK_PROBE_BYTES, pid, true)?;
            match probe.first() {
                Some(p) if lsb_unwrap(p.pts, first, PTS_WRAP_BITS) <= target_rel => lo = mid,
                _ => hi = mid,
            }
        }

        // 从 lo 向前扩展窗口, 找目标之前最近的关键帧
        let mut chosen: Option<PesStart> = None;
        let mut window_start = lo;
        for _ in 0..32 {
            window_start = window_start
                .saturating_sub(SEEK_PROBE_BYTES)
                .max(self.data_start);
            let starts =
                self.scan_pes_starts(io, window_start, lo + SEEK_PROBE_BYTES, pid, false)?;
            let eligible = |s: &&PesStart| flags.any || s.key;
            let before = starts
                .iter()
                .filter(eligible)
                .filter(|s| lsb_unwrap(s.pts, first, PTS_WRAP_BITS) <= target_rel)
                .last()
                .copied();
            let after = starts
                .iter()
                .filter(eligible)
                .find(|s| lsb_unwrap(s.pts, first, PTS_WRAP_BITS) >= target_rel)
                .copied();
            chosen = if flags.backward { before } else { after.or(before) };
            if chosen.is_some() || window_start == self.data_start {
                break;
            }
        }

        let Some(landing) = chosen else {
            warn!("TS: 定位到 {timestamp} 失败, 没有可用的关键帧");
            return Err(SiftError::InvalidData("TS: 定位失败".into()));
        };

        io.seek(SeekFrom::Start(landing.pos))?;
        self.flush();
        self.cur_dts = vec![None; self.streams.len()];
        self.cur_dts[ref_index] = Some(landing.dts);
        debug!(
            "TS: 定位到偏移 {} (PTS {}, 目标 {})",
            landing.pos, landing.pts, target_pts
        );
        Ok(())
    }

    fn flush(&mut self) {
        self.packet_queue.clear();
        self.psi_sections.clear();
        for buf in self.pes_buffers.values_mut() {
            buf.clear();
        }
    }

    fn start_time(&self) -> Option<i64> {
        self.first_pts
            .map(|pts| rescale_q(pts, Rational::MPEG_CLOCK, Rational::MICRO))
    }

    fn duration(&self) -> Option<i64> {
        self.duration_us
    }

    fn cur_dts(&self, stream_index: usize) -> Option<i64> {
        self.cur_dts.get(stream_index).copied().flatten()
    }

    fn pmt(&self) -> Option<&ProgramMapTable> {
        self.pmt.as_ref()
    }

    fn take_streams_changed(&mut self) -> bool {
        std::mem::take(&mut self.streams_changed)
    }
}

/// MPEG-TS 格式探测
///
/// 连续多个包位置上的同步字节即认为是 TS.
pub fn probe(data: &[u8]) -> bool {
    (0..TS_PACKET_SIZE.min(data.len())).any(|start| {
        let mut count = 0;
        let mut pos = start;
        while pos < data.len() && data[pos] == TS_SYNC_BYTE {
            count += 1;
            pos += TS_PACKET_SIZE;
        }
        // 短数据: 所有包位置上都是同步字节即可
        count >= 3 || (count >= 1 && pos >= data.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    /// 构造一个最小的 TS 包 (188 字节)
    fn build_ts_packet(pid: u16, pusi: bool, payload: &[u8]) -> [u8; TS_PACKET_SIZE] {
        let mut pkt = [0xFFu8; TS_PACKET_SIZE];

        pkt[0] = TS_SYNC_BYTE;
        pkt[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        pkt[2] = pid as u8;
        pkt[3] = 0x10; // AFC=01 (payload only), CC=0

        let copy_len = payload.len().min(TS_PACKET_SIZE - 4);
        pkt[4..4 + copy_len].copy_from_slice(&payload[..copy_len]);

        pkt
    }

    /// 构造带 adaptation field 的 TS 包
    fn build_ts_packet_with_af(
        pid: u16,
        pusi: bool,
        random_access: bool,
        payload: &[u8],
    ) -> [u8; TS_PACKET_SIZE] {
        let mut pkt = [0xFFu8; TS_PACKET_SIZE];

        pkt[0] = TS_SYNC_BYTE;
        pkt[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        pkt[2] = pid as u8;
        pkt[3] = 0x30; // AFC=11 (adaptation + payload), CC=0

        let af_flags = if random_access { 0x40 } else { 0x00 };
        let payload_space = TS_PACKET_SIZE - 4 - 2;
        let copy_len = payload.len().min(payload_space);
        let stuffing = payload_space - copy_len;

        pkt[4] = (1 + stuffing) as u8;
        pkt[5] = af_flags;
        let payload_start = 6 + stuffing;
        pkt[payload_start..payload_start + copy_len].copy_from_slice(&payload[..copy_len]);

        pkt
    }

    /// 构造 PAT
    fn build_pat(pmt_pid: u16) -> [u8; TS_PACKET_SIZE] {
        let mut section = vec![0x00, 0x00, 0xB0, 13, 0x00, 0x01, 0xC1, 0x00, 0x00];
        section.extend_from_slice(&[0x00, 0x01]);
        section.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
        section.push(pmt_pid as u8);
        section.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        build_ts_packet(PID_PAT, true, &section)
    }

    /// 构造 PMT: (stream_type, es_pid, 描述符)
    fn build_pmt(pmt_pid: u16, version: u8, entries: &[(u8, u16, &[u8])]) -> [u8; TS_PACKET_SIZE] {
        let mut body = vec![0x00, 0x01, 0xC1 | (version << 1), 0x00, 0x00];
        let pcr_pid = entries.first().map_or(0x1FFF, |e| e.1);
        body.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
        body.push(pcr_pid as u8);
        body.extend_from_slice(&[0xF0, 0x00]);
        for &(st, pid, desc) in entries {
            body.push(st);
            body.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            body.push(pid as u8);
            body.push(0xF0);
            body.push(desc.len() as u8);
            body.extend_from_slice(desc);
        }
        let section_length = body.len() + 4;
        let mut section = vec![0x00, 0x02, 0xB0 | (section_length >> 8) as u8, section_length as u8];
        section.extend_from_slice(&body);
        section.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        build_ts_packet(pmt_pid, true, &section)
    }

    /// 编码 33-bit 时间戳 (5 bytes), `prefix` 为高 4 位标记
    fn encode_ts(prefix: u8, v: u64) -> [u8; 5] {
        [
            (prefix << 4) | 0x01 | ((((v >> 30) as u8) & 0x07) << 1),
            (v >> 22) as u8,
            0x01 | ((((v >> 15) as u8) & 0x7F) << 1),
            (v >> 7) as u8,
            0x01 | (((v as u8) & 0x7F) << 1),
        ]
    }

    /// 构造 PES 头部
    fn build_pes(stream_id: u8, pts: Option<u64>, dts: Option<u64>, data: &[u8]) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80];
        match (pts, dts) {
            (Some(p), Some(d)) => {
                pes.extend_from_slice(&[0xC0, 10]);
                pes.extend_from_slice(&encode_ts(0x3, p));
                pes.extend_from_slice(&encode_ts(0x1, d));
            }
            (Some(p), None) => {
                pes.extend_from_slice(&[0x80, 5]);
                pes.extend_from_slice(&encode_ts(0x2, p));
            }
            _ => pes.extend_from_slice(&[0x00, 0x00]),
        }
        pes.extend_from_slice(data);
        pes
    }

    const PMT_PID: u16 = 0x100;
    const VIDEO_PID: u16 = 0x101;
    const AUDIO_PID: u16 = 0x102;

    /// 构造视频 + 音频的 TS, 每 `gop` 帧一个关键帧
    fn build_ts(frames: u64, gop: u64) -> Vec<u8> {
        let mut ts = Vec::new();
        ts.extend_from_slice(&build_pat(PMT_PID));
        ts.extend_from_slice(&build_pmt(
            PMT_PID,
            0,
            &[
                (0x02, VIDEO_PID, &[0x52, 0x01, 0x01]),
                (0x81, AUDIO_PID, &[0x0A, 0x04, b'e', b'n', b'g', 0x00]),
            ],
        ));
        for i in 0..frames {
            let pts = 90_000 + i * 3003;
            let pes = build_pes(0xE0, Some(pts), None, &[0x00, 0x00, 0x01, 0x00, i as u8]);
            ts.extend_from_slice(&build_ts_packet_with_af(VIDEO_PID, true, i % gop == 0, &pes));
            let pes = build_pes(0xC0, Some(pts), None, &[0xAA, i as u8]);
            ts.extend_from_slice(&build_ts_packet(AUDIO_PID, true, &pes));
        }
        ts
    }

    fn open(data: Vec<u8>) -> (TsDemuxer, IoContext) {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut demuxer = TsDemuxer::new();
        demuxer.open(&mut io).unwrap();
        (demuxer, io)
    }

    fn read_all(demuxer: &mut TsDemuxer, io: &mut IoContext) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            match demuxer.read_packet(io) {
                Ok(pkt) => packets.push(pkt),
                Err(SiftError::Eof) => break,
                Err(e) => panic!("读取失败: {e}"),
            }
        }
        packets
    }

    #[test]
    fn test_探测_ts_同步字节() {
        assert!(probe(&build_ts(4, 2)));
        assert!(!probe(&[0u8; 600]));
    }

    #[test]
    fn test_解析_pat_pmt_与描述符() {
        let (demuxer, _io) = open(build_ts(4, 2));
        let streams = demuxer.streams();
        assert_eq!(streams.len(), 2);

        assert_eq!(streams[0].media_type, MediaType::Video);
        assert_eq!(streams[0].codec_id, CodecId::Mpeg2Video);
        assert_eq!(streams[0].id, u32::from(VIDEO_PID));
        assert_eq!(streams[0].component_tag, Some(1));
        assert_eq!(streams[0].pts_wrap_bits, 33);

        assert_eq!(streams[1].codec_id, CodecId::Ac3);
        assert_eq!(streams[1].language().as_str(), "eng");
        assert_eq!(streams[1].channels(), 6);

        let pmt = demuxer.pmt().unwrap();
        assert_eq!(pmt.stream_count(), 2);
        assert!(pmt.is_video(0));
    }

    #[test]
    fn test_起始时间与时长() {
        let (demuxer, _io) = open(build_ts(10, 5));
        assert_eq!(demuxer.start_time(), Some(1_000_000));
        assert_eq!(demuxer.streams()[0].start_time, 90_000);
        // 最后一帧 PTS 相对起点 9 * 3003
        assert_eq!(demuxer.duration(), Some(rescale_q(9 * 3003, Rational::MPEG_CLOCK, Rational::MICRO)));
    }

    #[test]
    fn test_读取数据包_位置与关键帧() {
        let (mut demuxer, mut io) = open(build_ts(4, 2));
        let packets = read_all(&mut demuxer, &mut io);
        assert_eq!(packets.len(), 8);

        let video: Vec<&Packet> = packets.iter().filter(|p| p.stream_index == 0).collect();
        assert_eq!(video.len(), 4);
        assert_eq!(video[0].pts, 90_000);
        assert!(video[0].is_keyframe);
        assert!(!video[1].is_keyframe);
        assert!(video[2].is_keyframe);
        // PAT + PMT 之后第一个视频包
        assert_eq!(video[0].pos, (2 * TS_PACKET_SIZE) as i64);
        assert_eq!(video[1].pos, (4 * TS_PACKET_SIZE) as i64);
        assert_eq!(&video[0].data[..], &[0x00, 0x00, 0x01, 0x00, 0]);
        assert_eq!(demuxer.cur_dts(0), Some(90_000 + 3 * 3003));
    }

    #[test]
    fn test_pts_与_dts() {
        let mut ts = Vec::new();
        ts.extend_from_slice(&build_pat(PMT_PID));
        ts.extend_from_slice(&build_pmt(PMT_PID, 0, &[(0x1B, VIDEO_PID, &[])]));
        let pes = build_pes(0xE0, Some(93_003), Some(90_000), &[0x11]);
        ts.extend_from_slice(&build_ts_packet_with_af(VIDEO_PID, true, true, &pes));
        let (mut demuxer, mut io) = open(ts);
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pts, 93_003);
        assert_eq!(pkt.dts, 90_000);
    }

    #[test]
    fn test_pmt_版本变化() {
        let mut ts = build_ts(2, 1);
        ts.extend_from_slice(&build_pmt(
            PMT_PID,
            1,
            &[(0x1B, VIDEO_PID, &[]), (0x03, AUDIO_PID, &[]), (0x06, 0x103, &[0x56, 0x05, b'd', b'e', b'u', 0x10, 0x88])],
        ));
        let (mut demuxer, mut io) = open(ts);
        assert!(!demuxer.take_streams_changed());
        let _ = read_all(&mut demuxer, &mut io);
        assert!(demuxer.take_streams_changed());
        assert!(!demuxer.take_streams_changed());
        let streams = demuxer.streams();
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].codec_id, CodecId::H264);
        assert_eq!(streams[1].codec_id, CodecId::Mp2);
        assert_eq!(streams[2].codec_id, CodecId::DvbTeletext);
        assert_eq!(streams[2].language().as_str(), "deu");
    }

    #[test]
    fn test_按时间戳定位() {
        let (mut demuxer, mut io) = open(build_ts(300, 15));
        // 第 100 帧之前最近的关键帧是第 90 帧
        let target = 90_000 + 100 * 3003;
        demuxer
            .seek(&mut io, Some(0), target, SeekFlags::default())
            .unwrap();
        assert_eq!(demuxer.cur_dts(0), Some(90_000 + 90 * 3003));
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.stream_index, 0);
        assert!(pkt.is_keyframe);
        assert_eq!(pkt.pts, 90_000 + 90 * 3003);
    }

    #[test]
    fn test_越界流索引按参考流定位() {
        let (mut demuxer, mut io) = open(build_ts(300, 15));
        // 流 #9 不存在, 时间戳按视频流的时间基解释
        let target = 90_000 + 100 * 3003;
        demuxer
            .seek(&mut io, Some(9), target, SeekFlags::default())
            .unwrap();
        assert_eq!(demuxer.cur_dts(0), Some(90_000 + 90 * 3003));
    }

    #[test]
    fn test_定位到开头() {
        let (mut demuxer, mut io) = open(build_ts(60, 15));
        demuxer
            .seek(&mut io, None, 1_000_000, SeekFlags::default())
            .unwrap();
        assert_eq!(demuxer.cur_dts(0), Some(90_000));
    }
}
