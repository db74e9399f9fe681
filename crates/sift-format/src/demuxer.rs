//! 解封装器 (Demuxer) trait 定义.
//!
//! 从容器格式中读取压缩数据包, 并向播放核心报告流集合、
//! 起始时间、当前解码时间戳与节目映射表快照.

use sift_codec::Packet;
use sift_core::SiftResult;

use crate::io::IoContext;
use crate::psi::ProgramMapTable;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 打开容器并解析头部
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包
/// 4. 可选: 调用 `seek()` 进行定位, 之后用 `cur_dts()` 读取落点
pub trait Demuxer: Send {
    /// 格式名称
    fn format_name(&self) -> &str;

    /// 打开容器并解析头部信息
    fn open(&mut self, io: &mut IoContext) -> SiftResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(SiftError::Eof)`: 已到达文件末尾
    /// - `Err(SiftError::TryAgain)`: 字节源暂时无数据
    fn read_packet(&mut self, io: &mut IoContext) -> SiftResult<Packet>;

    /// 定位到指定时间点
    ///
    /// - `stream_index`: 目标流; `None` 时 `timestamp` 以微秒为单位
    /// - `timestamp`: 目标时间戳 (以目标流的 time_base 为单位)
    fn seek(
        &mut self,
        io: &mut IoContext,
        stream_index: Option<usize>,
        timestamp: i64,
        flags: SeekFlags,
    ) -> SiftResult<()>;

    /// 丢弃内部的读缓冲与半成品数据包
    fn flush(&mut self);

    /// 容器起始时间 (微秒), None 表示未知
    fn start_time(&self) -> Option<i64> {
        None
    }

    /// 容器时长 (微秒), None 表示未知
    fn duration(&self) -> Option<i64> {
        None
    }

    /// 指定流的当前解码时间戳 (以流的 time_base 为单位)
    fn cur_dts(&self, _stream_index: usize) -> Option<i64> {
        None
    }

    /// 当前节目映射表快照 (仅广播类容器)
    fn pmt(&self) -> Option<&ProgramMapTable> {
        None
    }

    /// 章节列表
    fn chapters(&self) -> &[Chapter] {
        &[]
    }

    /// 流集合自上次查询以来是否发生变化 (查询后清除标志)
    fn take_streams_changed(&mut self) -> bool {
        false
    }
}

/// 章节
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// 起始时间 (微秒)
    pub start_us: i64,
    /// 标题
    pub title: Option<String>,
}

/// Seek 标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekFlags {
    /// 向后 seek (寻找目标之前最近的关键帧)
    pub backward: bool,
    /// 基于字节位置 seek (而非时间戳)
    pub byte: bool,
    /// 寻找任意帧 (不仅是关键帧)
    pub any: bool,
}

impl Default for SeekFlags {
    fn default() -> Self {
        Self {
            backward: true,
            byte: false,
            any: false,
        }
    }
}
