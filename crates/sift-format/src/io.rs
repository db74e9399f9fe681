//! I/O 抽象层.
//!
//! 拉取式字节源: 解封装器通过 [`IoContext`] 读取数据, 底层来源
//! (文件、内存、环形缓冲区等) 实现 [`IoBackend`] 即可接入.
//!
//! 后端返回 `WouldBlock` / `Interrupted` 表示暂时无数据,
//! `IoContext` 会把它转换成 `SiftError::TryAgain` 交给上层重试.

use std::io::{self, Read, Seek};

use sift_core::{SiftError, SiftResult};

/// I/O 后端 trait
pub trait IoBackend: Send {
    /// 读取数据到缓冲区
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;

    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;

    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;

    /// 是否支持 seek
    fn is_seekable(&self) -> bool;

    /// 是否为流式来源 (直播等, 只能顺序读取)
    fn is_streamed(&self) -> bool {
        !self.is_seekable()
    }

    /// 建议的读缓冲区大小
    fn best_buffer_size(&self) -> usize {
        DEFAULT_BUFFER_SIZE
    }
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// I/O 上下文
///
/// 为后端加一层读缓冲, 缓冲区大小取后端建议值.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

fn map_read_error(e: io::Error) -> SiftError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => SiftError::TryAgain,
        _ => SiftError::Io(e),
    }
}

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        let size = backend.best_buffer_size().max(512);
        Self {
            inner: backend,
            buffer: vec![0u8; size],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: impl AsRef<std::path::Path>) -> SiftResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    // ========================
    // 读取方法
    // ========================

    /// 读取指定字节数
    ///
    /// 中途遇到 `TryAgain` 时已读取的数据不会丢失, 保留在缓冲区中
    /// 的部分仍可再次读取; 调用方应在重试前回到一致的包边界.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> SiftResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = 0;
                self.buf_len = self.inner.read(&mut self.buffer).map_err(map_read_error)?;
                if self.buf_len == 0 {
                    return Err(SiftError::Eof);
                }
            }
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> SiftResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> SiftResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> SiftResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = self.buf_len;

        if self.inner.is_seekable() {
            self.inner.seek(io::SeekFrom::Current(remaining as i64))?;
        } else {
            let mut left = remaining;
            while left > 0 {
                let to_read = left.min(self.buffer.len());
                self.buf_len = self
                    .inner
                    .read(&mut self.buffer[..to_read])
                    .map_err(map_read_error)?;
                if self.buf_len == 0 {
                    return Err(SiftError::Eof);
                }
                left -= self.buf_len;
            }
            self.buf_pos = 0;
            self.buf_len = 0;
        }
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位 (seek), 会清空读缓冲区
    pub fn seek(&mut self, pos: io::SeekFrom) -> SiftResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前位置 (扣除缓冲区中尚未消耗的数据)
    pub fn position(&mut self) -> SiftResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 丢弃读缓冲区, 使逻辑位置与后端位置一致
    ///
    /// 外部 (如环形缓冲区) 直接移动了后端读指针之后调用.
    pub fn sync_to_backend(&mut self) {
        self.buf_pos = 0;
        self.buf_len = 0;
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 是否为流式来源
    pub fn is_streamed(&self) -> bool {
        self.inner.is_streamed()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件 I/O 后端
pub struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    /// 包装已打开的文件
    pub fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn best_buffer_size(&self) -> usize {
        64 * 1024
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
    /// 模拟流式来源
    streamed: bool,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            streamed: false,
        }
    }

    /// 标记为流式来源 (仍允许 seek, 供直播场景测试)
    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }

    /// 获取数据引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 到负数位置",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn is_streamed(&self) -> bool {
        self.streamed
    }

    fn best_buffer_size(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 第一次读取返回 WouldBlock 的后端
    struct FlakyBackend {
        inner: MemoryBackend,
        blocked_once: bool,
    }

    impl IoBackend for FlakyBackend {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.blocked_once {
                self.blocked_once = true;
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            self.inner.read(buf)
        }

        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }

        fn position(&mut self) -> io::Result<u64> {
            self.inner.position()
        }

        fn size(&self) -> Option<u64> {
            self.inner.size()
        }

        fn is_seekable(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_内存读取与定位() {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data((0u8..=99).collect())));
        assert_eq!(io.read_u8().unwrap(), 0);
        io.skip(9).unwrap();
        assert_eq!(io.position().unwrap(), 10);
        assert_eq!(io.read_bytes(3).unwrap(), vec![10, 11, 12]);
        io.seek(io::SeekFrom::Start(98)).unwrap();
        assert_eq!(io.read_u8().unwrap(), 98);
        assert_eq!(io.read_u8().unwrap(), 99);
        assert!(matches!(io.read_u8(), Err(SiftError::Eof)));
    }

    #[test]
    fn test_暂时无数据_转换为重试() {
        let backend = FlakyBackend {
            inner: MemoryBackend::from_data(vec![7, 8]),
            blocked_once: false,
        };
        let mut io = IoContext::new(Box::new(backend));
        assert!(io.is_streamed());
        assert!(matches!(io.read_u8(), Err(SiftError::TryAgain)));
        assert_eq!(io.read_u8().unwrap(), 7);
    }

    #[test]
    fn test_同步后端位置() {
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(vec![1, 2, 3, 4])));
        io.read_u8().unwrap();
        io.sync_to_backend();
        // 缓冲被丢弃后逻辑位置回到后端读指针
        assert_eq!(io.position().unwrap(), 4);
    }
}
