//! # sift-format
//!
//! Sift 容器格式库: 拉取式字节源、解封装器框架、MPEG-TS 解封装器,
//! 以及 PSI 节目映射表与描述符解码.
//!
//! 播放核心只通过 [`Demuxer`] trait 访问容器, 不关心具体格式.

pub mod demuxer;
pub mod demuxers;
pub mod io;
pub mod psi;
pub mod stream;

// 重导出常用类型
pub use demuxer::{Chapter, Demuxer, SeekFlags};
pub use demuxers::TsDemuxer;
pub use io::{FileBackend, IoBackend, IoContext, MemoryBackend};
pub use psi::ProgramMapTable;
pub use stream::{Disposition, Stream, StreamParams};
