//! 解码上下文 trait 定义.

use sift_core::SiftResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;

/// 解码上下文
///
/// 播放核心为每个可用的流打开一个上下文, 定位时统一刷新.
/// 打开与关闭须在会话的编解码器锁内进行.
pub trait Decoder: Send {
    /// 获取解码器标识
    fn codec_id(&self) -> CodecId;

    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 使用参数打开解码上下文
    fn open(&mut self, params: &CodecParameters) -> SiftResult<()>;

    /// 是否已打开
    fn is_open(&self) -> bool;

    /// 刷新内部缓冲 (定位后调用)
    fn flush(&mut self);
}
