//! 内置解码上下文.
//!
//! 真正的样本解码在下游解码器完成; 这里的上下文记录打开参数与刷新次数,
//! 使播放核心能够以统一方式管理各个流的上下文生命周期.

use log::debug;
use sift_core::{SiftError, SiftResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::registry::CodecRegistry;

/// 有内置上下文的编解码器
const SUPPORTED: &[CodecId] = &[
    CodecId::Mpeg1Video,
    CodecId::Mpeg2Video,
    CodecId::H263,
    CodecId::Mpeg4,
    CodecId::H264,
    CodecId::H265,
    CodecId::Vc1,
    CodecId::Wmv3,
    CodecId::Mjpeg,
    CodecId::Mp2,
    CodecId::Mp3,
    CodecId::Aac,
    CodecId::AacLatm,
    CodecId::Ac3,
    CodecId::Eac3,
    CodecId::Dts,
    CodecId::TrueHd,
    CodecId::Flac,
    CodecId::Vorbis,
    CodecId::Opus,
    CodecId::PcmS16be,
    CodecId::PcmS16le,
    CodecId::DvbSubtitle,
    CodecId::DvdSubtitle,
    CodecId::HdmvPgsSubtitle,
    CodecId::Srt,
    CodecId::Ass,
];

/// 注册所有内置解码上下文
pub fn register_all_decoders(registry: &mut CodecRegistry) {
    for &id in SUPPORTED {
        registry.register_decoder(id, id.name(), StreamContext::create);
    }
}

/// 流解码上下文
pub struct StreamContext {
    codec_id: CodecId,
    params: Option<CodecParameters>,
    flush_count: u64,
}

impl StreamContext {
    /// 工厂函数
    pub fn create(codec_id: CodecId) -> SiftResult<Box<dyn Decoder>> {
        Ok(Box::new(Self {
            codec_id,
            params: None,
            flush_count: 0,
        }))
    }

    /// 打开时使用的参数
    pub fn params(&self) -> Option<&CodecParameters> {
        self.params.as_ref()
    }

    /// 累计刷新次数
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }
}

impl Decoder for StreamContext {
    fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    fn name(&self) -> &str {
        self.codec_id.name()
    }

    fn open(&mut self, params: &CodecParameters) -> SiftResult<()> {
        if params.codec_id != self.codec_id {
            return Err(SiftError::InvalidArgument(format!(
                "参数编解码器 {} 与上下文 {} 不一致",
                params.codec_id, self.codec_id
            )));
        }
        debug!(
            "打开解码上下文: {}, 线程数 {}, lowres {}",
            self.codec_id, params.thread_count, params.lowres
        );
        self.params = Some(params.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.params.is_some()
    }

    fn flush(&mut self) {
        self.flush_count += 1;
    }
}
