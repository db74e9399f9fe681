//! 编解码器注册表.
//!
//! 按 CodecId 查找并实例化解码上下文.

use std::collections::HashMap;

use sift_core::{SiftError, SiftResult};

use crate::codec_id::CodecId;
use crate::decoder::Decoder;

/// 解码器工厂函数类型
pub type DecoderFactory = fn(CodecId) -> SiftResult<Box<dyn Decoder>>;

/// 编解码器注册表
pub struct CodecRegistry {
    /// 解码器工厂映射
    decoders: HashMap<CodecId, Vec<DecoderEntry>>,
}

/// 解码器注册条目
struct DecoderEntry {
    /// 解码器名称
    name: String,
    /// 工厂函数
    factory: DecoderFactory,
}

impl CodecRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// 注册一个解码器
    pub fn register_decoder(
        &mut self,
        codec_id: CodecId,
        name: impl Into<String>,
        factory: DecoderFactory,
    ) {
        self.decoders
            .entry(codec_id)
            .or_default()
            .push(DecoderEntry {
                name: name.into(),
                factory,
            });
    }

    /// 是否存在该编解码器的解码器实现
    pub fn has_decoder(&self, codec_id: CodecId) -> bool {
        self.decoders
            .get(&codec_id)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// 创建指定编解码器 ID 的解码器实例 (使用最先注册的实现)
    pub fn create_decoder(&self, codec_id: CodecId) -> SiftResult<Box<dyn Decoder>> {
        let entry = self
            .decoders
            .get(&codec_id)
            .and_then(|entries| entries.first())
            .ok_or_else(|| SiftError::CodecNotFound(format!("未找到 {} 的解码器", codec_id)))?;
        (entry.factory)(codec_id)
    }

    /// 获取所有已注册的解码器名称
    pub fn list_decoders(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.decoders {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result.sort_by_key(|(id, _)| *id);
        result
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
