//! H.264/AVC 码流解析器.
//!
//! - NAL 单元分割与类型识别
//! - SPS / PPS 中与画面尺寸、帧率、场编码相关的字段
//! - 可跨数据包续接的 Annex B 增量解析器, 产出帧起始/关键帧事件

pub mod nal;
pub mod parser;
pub mod sps;

pub use nal::{NalUnit, NalUnitType, avcc_length_size, remove_emulation_prevention, split_annex_b};
pub use parser::{AnnexBParser, FieldType, ParserEvent, PictureInfo};
pub use sps::{Pps, Sps, parse_pps, parse_sps};
