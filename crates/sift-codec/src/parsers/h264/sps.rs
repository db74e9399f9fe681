//! H.264 SPS / PPS 解析 (仅取格式变化检测需要的字段).

use sift_core::bitreader::BitReader;
use sift_core::{Rational, SiftError, SiftResult};

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    /// profile_idc
    pub profile_idc: u8,
    /// level_idc
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// 图像宽度 (已应用裁剪)
    pub width: u32,
    /// 图像高度 (已应用裁剪)
    pub height: u32,
    /// 是否只有帧编码
    pub frame_mbs_only: bool,
    /// VUI 中的帧率
    pub fps: Option<Rational>,
    /// 像素宽高比
    pub sar: Rational,
    /// log2(max_frame_num)
    pub log2_max_frame_num: u32,
}

impl Sps {
    /// 显示宽高比
    pub fn display_aspect(&self) -> f64 {
        let sar = if self.sar.is_nonzero() {
            self.sar.to_f64()
        } else {
            1.0
        };
        f64::from(self.width) * sar / f64::from(self.height)
    }
}

/// PPS 中切片头解析需要的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 引用的 SPS
    pub sps_id: u32,
}

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1)
const SAR_TABLE: [(i32, i32); 17] = [
    (0, 1),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// 从 RBSP 数据解析 SPS
pub fn parse_sps(rbsp: &[u8]) -> SiftResult<Sps> {
    if rbsp.len() < 3 {
        return Err(SiftError::InvalidData("H.264: SPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(rbsp);
    let profile_idc = br.read_bits(8)? as u8;
    br.skip_bits(8)?; // constraint_set 标志
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = br.read_ue()?;
    if sps_id > 31 {
        return Err(SiftError::InvalidData(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    if is_high_profile(profile_idc) {
        chroma_format_idc = br.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(SiftError::InvalidData(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_flag()?;
        }
        br.read_ue()?; // bit_depth_luma_minus8
        br.read_ue()?; // bit_depth_chroma_minus8
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if br.read_flag()? {
            let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..list_count {
                if br.read_flag()? {
                    skip_scaling_list(&mut br, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num = br.read_ue()? + 4;
    if log2_max_frame_num > 16 {
        return Err(SiftError::InvalidData(format!(
            "H.264: log2_max_frame_num 超出范围, value={}",
            log2_max_frame_num
        )));
    }

    match br.read_ue()? {
        0 => {
            br.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            br.skip_bits(1)?; // delta_pic_order_always_zero_flag
            br.read_se()?; // offset_for_non_ref_pic
            br.read_se()?; // offset_for_top_to_bottom_field
            let cycle = br.read_ue()?;
            if cycle > 255 {
                return Err(SiftError::InvalidData(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    cycle
                )));
            }
            for _ in 0..cycle {
                br.read_se()?;
            }
        }
        2 => {}
        other => {
            return Err(SiftError::InvalidData(format!(
                "H.264: pic_order_cnt_type 非法, value={}",
                other
            )));
        }
    }

    br.read_ue()?; // max_num_ref_frames
    br.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs = br.read_ue()? + 1;
    let pic_height_in_map_units = br.read_ue()? + 1;
    let frame_mbs_only = br.read_flag()?;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip_bits(1)?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if br.read_flag()? {
        crop_left = br.read_ue()?;
        crop_right = br.read_ue()?;
        crop_top = br.read_ue()?;
        crop_bottom = br.read_ue()?;
    }

    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = pic_width_in_mbs.saturating_mul(16);
    let raw_height = pic_height_in_map_units
        .saturating_mul(if frame_mbs_only { 1 } else { 2 })
        .saturating_mul(16);
    let crop_x = crop_left.saturating_add(crop_right).saturating_mul(crop_unit_x);
    let crop_y = crop_top.saturating_add(crop_bottom).saturating_mul(crop_unit_y);
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(SiftError::InvalidData(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }

    let mut fps = None;
    let mut sar = Rational::new(1, 1);
    if br.read_flag()? {
        let (parsed_sar, parsed_fps) = parse_vui(&mut br)?;
        sar = parsed_sar;
        fps = parsed_fps;
    }

    Ok(Sps {
        profile_idc,
        level_idc,
        sps_id,
        chroma_format_idc,
        width: raw_width - crop_x,
        height: raw_height - crop_y,
        frame_mbs_only,
        fps,
        sar,
        log2_max_frame_num,
    })
}

/// 从 RBSP 数据解析 PPS 的 ID 字段
pub fn parse_pps(rbsp: &[u8]) -> SiftResult<Pps> {
    let mut br = BitReader::new(rbsp);
    let pps_id = br.read_ue()?;
    let sps_id = br.read_ue()?;
    if pps_id > 255 || sps_id > 31 {
        return Err(SiftError::InvalidData(format!(
            "H.264: PPS ID 超出范围, pps_id={}, sps_id={}",
            pps_id, sps_id
        )));
    }
    Ok(Pps { pps_id, sps_id })
}

fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        0 | 3 => 1,
        _ => 2,
    };
    let sub_height = match chroma_array_type {
        0 | 2 | 3 => 1,
        _ => 2,
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };
    (sub_width, sub_height * height_mult)
}

fn skip_scaling_list(br: &mut BitReader, size: usize) -> SiftResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = br.read_se()?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// 解析 VUI 中的 SAR 与帧率
fn parse_vui(br: &mut BitReader) -> SiftResult<(Rational, Option<Rational>)> {
    let mut sar = Rational::new(1, 1);

    if br.read_flag()? {
        let ar_idc = br.read_bits(8)? as usize;
        if ar_idc == 255 {
            let sar_w = br.read_bits(16)? as i32;
            let sar_h = br.read_bits(16)? as i32;
            if sar_w > 0 && sar_h > 0 {
                sar = Rational::new(sar_w, sar_h);
            }
        } else if let Some(&(w, h)) = SAR_TABLE.get(ar_idc) {
            if w > 0 {
                sar = Rational::new(w, h);
            }
        }
    }

    // overscan_info_present_flag
    if br.read_flag()? {
        br.skip_bits(1)?;
    }

    // video_signal_type_present_flag
    if br.read_flag()? {
        br.skip_bits(4)?;
        if br.read_flag()? {
            br.skip_bits(24)?;
        }
    }

    // chroma_loc_info_present_flag
    if br.read_flag()? {
        br.read_ue()?;
        br.read_ue()?;
    }

    let mut fps = None;
    if br.read_flag()? {
        let num_units = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        br.skip_bits(1)?; // fixed_frame_rate_flag
        // fps = time_scale / (2 * num_units_in_tick)
        let den = u64::from(num_units) * 2;
        if num_units > 0 && time_scale > 0 && den <= i32::MAX as u64 && time_scale <= i32::MAX as u32
        {
            fps = Some(Rational::new(time_scale as i32, den as i32));
        }
    }

    Ok((sar, fps))
}
