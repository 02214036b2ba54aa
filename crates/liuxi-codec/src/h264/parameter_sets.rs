//! H.264 SPS/PPS 解析.
//!
//! 只提取预解析阶段需要的字段: 分辨率、帧率、位深、profile/level
//! 以及切片头解析所依赖的少量语法元素. 其余语法按位跳过.

use std::io::Read;

use liuxi_core::{
    BitCursor, LiuxiError, LiuxiResult, Rational,
    expgolomb::{read_se, read_ue},
};

use crate::parse_data::{FrameParseData, H264PicParamSet, H264SeqParamSet};
use crate::scanner::{StreamScanner, to_rbsp};

/// 跳过一个 scaling list, 不保留系数
fn skip_scaling_list(bc: &mut BitCursor, size_of_list: u32) {
    let mut last_scale: i64 = 8;
    let mut next_scale: i64 = 8;
    for _ in 0..size_of_list {
        if next_scale != 0 {
            let delta_scale = read_se(bc);
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
}

/// 定位当前 NAL 的结束偏移: 下一个起始码或缓冲区末尾
fn nal_end_offset<R: Read>(
    scanner: &mut StreamScanner<R>,
    start_offset: usize,
) -> LiuxiResult<usize> {
    match scanner.find_start_code(start_offset + 1) {
        Ok(end) => Ok(end),
        Err(LiuxiError::Eof) => Ok(scanner.buffer.len()),
        Err(e) => Err(e),
    }
}

/// 解析 SPS NAL, 成功后存入参数集表并更新分辨率/帧率/位深
///
/// `start_offset` 指向该 NAL 起始码的首字节.
pub(crate) fn parse_sps<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
    start_offset: usize,
) -> LiuxiResult<()> {
    let end_offset = nal_end_offset(scanner, start_offset)?;
    let rbsp = to_rbsp(&scanner.buffer[start_offset..end_offset])?;
    if rbsp.len() <= 4 {
        return Err(LiuxiError::InvalidData("SPS NAL 过短".to_string()));
    }
    // 跳过起始码与 NAL 头
    let mut bc = BitCursor::new(&rbsp[4..]);
    let mut sps = H264SeqParamSet::default();

    sps.profile_idc = bc.read_bits(8) as u8;
    // constraint_set flags + reserved
    bc.read_bits(8);
    sps.level_idc = bc.read_bits(8) as u8;
    let seq_parameter_set_id = read_ue(&mut bc);
    if seq_parameter_set_id > 31 {
        return Err(LiuxiError::InvalidData(format!(
            "SPS id 越界: {seq_parameter_set_id}"
        )));
    }

    let mut bit_depth_luma = 8u32;
    if matches!(sps.profile_idc, 100 | 110 | 122 | 144) {
        sps.chroma_format_idc = read_ue(&mut bc) as u8;
        if sps.chroma_format_idc == 3 {
            // separate_colour_plane_flag
            bc.read_bit();
        }
        bit_depth_luma = 8 + read_ue(&mut bc);
        // bit_depth_chroma_minus8
        read_ue(&mut bc);
        // qpprime_y_zero_transform_bypass_flag
        bc.read_bit();
        let seq_scaling_matrix_present_flag = bc.read_bit() == 1;
        if seq_scaling_matrix_present_flag {
            for i in 0..8 {
                if bc.read_bit() == 1 {
                    skip_scaling_list(&mut bc, if i < 6 { 16 } else { 64 });
                }
            }
        }
    } else {
        sps.chroma_format_idc = 1;
    }

    let log2_max_frame_num_minus4 = read_ue(&mut bc);
    if log2_max_frame_num_minus4 > 12 {
        return Err(LiuxiError::InvalidData(format!(
            "log2_max_frame_num_minus4 越界: {log2_max_frame_num_minus4}"
        )));
    }
    sps.log2_max_frame_num_minus4 = log2_max_frame_num_minus4 as u8;
    sps.pic_order_cnt_type = read_ue(&mut bc) as u8;
    if sps.pic_order_cnt_type == 0 {
        let log2_max_pic_order_cnt_lsb_minus4 = read_ue(&mut bc);
        if log2_max_pic_order_cnt_lsb_minus4 > 12 {
            return Err(LiuxiError::InvalidData(format!(
                "log2_max_pic_order_cnt_lsb_minus4 越界: {log2_max_pic_order_cnt_lsb_minus4}"
            )));
        }
        sps.log2_max_pic_order_cnt_lsb_minus4 = log2_max_pic_order_cnt_lsb_minus4 as u8;
    } else if sps.pic_order_cnt_type == 1 {
        sps.delta_pic_order_always_zero_flag = bc.read_bit() == 1;
        // offset_for_non_ref_pic
        read_se(&mut bc);
        // offset_for_top_to_bottom_field
        read_se(&mut bc);
        let num_ref_frames_in_pic_order_cnt_cycle = read_ue(&mut bc);
        for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
            read_se(&mut bc);
        }
    }

    // num_ref_frames
    read_ue(&mut bc);
    // gaps_in_frame_num_value_allowed_flag
    bc.read_bit();
    sps.pic_width_in_mbs_minus1 = read_ue(&mut bc);
    sps.pic_height_in_map_units_minus1 = read_ue(&mut bc);
    sps.frame_mbs_only_flag = bc.read_bit() == 1;
    if !sps.frame_mbs_only_flag {
        // mb_adaptive_frame_field_flag
        bc.read_bit();
    }

    // direct_8x8_inference_flag
    bc.read_bit();
    sps.frame_cropping_flag = bc.read_bit() == 1;
    if sps.frame_cropping_flag {
        sps.frame_crop_left_offset = read_ue(&mut bc);
        sps.frame_crop_right_offset = read_ue(&mut bc);
        sps.frame_crop_top_offset = read_ue(&mut bc);
        sps.frame_crop_bottom_offset = read_ue(&mut bc);
    }

    let mut timing_info_present = false;
    let mut num_units_in_tick = 0u32;
    let mut time_scale = 0u32;

    let vui_parameters_present_flag = bc.read_bit() == 1;
    if vui_parameters_present_flag {
        if bc.read_bit() == 1 {
            let aspect_ratio_idc = bc.read_bits(8);
            if aspect_ratio_idc == 255 {
                // sar_width, sar_height
                bc.read_bits(16);
                bc.read_bits(16);
            }
        }
        if bc.read_bit() == 1 {
            // overscan_appropriate_flag
            bc.read_bit();
        }
        if bc.read_bit() == 1 {
            // video_format, video_full_range_flag
            bc.read_bits(3);
            bc.read_bit();
            if bc.read_bit() == 1 {
                // colour_primaries, transfer_characteristics, matrix_coefficients
                bc.read_bits(24);
            }
        }
        if bc.read_bit() == 1 {
            // chroma_sample_loc_type_{top,bottom}_field
            read_ue(&mut bc);
            read_ue(&mut bc);
        }
        timing_info_present = bc.read_bit() == 1;
        if timing_info_present {
            num_units_in_tick = bc.read_bits(32);
            time_scale = bc.read_bits(32);
            // fixed_frame_rate_flag
            bc.read_bit();
        }
    }

    if bc.at_eof() {
        return Err(LiuxiError::InvalidData("SPS 数据不完整".to_string()));
    }

    // 宽高: 宏块网格尺寸减去裁剪窗口, 裁剪单位取决于色度格式与场编码
    let mut height =
        (2 - u32::from(sps.frame_mbs_only_flag)) * (sps.pic_height_in_map_units_minus1 + 1) * 16;
    let mut width = (sps.pic_width_in_mbs_minus1 + 1) * 16;
    if sps.frame_cropping_flag {
        let (crop_unit_x, crop_unit_y) = match sps.chroma_format_idc {
            // 单色
            0 => (1, 2 - u32::from(sps.frame_mbs_only_flag)),
            // 4:2:0
            1 => (2, 2 * (2 - u32::from(sps.frame_mbs_only_flag))),
            // 4:2:2
            2 => (2, 2 - u32::from(sps.frame_mbs_only_flag)),
            // 4:4:4 及其他
            _ => (1, 2 - u32::from(sps.frame_mbs_only_flag)),
        };
        width = width
            .wrapping_sub(crop_unit_x * (sps.frame_crop_left_offset + sps.frame_crop_right_offset));
        height = height
            .wrapping_sub(crop_unit_y * (sps.frame_crop_top_offset + sps.frame_crop_bottom_offset));
    }
    parse_data.width = width;
    parse_data.height = height;

    if timing_info_present {
        // 帧率 = time_scale / (2 * num_units_in_tick), 约分后保存
        let fps = Rational::new(time_scale as i32, num_units_in_tick.wrapping_mul(2) as i32);
        if fps.is_valid() {
            parse_data.fps = Some(fps.reduce());
        }
    }
    parse_data.luma_depth = bit_depth_luma;

    log::debug!(
        "H.264 SPS id={seq_parameter_set_id}: {}x{} profile={} level={}",
        parse_data.width,
        parse_data.height,
        sps.profile_idc,
        sps.level_idc
    );
    parse_data.h264_sps[seq_parameter_set_id as usize] = Some(sps);
    Ok(())
}

/// 解析 PPS NAL, 成功后存入参数集表
pub(crate) fn parse_pps<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
    start_offset: usize,
) -> LiuxiResult<()> {
    let end_offset = nal_end_offset(scanner, start_offset)?;
    let rbsp = to_rbsp(&scanner.buffer[start_offset..end_offset])?;
    if rbsp.len() <= 4 {
        return Err(LiuxiError::InvalidData("PPS NAL 过短".to_string()));
    }
    let mut bc = BitCursor::new(&rbsp[4..]);

    let pic_parameter_set_id = read_ue(&mut bc);
    if pic_parameter_set_id > 255 {
        return Err(LiuxiError::InvalidData(format!(
            "PPS id 越界: {pic_parameter_set_id}"
        )));
    }
    let seq_parameter_set_id = read_ue(&mut bc);
    if seq_parameter_set_id > 31 {
        return Err(LiuxiError::InvalidData(format!(
            "PPS 引用的 SPS id 越界: {seq_parameter_set_id}"
        )));
    }
    // entropy_coding_mode_flag
    bc.read_bit();
    let pic_order_present_flag = bc.read_bit() == 1;

    if bc.at_eof() {
        return Err(LiuxiError::InvalidData("PPS 数据不完整".to_string()));
    }

    log::debug!("H.264 PPS id={pic_parameter_set_id} → SPS id={seq_parameter_set_id}");
    parse_data.h264_pps[pic_parameter_set_id as usize] = Some(H264PicParamSet {
        seq_parameter_set_id: seq_parameter_set_id as u8,
        pic_order_present_flag,
    });
    Ok(())
}
