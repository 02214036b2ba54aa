//! HEVC SPS 解析.
//!
//! 提取 profile/level、分辨率 (含一致性窗口与默认显示窗口裁剪)、
//! 位深、帧率以及短期参考图像集 (short-term RPS). 其余语法按位跳过.

use std::io::Read;

use liuxi_core::{
    BitCursor, LiuxiError, LiuxiResult, Rational,
    expgolomb::{read_se, read_ue},
};

use crate::parse_data::{FrameParseData, HevcSeqParamSet, ShortTermRps};
use crate::scanner::{StreamScanner, to_rbsp};

/// SPS 中 RPS 数量上限 (sps_num_short_term_ref_pic_sets ≤ 64)
const MAX_SHORT_TERM_RPS: u32 = 64;
/// 单个 RPS 的 POC 增量上限
const MAX_DELTA_POCS: usize = 32;

/// 解析 profile_tier_level 的 general 段, 返回 general_profile_idc
///
/// 层级 (level) 字段紧随其后, 由调用方读取.
fn decode_profile_tier_level(bc: &mut BitCursor) -> u8 {
    // profile_space + tier_flag
    bc.read_bits(3);
    let profile_idc = bc.read_bits(5) as u8;
    // profile_compatibility_flags
    bc.read_bits(32);
    // progressive/interlaced/non_packed/frame_only constraint flags
    bc.read_bits(4);
    // reserved_zero_44bits
    bc.read_bits(32);
    bc.read_bits(12);
    profile_idc
}

/// 跳过 scaling_list_data, 不保留系数
fn skip_scaling_list_data(bc: &mut BitCursor) {
    for size_id in 0..4u32 {
        let step = if size_id == 3 { 3 } else { 1 };
        let mut matrix_id = 0;
        while matrix_id < 6 {
            let scaling_list_pred_mode_flag = bc.read_bit() == 1;
            if !scaling_list_pred_mode_flag {
                // scaling_list_pred_matrix_id_delta
                read_ue(bc);
            } else {
                let coef_num = 64.min(1u32 << (4 + (size_id << 1)));
                if size_id > 1 {
                    // scaling_list_dc_coef
                    read_ue(bc);
                }
                for _ in 0..coef_num {
                    // scaling_list_delta_coef
                    read_ue(bc);
                }
            }
            matrix_id += step;
        }
    }
}

/// 解析一个短期参考图像集
///
/// 预测模式 (inter RPS) 以 `sps.st_rps` 中最后一个 RPS 为参照,
/// 推导后按 POC 增量排序并把负增量置于前半段.
fn decode_short_term_rps(bc: &mut BitCursor, sps: &HevcSeqParamSet) -> LiuxiResult<ShortTermRps> {
    let mut rps = ShortTermRps::default();

    let rps_predict = if sps.st_rps.is_empty() {
        false
    } else {
        bc.read_bit() == 1
    };

    if rps_predict {
        // 上一个 RPS 作为参照
        let rps_ridx = &sps.st_rps[sps.st_rps.len() - 1];
        let delta_rps_sign = bc.read_bit();
        let abs_delta_rps = read_ue(bc) as i64;
        let delta_rps = (1 - 2 * i64::from(delta_rps_sign)) * abs_delta_rps;

        let mut k = 0usize;
        let mut k0 = 0u32;
        let mut use_delta_flag = false;
        for i in 0..=rps_ridx.num_delta_pocs as usize {
            let used = bc.read_bit() == 1;
            if !used {
                use_delta_flag = bc.read_bit() == 1;
            }
            if used || use_delta_flag {
                if k >= MAX_DELTA_POCS {
                    return Err(LiuxiError::InvalidData(
                        "RPS POC 增量数量越界".to_string(),
                    ));
                }
                let delta_poc = if i < rps_ridx.num_delta_pocs as usize {
                    delta_rps.wrapping_add(i64::from(rps_ridx.delta_poc[i]))
                } else {
                    delta_rps
                };
                rps.delta_poc[k] = delta_poc as i32;
                rps.used[k] = used;
                if delta_poc < 0 {
                    k0 += 1;
                }
                k += 1;
            }
        }
        rps.num_delta_pocs = k as u32;
        rps.num_negative_pics = k0;

        // 按 POC 增量升序插入排序
        for i in 1..k {
            let delta_poc = rps.delta_poc[i];
            let used = rps.used[i];
            let mut j = i as i32 - 1;
            while j >= 0 {
                let tmp = rps.delta_poc[j as usize];
                if delta_poc < tmp {
                    rps.delta_poc[j as usize + 1] = tmp;
                    rps.used[j as usize + 1] = rps.used[j as usize];
                    rps.delta_poc[j as usize] = delta_poc;
                    rps.used[j as usize] = used;
                }
                j -= 1;
            }
        }

        // 负增量段倒序, 使其按绝对值递增排列
        let neg = rps.num_negative_pics as usize;
        if neg >> 1 != 0 {
            let mut k = neg - 1;
            for i in 0..neg >> 1 {
                rps.delta_poc.swap(i, k);
                rps.used.swap(i, k);
                k -= 1;
            }
        }
    } else {
        rps.num_negative_pics = read_ue(bc);
        let nb_positive_pics = read_ue(bc);
        let total = rps.num_negative_pics as u64 + u64::from(nb_positive_pics);
        if total > MAX_DELTA_POCS as u64 {
            return Err(LiuxiError::InvalidData(format!(
                "RPS POC 增量数量越界: {total}"
            )));
        }
        rps.num_delta_pocs = total as u32;
        if rps.num_delta_pocs > 0 {
            let mut prev: i32 = 0;
            for i in 0..rps.num_negative_pics as usize {
                let delta_poc = read_ue(bc).wrapping_add(1) as i32;
                prev = prev.wrapping_sub(delta_poc);
                rps.delta_poc[i] = prev;
                rps.used[i] = bc.read_bit() == 1;
            }
            prev = 0;
            for i in 0..nb_positive_pics as usize {
                let delta_poc = read_ue(bc).wrapping_add(1) as i32;
                prev = prev.wrapping_add(delta_poc);
                let idx = rps.num_negative_pics as usize + i;
                rps.delta_poc[idx] = prev;
                rps.used[idx] = bc.read_bit() == 1;
            }
        }
    }

    Ok(rps)
}

/// 解析 SPS NAL, 成功后存入参数集表并更新分辨率/帧率/位深
///
/// `start_offset` 指向该 NAL 起始码的首字节.
pub(crate) fn parse_sps<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
    start_offset: usize,
) -> LiuxiResult<()> {
    let end_offset = match scanner.find_start_code(start_offset + 1) {
        Ok(end) => end,
        Err(LiuxiError::Eof) => scanner.buffer.len(),
        Err(e) => return Err(e),
    };
    let rbsp = to_rbsp(&scanner.buffer[start_offset..end_offset])?;
    if rbsp.len() <= 5 {
        return Err(LiuxiError::InvalidData("SPS NAL 过短".to_string()));
    }
    // 跳过起始码与 2 字节 NAL 头
    let mut bc = BitCursor::new(&rbsp[5..]);
    let mut sps = HevcSeqParamSet::default();

    // sps_video_parameter_set_id
    bc.read_bits(4);
    let max_sub_layers = bc.read_bits(3) + 1;
    // sps_temporal_id_nesting_flag
    bc.read_bit();

    sps.profile_idc = decode_profile_tier_level(&mut bc);
    sps.level_idc = bc.read_bits(8) as u8;

    let mut sub_layer_profile_present = [false; 8];
    let mut sub_layer_level_present = [false; 8];
    for i in 0..max_sub_layers as usize - 1 {
        sub_layer_profile_present[i] = bc.read_bit() == 1;
        sub_layer_level_present[i] = bc.read_bit() == 1;
    }
    if max_sub_layers > 1 {
        for _ in max_sub_layers - 1..8 {
            // reserved_zero_2bits
            bc.read_bits(2);
        }
    }
    for i in 0..max_sub_layers as usize - 1 {
        if sub_layer_profile_present[i] {
            decode_profile_tier_level(&mut bc);
        }
        if sub_layer_level_present[i] {
            // sub_layer_level_idc
            bc.read_bits(8);
        }
    }

    let sps_id = read_ue(&mut bc);
    if sps_id > 31 {
        return Err(LiuxiError::InvalidData(format!("SPS id 越界: {sps_id}")));
    }
    parse_data.latest_hevc_sps = sps_id as u8;

    let mut chroma_format_idc = read_ue(&mut bc);
    if chroma_format_idc == 3 {
        let separate_colour_plane_flag = bc.read_bit() == 1;
        // 各色度平面独立编码时按单色处理
        if separate_colour_plane_flag {
            chroma_format_idc = 0;
        }
    }

    let coded_width = read_ue(&mut bc);
    let coded_height = read_ue(&mut bc);
    let mut width = coded_width;
    let mut height = coded_height;

    // 裁剪偏移以色度采样为单位, 换算到亮度像素
    let vert_mult = 1 + u32::from(chroma_format_idc < 2);
    let horiz_mult = 1 + u32::from(chroma_format_idc < 3);

    let conformance_window_flag = bc.read_bit() == 1;
    if conformance_window_flag {
        let left = read_ue(&mut bc).wrapping_mul(horiz_mult);
        let right = read_ue(&mut bc).wrapping_mul(horiz_mult);
        let top = read_ue(&mut bc).wrapping_mul(vert_mult);
        let bottom = read_ue(&mut bc).wrapping_mul(vert_mult);
        width = coded_width.wrapping_sub(left + right);
        height = coded_height.wrapping_sub(top + bottom);
    }

    let bit_depth_luma = 8 + read_ue(&mut bc);
    // bit_depth_chroma_minus8
    read_ue(&mut bc);
    let log2_max_poc_lsb = read_ue(&mut bc) + 4;

    let sublayer_ordering_info = bc.read_bit() == 1;
    let start = if sublayer_ordering_info {
        0
    } else {
        max_sub_layers - 1
    };
    for _ in start..max_sub_layers {
        // sps_max_dec_pic_buffering_minus1
        read_ue(&mut bc);
        // sps_max_num_reorder_pics
        read_ue(&mut bc);
        // sps_max_latency_increase_plus1
        read_ue(&mut bc);
    }

    // log2_min_luma_coding_block_size_minus3
    read_ue(&mut bc);
    // log2_diff_max_min_luma_coding_block_size
    read_ue(&mut bc);
    // log2_min_luma_transform_block_size_minus2
    read_ue(&mut bc);
    // log2_diff_max_min_luma_transform_block_size
    read_ue(&mut bc);
    // max_transform_hierarchy_depth_inter
    read_ue(&mut bc);
    // max_transform_hierarchy_depth_intra
    read_ue(&mut bc);

    let scaling_list_enabled_flag = bc.read_bit() == 1;
    if scaling_list_enabled_flag && bc.read_bit() == 1 {
        skip_scaling_list_data(&mut bc);
    }

    // amp_enabled_flag + sample_adaptive_offset_enabled_flag
    bc.read_bits(2);
    let pcm_enabled_flag = bc.read_bit() == 1;
    if pcm_enabled_flag {
        // pcm_sample_bit_depth_{luma,chroma}_minus1
        bc.read_bits(8);
        // log2_min_pcm_luma_coding_block_size_minus3
        read_ue(&mut bc);
        // log2_diff_max_min_pcm_luma_coding_block_size
        read_ue(&mut bc);
        // pcm_loop_filter_disabled_flag
        bc.read_bit();
    }

    let num_short_term_rps = read_ue(&mut bc);
    if num_short_term_rps > MAX_SHORT_TERM_RPS {
        return Err(LiuxiError::InvalidData(format!(
            "短期 RPS 数量越界: {num_short_term_rps}"
        )));
    }
    for _ in 0..num_short_term_rps {
        let rps = decode_short_term_rps(&mut bc, &sps)?;
        sps.st_rps.push(rps);
    }

    let long_term_ref_pics_present_flag = bc.read_bit() == 1;
    if long_term_ref_pics_present_flag {
        let num_long_term_ref_pics_sps = read_ue(&mut bc);
        for _ in 0..num_long_term_ref_pics_sps {
            // lt_ref_pic_poc_lsb_sps
            bc.read_bits(log2_max_poc_lsb.min(32));
            // used_by_curr_pic_lt_sps_flag
            bc.read_bit();
        }
    }

    // sps_temporal_mvp_enabled_flag + strong_intra_smoothing_enabled_flag
    bc.read_bits(2);

    let mut vui_num_units_in_tick = 0u32;
    let mut vui_time_scale = 0u32;

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
                // colour_primaries, transfer_characteristics, matrix_coeffs
                bc.read_bits(24);
            }
        }
        if bc.read_bit() == 1 {
            // chroma_sample_loc_type_{top,bottom}_field
            read_ue(&mut bc);
            read_ue(&mut bc);
        }
        // neutral_chroma_indication_flag, field_seq_flag,
        // frame_field_info_present_flag
        bc.read_bits(3);

        let default_display_window_flag = bc.read_bit() == 1;
        if default_display_window_flag {
            let left = read_ue(&mut bc).wrapping_mul(horiz_mult);
            let right = read_ue(&mut bc).wrapping_mul(horiz_mult);
            let top = read_ue(&mut bc).wrapping_mul(vert_mult);
            let bottom = read_ue(&mut bc).wrapping_mul(vert_mult);
            // 默认显示窗口覆盖一致性窗口的裁剪结果
            width = coded_width.wrapping_sub(left + right);
            height = coded_height.wrapping_sub(top + bottom);
        }

        let vui_timing_info_present_flag = bc.read_bit() == 1;
        if vui_timing_info_present_flag {
            vui_num_units_in_tick = bc.read_bits(32);
            vui_time_scale = bc.read_bits(32);
        }
    }

    if bc.at_eof() {
        return Err(LiuxiError::InvalidData("SPS 数据不完整".to_string()));
    }

    parse_data.width = width;
    parse_data.height = height;
    parse_data.luma_depth = bit_depth_luma;
    // 帧率 = time_scale / num_units_in_tick, 约分后保存
    let fps = Rational::new(vui_time_scale as i32, vui_num_units_in_tick as i32);
    if fps.is_valid() {
        parse_data.fps = Some(fps.reduce());
    }

    log::debug!(
        "HEVC SPS id={sps_id}: {}x{} profile={} level={} depth={}",
        width,
        height,
        sps.profile_idc,
        sps.level_idc,
        bit_depth_luma
    );
    parse_data.hevc_sps[sps_id as usize] = Some(sps);
    Ok(())
}
