//! H.264 切片头解析与图像边界判定.

use std::io::Read;

use liuxi_core::{
    BitCursor, LiuxiError, LiuxiResult,
    expgolomb::{read_se, read_ue},
};

use crate::parse_data::{FrameParseData, H264SeqParamSet, H264SliceHeader};
use crate::scanner::{StreamScanner, to_rbsp};

/// 解析切片头中参与边界判定的前缀字段
///
/// 切片引用的 PPS 或 SPS 尚未出现时返回 `Ok(None)`, 调用方跳过该
/// NAL 而不中断扫描; 头部在语法中途截断时返回
/// [`LiuxiError::InvalidData`].
pub(crate) fn parse_slice_header<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
    start_offset: usize,
) -> LiuxiResult<Option<H264SliceHeader>> {
    let end_offset = match scanner.find_start_code(start_offset + 1) {
        Ok(end) => end,
        Err(LiuxiError::Eof) => scanner.buffer.len(),
        Err(e) => return Err(e),
    };
    let rbsp = to_rbsp(&scanner.buffer[start_offset..end_offset])?;
    if rbsp.len() <= 4 {
        return Err(LiuxiError::InvalidData("切片 NAL 过短".to_string()));
    }
    // 跳过 3 字节起始码, NAL 头由位读取器消费
    let mut bc = BitCursor::new(&rbsp[3..]);
    let mut header = H264SliceHeader::default();

    // forbidden_zero_bit
    bc.read_bit();
    header.nal_ref_idc = bc.read_bits(2) as u8;
    header.nal_unit_type = bc.read_bits(5) as u8;

    // first_mb_in_slice
    read_ue(&mut bc);
    // slice_type
    read_ue(&mut bc);
    let pic_parameter_set_id = read_ue(&mut bc);
    if pic_parameter_set_id > 255 {
        log::warn!("切片引用的 PPS id 越界: {pic_parameter_set_id}, 跳过");
        return Ok(None);
    }
    header.pic_parameter_set_id = pic_parameter_set_id as u8;
    parse_data.current_h264_pps = header.pic_parameter_set_id;

    let Some(pps) = parse_data.h264_pps[pic_parameter_set_id as usize] else {
        log::warn!("切片引用的 PPS {pic_parameter_set_id} 不存在, 跳过");
        return Ok(None);
    };
    let Some(sps) = parse_data.h264_sps[usize::from(pps.seq_parameter_set_id)] else {
        log::warn!(
            "PPS {} 引用的 SPS {} 不存在, 跳过",
            pic_parameter_set_id,
            pps.seq_parameter_set_id
        );
        return Ok(None);
    };

    header.frame_num = bc.read_bits(u32::from(sps.log2_max_frame_num_minus4) + 4) as u16;

    if !sps.frame_mbs_only_flag {
        header.field_pic_flag = bc.read_bit() == 1;
        if header.field_pic_flag {
            header.bottom_field_flag = bc.read_bit() == 1;
        }
    }

    if header.nal_unit_type == 5 {
        header.idr_pic_id = read_ue(&mut bc) as u16;
    }

    if sps.pic_order_cnt_type == 0 {
        header.pic_order_cnt_lsb =
            bc.read_bits(u32::from(sps.log2_max_pic_order_cnt_lsb_minus4) + 4) as u16;
        if pps.pic_order_present_flag && !header.field_pic_flag {
            header.delta_pic_order_cnt_bottom = read_se(&mut bc);
        }
    }
    if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
        header.delta_pic_order_cnt[0] = read_se(&mut bc);
        if pps.pic_order_present_flag && !header.field_pic_flag {
            header.delta_pic_order_cnt[1] = read_se(&mut bc);
        }
    }

    if bc.at_eof() {
        return Err(LiuxiError::InvalidData("切片头数据不完整".to_string()));
    }

    Ok(Some(header))
}

/// 图像边界判定规则
///
/// 任一规则命中即认为当前切片开启新图像.
struct NewPictureRule {
    name: &'static str,
    hit: fn(&H264SliceHeader, &H264SliceHeader, &H264SeqParamSet) -> bool,
}

/// 按 ITU-T H.264 7.4.1.2.4 的"首个 VCL NAL"判据排列的规则表
const NEW_PICTURE_RULES: [NewPictureRule; 9] = [
    NewPictureRule {
        name: "frame_num_changed",
        hit: |prev, cur, _| prev.frame_num != cur.frame_num,
    },
    NewPictureRule {
        name: "pps_id_changed",
        hit: |prev, cur, _| prev.pic_parameter_set_id != cur.pic_parameter_set_id,
    },
    NewPictureRule {
        name: "field_pic_flag_changed",
        hit: |prev, cur, _| prev.field_pic_flag != cur.field_pic_flag,
    },
    NewPictureRule {
        name: "bottom_field_changed",
        hit: |prev, cur, _| {
            prev.field_pic_flag
                && cur.field_pic_flag
                && prev.bottom_field_flag != cur.bottom_field_flag
        },
    },
    NewPictureRule {
        name: "ref_idc_zero_transition",
        hit: |prev, cur, _| {
            prev.nal_ref_idc != cur.nal_ref_idc
                && (prev.nal_ref_idc == 0 || cur.nal_ref_idc == 0)
        },
    },
    NewPictureRule {
        name: "poc_type0_changed",
        hit: |prev, cur, sps| {
            sps.pic_order_cnt_type == 0
                && (prev.pic_order_cnt_lsb != cur.pic_order_cnt_lsb
                    || prev.delta_pic_order_cnt_bottom != cur.delta_pic_order_cnt_bottom)
        },
    },
    NewPictureRule {
        name: "poc_type1_changed",
        hit: |prev, cur, sps| {
            sps.pic_order_cnt_type == 1
                && (prev.delta_pic_order_cnt[0] != cur.delta_pic_order_cnt[0]
                    || prev.delta_pic_order_cnt[1] != cur.delta_pic_order_cnt[1])
        },
    },
    NewPictureRule {
        name: "idr_flag_changed",
        hit: |prev, cur, _| {
            prev.nal_unit_type != cur.nal_unit_type
                && (prev.nal_unit_type == 5 || cur.nal_unit_type == 5)
        },
    },
    NewPictureRule {
        name: "idr_pic_id_changed",
        hit: |prev, cur, _| {
            prev.nal_unit_type == 5 && cur.nal_unit_type == 5 && prev.idr_pic_id != cur.idr_pic_id
        },
    },
];

/// 判断当前切片是否开启新图像
pub(crate) fn is_new_picture(
    prev: &H264SliceHeader,
    cur: &H264SliceHeader,
    sps: &H264SeqParamSet,
) -> bool {
    NEW_PICTURE_RULES.iter().any(|rule| {
        let hit = (rule.hit)(prev, cur, sps);
        if hit {
            log::debug!("图像边界: 规则 {} 命中", rule.name);
        }
        hit
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_header() -> H264SliceHeader {
        H264SliceHeader {
            delta_pic_order_cnt_bottom: 0,
            delta_pic_order_cnt: [0, 0],
            frame_num: 3,
            idr_pic_id: 0,
            pic_order_cnt_lsb: 6,
            pic_parameter_set_id: 0,
            field_pic_flag: false,
            bottom_field_flag: false,
            nal_ref_idc: 2,
            nal_unit_type: 1,
        }
    }

    fn base_sps() -> H264SeqParamSet {
        H264SeqParamSet {
            pic_order_cnt_type: 0,
            ..H264SeqParamSet::default()
        }
    }

    #[test]
    fn test_same_picture_not_new() {
        let prev = base_header();
        let cur = prev;
        assert!(!is_new_picture(&prev, &cur, &base_sps()));
    }

    #[test]
    fn test_frame_num_change_is_new() {
        let prev = base_header();
        let mut cur = prev;
        cur.frame_num = 4;
        cur.pic_order_cnt_lsb = 8;
        assert!(is_new_picture(&prev, &cur, &base_sps()));
    }

    #[test]
    fn test_poc_lsb_change_is_new() {
        let prev = base_header();
        let mut cur = prev;
        cur.pic_order_cnt_lsb = 8;
        assert!(is_new_picture(&prev, &cur, &base_sps()));
        // pic_order_cnt_type != 0 时该规则不适用
        let mut sps = base_sps();
        sps.pic_order_cnt_type = 2;
        assert!(!is_new_picture(&prev, &cur, &sps));
    }

    #[test]
    fn test_ref_idc_transition() {
        let prev = base_header();
        let mut cur = prev;
        // 2 → 1: 均为参考, 不触发
        cur.nal_ref_idc = 1;
        assert!(!is_new_picture(&prev, &cur, &base_sps()));
        // 2 → 0: 参考与非参考之间切换, 触发
        cur.nal_ref_idc = 0;
        assert!(is_new_picture(&prev, &cur, &base_sps()));
    }

    #[test]
    fn test_idr_boundary() {
        let mut prev = base_header();
        prev.nal_unit_type = 5;
        prev.idr_pic_id = 1;
        let mut cur = prev;
        assert!(!is_new_picture(&prev, &cur, &base_sps()));
        cur.idr_pic_id = 2;
        assert!(is_new_picture(&prev, &cur, &base_sps()));
    }

    #[test]
    fn test_field_pair_same_picture_fields() {
        // 两个场图像之间底场标志翻转, 视为新图像起点
        let mut prev = base_header();
        prev.field_pic_flag = true;
        let mut cur = prev;
        cur.bottom_field_flag = true;
        let mut sps = base_sps();
        sps.pic_order_cnt_type = 2;
        assert!(is_new_picture(&prev, &cur, &sps));
    }
}
