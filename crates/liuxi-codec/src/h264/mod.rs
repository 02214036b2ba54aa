//! H.264 访问单元边界扫描.
//!
//! 逐个起始码遍历 Annex B 码流, 解析 SPS/PPS/切片头并维护
//! [`FrameParseData`] 状态, 返回下一个访问单元 (一幅图像) 的
//! 起始码偏移量.
//!
//! 边界判定依据 ITU-T H.264 7.4.1.2.4:
//! - 已见切片后出现 SEI/SPS/PPS/AUD 等非 VCL NAL, 当前图像结束;
//! - 相邻两个切片头关键字段不同 ([`slice`] 中的规则表), 新图像开始.

pub mod parameter_sets;
pub mod slice;

use std::io::Read;

use liuxi_core::{LiuxiError, LiuxiResult};
use log::{debug, warn};

use crate::parse_data::FrameParseData;
use crate::scanner::StreamScanner;

/// 扫描下一个 H.264 访问单元
///
/// 从缓冲区起始处扫描, 返回下一个访问单元首个起始码的偏移量.
/// 调用方消费该前缀后再次调用即可遍历整个码流. 输入耗尽时返回
/// [`LiuxiError::Eof`], 此时缓冲区中剩余的数据属于最后一个
/// (不完整边界的) 访问单元.
pub fn scan_next_au<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
) -> LiuxiResult<usize> {
    let mut start_offset = 0usize;
    let mut has_slice = false;

    loop {
        let end_offset = scanner.find_start_code(start_offset)?;
        scanner.ensure_readable(end_offset + 4)?;
        let nalu_type = scanner.buffer[end_offset + 3] & 0x1F;

        match nalu_type {
            7 => {
                if let Err(err) = parameter_sets::parse_sps(scanner, parse_data, end_offset) {
                    match err {
                        LiuxiError::InvalidData(msg) => warn!("H.264 SPS 解析失败, 跳过: {msg}"),
                        other => return Err(other),
                    }
                }
            }
            8 => {
                if let Err(err) = parameter_sets::parse_pps(scanner, parse_data, end_offset) {
                    match err {
                        LiuxiError::InvalidData(msg) => warn!("H.264 PPS 解析失败, 跳过: {msg}"),
                        other => return Err(other),
                    }
                }
            }
            _ => {}
        }

        let slice_header = if (1..=5).contains(&nalu_type) {
            match slice::parse_slice_header(scanner, parse_data, end_offset) {
                Ok(header) => header,
                Err(LiuxiError::InvalidData(msg)) => {
                    warn!("H.264 切片头解析失败, 跳过: {msg}");
                    None
                }
                Err(other) => return Err(other),
            }
        } else {
            None
        };

        // 已有切片后出现非 VCL NAL, 当前访问单元在此结束
        if has_slice && matches!(nalu_type, 6..=9 | 14..=18) {
            debug!("访问单元结束于非 VCL NAL (type={nalu_type}), 偏移 {end_offset}");
            return Ok(end_offset);
        }

        if (1..=5).contains(&nalu_type) {
            if let Some(header) = slice_header {
                if !has_slice {
                    has_slice = true;
                    parse_data.last_h264_slice_header = header;
                    start_offset = end_offset + 1;
                    continue;
                }
                let sps = parse_data.h264_pps[usize::from(header.pic_parameter_set_id)]
                    .and_then(|pps| parse_data.h264_sps[usize::from(pps.seq_parameter_set_id)]);
                if let Some(sps) = sps {
                    let is_new =
                        slice::is_new_picture(&parse_data.last_h264_slice_header, &header, &sps);
                    parse_data.last_h264_slice_header = header;
                    if is_new {
                        return Ok(end_offset);
                    }
                }
            }
        }
        start_offset = end_offset + 1;
    }
}
