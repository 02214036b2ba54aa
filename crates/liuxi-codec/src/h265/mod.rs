//! HEVC 访问单元边界扫描.
//!
//! HEVC 的切片段头以 `first_slice_segment_in_pic_flag` 显式标记
//! 图像首个切片段, 边界判定无须比较相邻切片头:
//! - 已见切片后出现参数集/SEI 等非 VCL NAL, 当前图像结束;
//! - 已见切片后出现 `first_slice_segment_in_pic_flag == 1` 的
//!   VCL NAL, 新图像开始.

pub mod sps;

use std::io::Read;

use liuxi_core::{LiuxiError, LiuxiResult};
use log::{debug, warn};

use crate::parse_data::FrameParseData;
use crate::scanner::StreamScanner;

/// NAL 类型是否属于 VCL (切片段)
fn is_vcl(nalu_type: u8) -> bool {
    nalu_type <= 9 || (16..=21).contains(&nalu_type)
}

/// NAL 类型是否在已见切片后结束当前访问单元
///
/// VPS/SPS/PPS/AUD/EOS/EOB/FD, 前缀 SEI 以及保留的非 VCL 区段.
fn ends_au(nalu_type: u8) -> bool {
    matches!(nalu_type, 32..=35 | 39 | 41..=44 | 48..=55)
}

/// 扫描下一个 HEVC 访问单元
///
/// 从缓冲区起始处扫描, 返回下一个访问单元首个起始码的偏移量.
/// 输入耗尽时返回 [`LiuxiError::Eof`], 缓冲区中剩余数据属于最后
/// 一个访问单元.
pub fn scan_next_au<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
) -> LiuxiResult<usize> {
    let mut start_offset = 0usize;
    let mut has_slice = false;

    loop {
        let end_offset = scanner.find_start_code(start_offset)?;
        // NAL 头 2 字节 + 切片段头首字节
        scanner.ensure_readable(end_offset + 6)?;
        let nalu_type = (scanner.buffer[end_offset + 3] & 0x7E) >> 1;

        if nalu_type == 33 {
            if let Err(err) = sps::parse_sps(scanner, parse_data, end_offset) {
                match err {
                    LiuxiError::InvalidData(msg) => warn!("HEVC SPS 解析失败, 跳过: {msg}"),
                    other => return Err(other),
                }
            }
        }

        if ends_au(nalu_type) {
            if has_slice {
                debug!("访问单元结束于非 VCL NAL (type={nalu_type}), 偏移 {end_offset}");
                return Ok(end_offset);
            }
        } else if is_vcl(nalu_type) {
            let first_slice_segment_in_pic_flag = scanner.buffer[end_offset + 5] >> 7;
            if has_slice && first_slice_segment_in_pic_flag == 1 {
                debug!("新图像首个切片段, 偏移 {end_offset}");
                return Ok(end_offset);
            }
            has_slice = true;
        }
        start_offset = end_offset + 1;
    }
}
