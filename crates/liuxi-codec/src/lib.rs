//! # liuxi-codec
//!
//! Annex B 码流预解析: 扫描访问单元边界并提取开启解码会话所需的
//! 流参数 (分辨率、帧率、位深、profile/level).
//!
//! # 使用方式
//!
//! ```no_run
//! use std::fs::File;
//! use liuxi_codec::{CodecId, FrameParseData, StreamScanner, scan_next_au};
//!
//! # fn main() -> liuxi_core::LiuxiResult<()> {
//! let file = File::open("input.h264")?;
//! let mut scanner = StreamScanner::new(file);
//! let mut parse_data = FrameParseData::new(CodecId::H264);
//! let offset = scan_next_au(&mut scanner, &mut parse_data)?;
//! if let Some(params) = parse_data.stream_parameters() {
//!     println!("{}x{} @ {}/{}", params.width, params.height,
//!              params.fps_num, params.fps_den);
//! }
//! # let _ = offset;
//! # Ok(())
//! # }
//! ```

pub mod h264;
pub mod h265;
pub mod parse_data;
pub mod scanner;

use std::io::Read;

use liuxi_core::LiuxiResult;

pub use parse_data::{CodecId, FrameParseData, StreamParameters};
pub use scanner::StreamScanner;

/// 扫描下一个访问单元, 按编解码器分派
///
/// 返回下一个访问单元首个起始码在扫描器缓冲区中的偏移量.
/// 调用方消费该前缀后再次调用即可逐个遍历访问单元.
pub fn scan_next_au<R: Read>(
    scanner: &mut StreamScanner<R>,
    parse_data: &mut FrameParseData,
) -> LiuxiResult<usize> {
    match parse_data.codec {
        CodecId::H264 => h264::scan_next_au(scanner, parse_data),
        CodecId::Hevc => h265::scan_next_au(scanner, parse_data),
    }
}
