//! # Liuxi (流析)
//!
//! 纯 Rust 实现的 Annex B 码流预解析库.
//!
//! 在打开硬件解码会话之前, Liuxi 对原始 H.264/HEVC 基本流做一遍
//! 轻量扫描:
//! - **访问单元定位**: 找到每幅图像的起始码偏移量;
//! - **流参数提取**: 分辨率、帧率、位深、profile/level.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::fs::File;
//! use liuxi::codec::{CodecId, FrameParseData, StreamScanner, scan_next_au};
//!
//! # fn main() -> liuxi::core::LiuxiResult<()> {
//! let file = File::open("input.h265")?;
//! let mut scanner = StreamScanner::new(file);
//! let mut parse_data = FrameParseData::new(CodecId::Hevc);
//! let offset = scan_next_au(&mut scanner, &mut parse_data)?;
//! println!("首个访问单元结束于偏移 {offset}");
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liuxi-core` | 位读取、Exp-Golomb、错误与有理数类型 |
//! | `liuxi-codec` | 字节流扫描与 H.264/HEVC 头部解析 |

/// 核心类型与工具
pub use liuxi_core as core;

/// 码流扫描与头部解析
pub use liuxi_codec as codec;

/// 获取 Liuxi 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
