//! # liuxi-core
//!
//! 流析 (Liuxi) 码流预解析库的核心层, 提供位级读取、Exp-Golomb
//! 解码、错误处理和有理数类型.
//!
//! 解析器本身 (Annex-B 扫描、H.264/HEVC 头部解析) 位于 `liuxi-codec`.

pub mod bitreader;
pub mod error;
pub mod expgolomb;
pub mod rational;

// 重导出常用类型
pub use bitreader::BitCursor;
pub use error::{LiuxiError, LiuxiResult};
pub use rational::Rational;
