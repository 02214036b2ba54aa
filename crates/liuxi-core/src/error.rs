//! 统一错误类型定义.
//!
//! 所有 Liuxi crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Liuxi 统一错误类型
///
/// 错误分类遵循一个简单的契约:
/// - [`LiuxiError::Eof`] 不是故障, 用于驱动上层的循环播放/结束逻辑;
/// - [`LiuxiError::InvalidData`] 只废弃当前 NAL 单元的解析, 已生效的
///   SPS/PPS 表项不受影响;
/// - [`LiuxiError::OutOfMemory`] 是致命错误, 调用方应终止整条流.
#[derive(Debug, Error)]
pub enum LiuxiError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 无效数据 (损坏或截断的码流语法)
    #[error("无效数据: {0}")]
    InvalidData(String),
}

/// Liuxi 统一 Result 类型
pub type LiuxiResult<T> = Result<T, LiuxiError>;
