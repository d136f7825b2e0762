//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义阻塞缓冲对外暴露的全部错误语义，调用方只需匹配一个枚举；
//! - 区分“可恢复的使用错误”（写入已关闭缓冲、重复关闭）与“正常终止信号”（`EndOfStream`）。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 提供到 [`std::io::Error`] 的转换，使 `std::io::{Read, Write}` 适配层可以直接 `?` 传播。

use std::io;

use thiserror::Error;

/// 阻塞缓冲错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把关闭后写入、重复关闭、读端结束与运行时失败统一为显式返回值，
///   杜绝静默丢数据或挂起。
/// - **契约 (What)**：
///   - `Closed`：`write` 在 `close` 之后被调用，数据未被接收；
///   - `EndOfStream`：缓冲已关闭且全部字节已交付，属于正常终止而非故障；
///   - `AlreadyClosed`：第二次调用 `close`，属于编程错误，但不会破坏内部状态；
///   - `Spawn`：转发线程无法启动，携带底层 `io::Error`。
/// - **设计权衡 (Trade-offs)**：`EndOfStream` 作为错误变体出现，是为了让固有 API 与
///   “读到末尾”语义一一对应；`std::io::Read` 适配层会将其还原为 `Ok(0)`。
#[derive(Debug, Error)]
pub enum BufferError {
    /// 缓冲已关闭，拒绝继续写入。
    #[error("blocking buffer is closed for writing")]
    Closed,

    /// 缓冲已关闭且所有字节均已被读取。
    #[error("blocking buffer reached end of stream")]
    EndOfStream,

    /// 重复调用 `close`。
    #[error("blocking buffer was already closed")]
    AlreadyClosed,

    /// 转发线程启动失败。
    #[error("failed to spawn forwarder thread: {0}")]
    Spawn(#[source] io::Error),
}

impl BufferError {
    /// 判断是否为读端的正常终止信号。
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, BufferError::EndOfStream)
    }
}

impl From<BufferError> for io::Error {
    /// 将缓冲错误映射为 `std::io` 错误。
    ///
    /// - `Closed` 对应 `BrokenPipe`，与向已关闭管道写入的系统语义一致；
    /// - `EndOfStream` 对应 `UnexpectedEof`，仅在调用方绕过 `Read` 适配层时出现；
    /// - `Spawn` 保留原始错误，不做二次包装。
    fn from(value: BufferError) -> Self {
        match value {
            BufferError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, value),
            BufferError::EndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, value),
            BufferError::AlreadyClosed => io::Error::other(value),
            BufferError::Spawn(source) => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_maps_to_broken_pipe() {
        let err: io::Error = BufferError::Closed.into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn spawn_error_is_passed_through() {
        let source = io::Error::new(io::ErrorKind::OutOfMemory, "no threads left");
        let err: io::Error = BufferError::Spawn(source).into();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
    }

    #[test]
    fn only_end_of_stream_reports_eof() {
        assert!(BufferError::EndOfStream.is_end_of_stream());
        assert!(!BufferError::Closed.is_end_of_stream());
        assert!(!BufferError::AlreadyClosed.is_end_of_stream());
    }
}
