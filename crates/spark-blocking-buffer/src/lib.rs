//! `spark-blocking-buffer` 提供多读多写、读操作阻塞的无界字节缓冲。
//!
//! # 模块定位（Why）
//! - 在生产者/消费者流水线中充当进程内的“带缓冲无界管道”：写者与读者运行在独立线程上，
//!   读者在无数据时挂起等待而非忙等轮询；
//! - 读操作要么拿到至少一个字节，要么在缓冲关闭且取尽后观察到流结束，不会提前返回零字节。
//!
//! # 设计概要（How）
//! - `buffer` 模块实现 [`BlockingBuffer`]：锁保护的 `BytesMut` 队列、一次性关闭状态，
//!   以及构造时启动、随实例销毁的转发线程；
//! - `signal` 模块提供单槽合并唤醒，突发的多次写入最多只唤醒转发线程一次；
//! - `conduit` 模块提供单生产者、多消费者的阻塞交接通道，读者按到达顺序领取互不重叠的字节；
//! - `config` 与 `error` 分别承载构造期配置与错误语义。
//!
//! # 使用示例
//! ```
//! use std::{sync::Arc, thread};
//! use spark_blocking_buffer::{BlockingBuffer, BufferError};
//!
//! let buffer = Arc::new(BlockingBuffer::new(64).expect("启动转发线程"));
//! let writer = {
//!     let buffer = Arc::clone(&buffer);
//!     thread::spawn(move || {
//!         buffer.write(b"abc").expect("写入");
//!         buffer.write(b"def").expect("写入");
//!         buffer.close().expect("首次关闭");
//!     })
//! };
//!
//! let mut out = Vec::new();
//! let mut chunk = [0u8; 4];
//! loop {
//!     match buffer.read(&mut chunk) {
//!         Ok(n) => out.extend_from_slice(&chunk[..n]),
//!         Err(BufferError::EndOfStream) => break,
//!         Err(err) => panic!("unexpected error: {err}"),
//!     }
//! }
//! writer.join().expect("写线程不应 panic");
//! assert_eq!(out, b"abcdef");
//! ```
//!
//! # 生态互操作
//! [`BlockingBuffer`] 与 `&BlockingBuffer` 均实现 `std::io::Read`/`std::io::Write`，
//! 可直接交给 `std::io::copy`、`BufReader` 等流式工具，流结束被映射为 `Ok(0)`。

mod buffer;
mod conduit;
mod config;
mod error;
mod signal;

pub use buffer::{BlockingBuffer, BufferStats};
pub use config::{BlockingBufferBuilder, BlockingBufferConfig, DEFAULT_THREAD_NAME};
pub use error::BufferError;
