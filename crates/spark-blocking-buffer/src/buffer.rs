use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, debug_span, trace, warn};

use crate::{
    conduit::HandoffConduit,
    config::{BlockingBufferBuilder, BlockingBufferConfig},
    error::BufferError,
    signal::WakeSignal,
};

/// `BlockingBuffer` 是支持任意数量并发写者与读者的无界字节缓冲，读操作在无数据时阻塞。
///
/// # 模块角色（Why）
/// - 作为进程内的“带缓冲无界管道”，连接运行在不同线程上的生产者与消费者，
///   消费者无需忙等轮询即可在数据到达时被唤醒；
/// - 写端永不等待读端：写入只需短暂持有队列锁，慢读者不会拖住写者。
///
/// # 核心机制（How）
/// - 写入在锁内追加到 `BytesMut` 队列，随后发布一次合并唤醒；
/// - 构造时启动的转发线程被唤醒后，在锁内从队列切走待处理前缀，释放锁后把该块
///   推入交接通道，并阻塞到读者取尽为止；
/// - `close` 将生命周期切换为 `Closed` 并发布最后一次唤醒；转发线程清空队列后关闭通道，
///   读者在取尽剩余字节后观察到 [`BufferError::EndOfStream`]。
///
/// # 契约说明（What）
/// - **顺序**：字节按写入的全局顺序交付；不同写者之间的先后由取得锁的顺序决定，
///   单次写入在流中始终连续；
/// - **不丢不重**：`close` 之前写入的每个字节恰好交付给一个读者一次；
/// - **关闭**：只允许关闭一次，第二次返回 [`BufferError::AlreadyClosed`]；
///   关闭后的写入返回 [`BufferError::Closed`]。
///
/// # 设计取舍（Trade-offs）
/// - 缓冲无界，写入总会被接受；需要背压的场景应在上层限流；
/// - 读操作不提供超时，需要有界等待时应在外部组合取消机制；
/// - 析构时会中止转发线程并丢弃尚未被读取的字节。
#[derive(Debug)]
pub struct BlockingBuffer {
    shared: Arc<Shared>,
    forwarder: Option<JoinHandle<()>>,
}

/// 缓冲运行期统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// 被接受的写入字节总数。
    pub bytes_written: u64,
    /// 已交给交接通道的字节总数。
    pub bytes_forwarded: u64,
    /// 被接受的非空写入次数。
    pub writes: u64,
    /// 转发线程推送的字节块数量。
    pub forwards: u64,
    /// 仍在队列中、尚未转发的字节数。
    pub pending_bytes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
}

#[derive(Debug)]
struct State {
    queue: BytesMut,
    lifecycle: Lifecycle,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    wake: WakeSignal,
    conduit: HandoffConduit,
    metrics: Metrics,
    config: BlockingBufferConfig,
}

#[derive(Debug, Default)]
struct Metrics {
    bytes_written: AtomicU64,
    bytes_forwarded: AtomicU64,
    writes: AtomicU64,
    forwards: AtomicU64,
}

/// 一轮排空的结果。
enum Drain {
    /// 队列已空但仍可写入，回到等待。
    Idle,
    /// 队列已空且已关闭，转发线程应终止。
    Finished,
    /// 通道被析构路径中止。
    Aborted,
}

impl BlockingBuffer {
    /// 以给定的初始容量提示创建缓冲并启动转发线程。
    pub fn new(initial_capacity: usize) -> Result<Self, BufferError> {
        Self::builder().initial_capacity(initial_capacity).build()
    }

    pub fn builder() -> BlockingBufferBuilder {
        BlockingBufferBuilder::new()
    }

    /// 按完整配置创建缓冲。
    ///
    /// 转发线程继承调用方当前的 tracing span，线程内事件会挂在
    /// `blocking_buffer.forwarder` 子 span 下。
    pub fn with_config(config: BlockingBufferConfig) -> Result<Self, BufferError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: BytesMut::with_capacity(config.initial_capacity),
                lifecycle: Lifecycle::Open,
            }),
            wake: WakeSignal::new(),
            conduit: HandoffConduit::new(),
            metrics: Metrics::default(),
            config,
        });

        let span = debug_span!("blocking_buffer.forwarder");
        let forwarder = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(shared.config.thread_name.clone())
                .spawn(move || {
                    let _entered = span.entered();
                    shared.run_forwarder();
                })
                .map_err(BufferError::Spawn)?
        };

        Ok(Self {
            shared,
            forwarder: Some(forwarder),
        })
    }

    /// 追加字节，永不阻塞于读端。
    ///
    /// 空输入直接返回 `Ok(0)`；关闭后的非空写入返回 [`BufferError::Closed`]。
    pub fn write(&self, data: &[u8]) -> Result<usize, BufferError> {
        if data.is_empty() {
            return Ok(0);
        }
        {
            let mut state = self.shared.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                warn!(len = data.len(), "write rejected: buffer is closed");
                return Err(BufferError::Closed);
            }
            state.queue.extend_from_slice(data);
        }
        self.shared.metrics.record_write(data.len());
        self.shared.wake.post();
        Ok(data.len())
    }

    /// 阻塞直到有字节可读，随后尽可能多地填充 `dest`。
    ///
    /// 缓冲关闭且取尽后返回 [`BufferError::EndOfStream`]；`dest` 为空时立即返回 `Ok(0)`。
    pub fn read(&self, dest: &mut [u8]) -> Result<usize, BufferError> {
        self.shared.conduit.pull(dest)
    }

    /// 停止接受写入，并让转发线程在排空队列后结束读端。
    pub fn close(&self) -> Result<(), BufferError> {
        let pending = {
            let mut state = self.shared.state.lock();
            if state.lifecycle == Lifecycle::Closed {
                warn!("close called on an already closed buffer");
                return Err(BufferError::AlreadyClosed);
            }
            state.lifecycle = Lifecycle::Closed;
            state.queue.len()
        };
        debug!(pending, "blocking buffer closed");
        self.shared.wake.post();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().lifecycle == Lifecycle::Closed
    }

    /// 仍在队列中、尚未交给读端的字节数。
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn stats(&self) -> BufferStats {
        let pending_bytes = self.pending_len();
        self.shared.metrics.snapshot(pending_bytes)
    }

    pub fn config(&self) -> &BlockingBufferConfig {
        &self.shared.config
    }
}

impl Drop for BlockingBuffer {
    fn drop(&mut self) {
        let pending = {
            let mut state = self.shared.state.lock();
            state.lifecycle = Lifecycle::Closed;
            state.queue.len()
        };
        let undelivered = pending + self.shared.conduit.abort();
        if undelivered > 0 {
            debug!(undelivered, "blocking buffer dropped with unread bytes");
        }
        self.shared.wake.post();
        if let Some(handle) = self.forwarder.take() {
            if handle.join().is_err() {
                warn!("forwarder thread panicked");
            }
        }
    }
}

impl Shared {
    fn run_forwarder(&self) {
        debug!(
            initial_capacity = self.config.initial_capacity,
            "forwarder started"
        );
        loop {
            self.wake.wait();
            match self.drain() {
                Drain::Idle => continue,
                Drain::Finished => {
                    let stats = self.metrics.snapshot(0);
                    debug!(
                        bytes_forwarded = stats.bytes_forwarded,
                        forwards = stats.forwards,
                        "forwarder terminated"
                    );
                    self.conduit.close();
                    return;
                }
                Drain::Aborted => {
                    debug!("forwarder aborted");
                    return;
                }
            }
        }
    }

    /// 反复从队列切出前缀并推入通道，直到队列为空。
    fn drain(&self) -> Drain {
        loop {
            let chunk = {
                let mut state = self.state.lock();
                if state.queue.is_empty() {
                    return match state.lifecycle {
                        Lifecycle::Open => Drain::Idle,
                        Lifecycle::Closed => Drain::Finished,
                    };
                }
                let len = self.config.forward_len(state.queue.len());
                state.queue.split_to(len).freeze()
            };
            trace!(len = chunk.len(), "forwarding chunk");
            self.metrics.record_forward(chunk.len());
            if self.conduit.push(chunk).is_err() {
                return Drain::Aborted;
            }
        }
    }
}

impl Metrics {
    fn record_write(&self, len: usize) {
        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_forward(&self, len: usize) {
        self.bytes_forwarded.fetch_add(len as u64, Ordering::Relaxed);
        self.forwards.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, pending_bytes: usize) -> BufferStats {
        BufferStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            forwards: self.forwards.load(Ordering::Relaxed),
            pending_bytes,
        }
    }
}

impl io::Read for &BlockingBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match BlockingBuffer::read(*self, buf) {
            Ok(n) => Ok(n),
            Err(BufferError::EndOfStream) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl io::Read for BlockingBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut this: &BlockingBuffer = self;
        io::Read::read(&mut this, buf)
    }
}

impl io::Write for &BlockingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BlockingBuffer::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for BlockingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut this: &BlockingBuffer = self;
        io::Write::write(&mut this, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;
    use std::{io::Read as _, num::NonZeroUsize};
    use tracing_test::traced_test;

    fn drain_to_end(buffer: &BlockingBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 5];
        loop {
            match buffer.read(&mut chunk) {
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    assert!(err.is_end_of_stream(), "意外错误：{err}");
                    return out;
                }
            }
        }
    }

    #[test]
    fn empty_write_is_a_noop_even_after_close() {
        let buffer = BlockingBuffer::new(0).expect("启动缓冲");
        assert_eq!(buffer.write(&[]).expect("空写入"), 0);
        buffer.close().expect("首次关闭");
        assert_eq!(buffer.write(&[]).expect("空写入不受关闭影响"), 0);
        assert_eq!(buffer.stats().writes, 0);
    }

    #[test]
    fn forwarded_bytes_leave_the_queue() {
        let buffer = BlockingBuffer::new(16).expect("启动缓冲");
        buffer.write(b"hello").expect("写入");
        let mut out = [0u8; 5];
        assert_eq!(buffer.read(&mut out).expect("读取"), 5);
        assert_eq!(&out, b"hello");

        buffer.write(b"!").expect("写入");
        let mut one = [0u8; 8];
        assert_eq!(buffer.read(&mut one).expect("读取"), 1);
        assert_eq!(one[0], b'!', "已转发的字节不得重复交付");

        let stats = buffer.stats();
        assert_eq!(stats.bytes_written, 6);
        assert_eq!(stats.bytes_forwarded, 6);
        assert_eq!(stats.pending_bytes, 0);
    }

    #[test]
    fn max_forward_chunk_bounds_each_handoff() {
        let buffer = BlockingBuffer::builder()
            .max_forward_chunk(NonZeroUsize::new(3).expect("非零"))
            .build()
            .expect("启动缓冲");
        buffer.write(b"abcdefgh").expect("写入");
        buffer.close().expect("关闭");

        let mut big = [0u8; 64];
        let mut reads = Vec::new();
        loop {
            match buffer.read(&mut big) {
                Ok(n) => reads.push(big[..n].to_vec()),
                Err(err) => {
                    assert!(err.is_end_of_stream());
                    break;
                }
            }
        }
        assert!(reads.iter().all(|chunk| chunk.len() <= 3));
        assert_eq!(reads.concat(), b"abcdefgh");
        assert_eq!(buffer.stats().forwards, 3);
    }

    #[test]
    fn close_twice_is_rejected_without_breaking_drain() {
        let buffer = BlockingBuffer::new(0).expect("启动缓冲");
        buffer.write(b"abc").expect("写入");
        buffer.close().expect("首次关闭");
        assert!(matches!(buffer.close(), Err(BufferError::AlreadyClosed)));
        assert!(buffer.is_closed());
        assert_eq!(drain_to_end(&buffer), b"abc");
    }

    #[test]
    fn io_read_maps_end_of_stream_to_zero() {
        let mut buffer = BlockingBuffer::new(0).expect("启动缓冲");
        io::Write::write_all(&mut buffer, b"stream").expect("写入");
        buffer.close().expect("关闭");
        let mut out = Vec::new();
        buffer.read_to_end(&mut out).expect("读取到末尾");
        assert_eq!(out, b"stream");
    }

    #[test]
    fn io_write_after_close_is_broken_pipe() {
        let buffer = BlockingBuffer::new(0).expect("启动缓冲");
        buffer.close().expect("关闭");
        let err = io::Write::write(&mut &buffer, b"x").expect_err("关闭后写入应失败");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn drop_without_reader_does_not_hang() {
        let buffer = BlockingBuffer::new(0).expect("启动缓冲");
        buffer.write(b"nobody will read this").expect("写入");
        drop(buffer);
    }

    #[traced_test]
    #[test]
    fn forwarder_lifecycle_is_logged() {
        let buffer = BlockingBuffer::new(8).expect("启动缓冲");
        buffer.write(b"xyz").expect("写入");
        buffer.close().expect("关闭");
        assert_eq!(drain_to_end(&buffer), b"xyz");
        assert!(logs_contain("forwarder started"));
        assert!(logs_contain("blocking buffer closed"));
        assert!(logs_contain("forwarder terminated"));
    }
}
