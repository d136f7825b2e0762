use std::num::NonZeroUsize;

use crate::{buffer::BlockingBuffer, error::BufferError};

/// 转发线程的默认名称，便于在调试器与 `top -H` 中定位。
pub const DEFAULT_THREAD_NAME: &str = "spark-blocking-buffer";

/// 构造期配置。
///
/// # 契约说明（What）
/// - `initial_capacity`：队列的初始容量提示，仅影响首次分配，不构成上限；
/// - `max_forward_chunk`：单次交接给读端的最大字节数，`None` 表示一次转发全部待处理字节；
/// - `thread_name`：转发线程名称。
///
/// # 设计取舍（Trade-offs）
/// - 缓冲本身无界，因此这里不存在容量上限或背压阈值；
/// - 配置只在构造时读取一次，运行期不可修改，避免与转发线程竞争。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockingBufferConfig {
    pub initial_capacity: usize,
    pub max_forward_chunk: Option<NonZeroUsize>,
    pub thread_name: String,
}

impl Default for BlockingBufferConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_forward_chunk: None,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl BlockingBufferConfig {
    /// 计算本次应从队列切出的字节数。
    pub(crate) fn forward_len(&self, pending: usize) -> usize {
        match self.max_forward_chunk {
            Some(limit) => pending.min(limit.get()),
            None => pending,
        }
    }
}

/// [`BlockingBuffer`] 的构建器。
///
/// ```
/// use std::num::NonZeroUsize;
/// use spark_blocking_buffer::BlockingBuffer;
///
/// let buffer = BlockingBuffer::builder()
///     .initial_capacity(4096)
///     .max_forward_chunk(NonZeroUsize::new(1024).unwrap())
///     .thread_name("ingest-forwarder")
///     .build()
///     .expect("启动转发线程");
/// buffer.close().expect("首次关闭");
/// ```
#[derive(Clone, Debug, Default)]
pub struct BlockingBufferBuilder {
    config: BlockingBufferConfig,
}

impl BlockingBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    pub fn max_forward_chunk(mut self, limit: NonZeroUsize) -> Self {
        self.config.max_forward_chunk = Some(limit);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// 返回当前累积的配置快照。
    pub fn config(&self) -> &BlockingBufferConfig {
        &self.config
    }

    /// 按当前配置创建缓冲并启动转发线程。
    pub fn build(self) -> Result<BlockingBuffer, BufferError> {
        BlockingBuffer::with_config(self.config)
    }
}
