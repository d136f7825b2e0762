//! 单生产者、多消费者的阻塞交接通道。
//!
//! # 模块角色（Why）
//! - 转发线程把从队列切出的字节块交给读端，并在读端消费完之前保持阻塞；
//!   这样“持锁者”与“等待读者”被拆开，读端缓慢或缺席不会卡住写端。
//!
//! # 核心机制（How）
//! - 槽位 `chunk` 至多持有一个 [`Bytes`] 块；读者通过 `split_to` 领取互不重叠的前缀，
//!   因此同一字节只会交付给一个读者；
//! - `readable` 条件变量唤醒读者，`drained` 条件变量唤醒生产者；
//! - 读者领取部分字节后若槽位仍有剩余，会继续唤醒下一位读者，直到槽位清空后通知生产者。
//!
//! # 契约说明（What）
//! - `push` 只能由转发线程调用，返回时该块已被完整消费；
//! - `close` 为优雅结束：读者先取尽槽位，再观察到 `EndOfStream`；
//! - `abort` 仅用于缓冲析构：立即释放阻塞中的生产者。

use bytes::{Buf, Bytes};
use parking_lot::{Condvar, Mutex};

use crate::error::BufferError;

/// 生产者在通道被中止时收到的信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aborted;

#[derive(Debug, Default)]
struct Slot {
    chunk: Bytes,
    closed: bool,
    aborted: bool,
}

impl Slot {
    fn finished(&self) -> bool {
        self.closed || self.aborted
    }
}

#[derive(Debug, Default)]
pub(crate) struct HandoffConduit {
    slot: Mutex<Slot>,
    readable: Condvar,
    drained: Condvar,
}

impl HandoffConduit {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 发布一个字节块并阻塞，直到读者将其全部取走。
    pub(crate) fn push(&self, chunk: Bytes) -> Result<(), Aborted> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut slot = self.slot.lock();
        while slot.chunk.has_remaining() && !slot.aborted {
            self.drained.wait(&mut slot);
        }
        if slot.aborted {
            return Err(Aborted);
        }
        debug_assert!(!slot.closed, "关闭后不得再向通道推送");
        slot.chunk = chunk;
        self.readable.notify_one();

        while slot.chunk.has_remaining() && !slot.aborted {
            self.drained.wait(&mut slot);
        }
        if slot.chunk.has_remaining() {
            return Err(Aborted);
        }
        Ok(())
    }

    /// 阻塞直到槽位中有字节，随后复制尽可能多的字节到 `dest`。
    pub(crate) fn pull(&self, dest: &mut [u8]) -> Result<usize, BufferError> {
        if dest.is_empty() {
            return Ok(0);
        }
        let mut slot = self.slot.lock();
        loop {
            if slot.chunk.has_remaining() {
                let n = dest.len().min(slot.chunk.remaining());
                let head = slot.chunk.split_to(n);
                dest[..n].copy_from_slice(&head);
                if slot.chunk.has_remaining() {
                    self.readable.notify_one();
                } else {
                    self.drained.notify_one();
                }
                return Ok(n);
            }
            if slot.finished() {
                return Err(BufferError::EndOfStream);
            }
            self.readable.wait(&mut slot);
        }
    }

    /// 关闭通道的两端；已在槽位中的字节仍可被读取。
    pub(crate) fn close(&self) {
        let mut slot = self.slot.lock();
        debug_assert!(!slot.closed, "通道只允许关闭一次");
        slot.closed = true;
        self.readable.notify_all();
        self.drained.notify_all();
    }

    /// 中止通道，释放阻塞中的生产者，并丢弃槽位中尚未被读取的字节。
    ///
    /// 返回被丢弃的字节数。
    pub(crate) fn abort(&self) -> usize {
        let mut slot = self.slot.lock();
        slot.aborted = true;
        let dropped = slot.chunk.remaining();
        slot.chunk = Bytes::new();
        self.readable.notify_all();
        self.drained.notify_all();
        dropped
    }
}
