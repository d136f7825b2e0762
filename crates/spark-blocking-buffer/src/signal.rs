//! 单槽合并唤醒信号。
//!
//! # 设计背景（Why）
//! - 高并发写入时若每次写都唤醒转发线程，唤醒次数与写者数量成正比，徒增调度开销；
//! - 转发线程每次醒来都会把队列里的全部待处理字节一并切走，因此多次写入只需一次唤醒。
//!
//! # 逻辑解析（How）
//! - [`WakeToken`] 以一个原子布尔位表达“自上次检查以来队列变为非空”，`post` 只在 `0 -> 1`
//!   时成功，`take` 只在 `1 -> 0` 时成功，令牌计数因此恒为 0 或 1；
//! - [`WakeSignal`] 在令牌之外叠加 `parking_lot` 的互斥锁与条件变量，供转发线程阻塞等待。
//!   发布者在持锁状态下通知，等待者在持锁状态下复查令牌，从而避免丢失唤醒。
//
// 教案级说明：启用 `--cfg loom` 时令牌切换为 Loom 的原子类型，以便模型检查穷举调度交错；
// 阻塞等待部分不参与模型检查。
#[cfg(not(any(loom, spark_loom)))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(any(loom, spark_loom))]
use loom::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// 合并唤醒令牌，计数恒为 0 或 1。
#[derive(Debug)]
pub(crate) struct WakeToken {
    pending: AtomicBool,
}

impl WakeToken {
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// 发布令牌；若此前已有未消费的令牌则合并，返回 `false`。
    pub(crate) fn post(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 消费令牌；无令牌时返回 `false`。
    pub(crate) fn take(&self) -> bool {
        self.pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// 转发线程使用的可阻塞唤醒信号。
///
/// # 契约说明（What）
/// - **后置条件**：任意一次 `post` 之后，至少有一次 `wait` 会返回；
/// - **不变量**：未消费的唤醒不会累积，最多保留一个；
/// - 仅允许单一等待者（转发线程），多个等待者时只有一个会被唤醒。
#[derive(Debug)]
pub(crate) struct WakeSignal {
    token: WakeToken,
    lock: Mutex<()>,
    cond: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self {
            token: WakeToken::new(),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// 发布唤醒。仅在令牌 `0 -> 1` 时真正通知等待者。
    pub(crate) fn post(&self) -> bool {
        if !self.token.post() {
            return false;
        }
        let _guard = self.lock.lock();
        self.cond.notify_one();
        true
    }

    /// 非阻塞地消费令牌。
    pub(crate) fn try_take(&self) -> bool {
        self.token.take()
    }

    /// 阻塞直到消费到一个令牌。
    pub(crate) fn wait(&self) {
        loop {
            if self.token.take() {
                return;
            }
            let mut guard = self.lock.lock();
            // 持锁复查：发布者置位后必须先拿到同一把锁才能通知。
            if self.token.is_pending() {
                continue;
            }
            self.cond.wait(&mut guard);
        }
    }
}
