//! 进程内事件总线。
//!
//! 每条流是一份只追加的内存日志：发布即追加并分配单调递增的序号，
//! 每个订阅者持有自己的读取游标，从序号 1 开始读，因此晚加入的订阅者也能看到完整历史。
//! 发布不等待订阅者；日志写满容量或已关闭时发布失败，错误必须由调用方上报。

use domain::{Command, OutboundEvent};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;
use tracing::error;

/// 事件总线错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("backpressure: {stream} log full at {capacity} events")]
    Backpressure {
        stream: &'static str,
        capacity: usize,
    },
    #[error("{0} log closed")]
    Closed(&'static str),
    #[error("{0} log lock poisoned")]
    Lock(&'static str),
}

/// 日志中的一条记录。
#[derive(Debug)]
pub struct LogEntry<T> {
    /// 从 1 开始的序号
    pub seq: u64,
    pub value: Arc<T>,
}

impl<T> Clone for LogEntry<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            value: Arc::clone(&self.value),
        }
    }
}

struct LogState<T> {
    entries: Vec<Arc<T>>,
    closed: bool,
}

struct LogInner<T> {
    name: &'static str,
    capacity: usize,
    state: RwLock<LogState<T>>,
    notify: Notify,
}

/// 可重放的多播日志（克隆共享同一份日志）。
pub struct EventLog<T> {
    inner: Arc<LogInner<T>>,
}

impl<T> Clone for EventLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync> EventLog<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(LogInner {
                name,
                capacity: capacity.max(1),
                state: RwLock::new(LogState {
                    entries: Vec::new(),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// 追加一条事件，返回其序号。
    pub fn publish(&self, value: T) -> Result<u64, PipelineError> {
        let seq = {
            let mut state = self
                .inner
                .state
                .write()
                .map_err(|_| PipelineError::Lock(self.inner.name))?;
            if state.closed {
                return Err(PipelineError::Closed(self.inner.name));
            }
            if state.entries.len() >= self.inner.capacity {
                error!(
                    target: "irrigation.pipeline",
                    stream = self.inner.name,
                    capacity = self.inner.capacity,
                    "event_log_saturated"
                );
                return Err(PipelineError::Backpressure {
                    stream: self.inner.name,
                    capacity: self.inner.capacity,
                });
            }
            state.entries.push(Arc::new(value));
            state.entries.len() as u64
        };
        self.inner.notify.notify_waiters();
        Ok(seq)
    }

    /// 当前已发布的事件数（即最新序号）。
    pub fn len(&self) -> u64 {
        self.inner
            .state
            .read()
            .map(|state| state.entries.len() as u64)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取序号 `from_seq` 起（含）的至多 `limit` 条记录。
    pub fn read_from(&self, from_seq: u64, limit: usize) -> Vec<LogEntry<T>> {
        let Ok(state) = self.inner.state.read() else {
            return Vec::new();
        };
        let start = from_seq.max(1) as usize - 1;
        state
            .entries
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .map(|(index, value)| LogEntry {
                seq: index as u64 + 1,
                value: Arc::clone(value),
            })
            .collect()
    }

    /// 从头订阅（完整回放历史后继续接收新事件）。
    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribe_from(1)
    }

    /// 从指定序号订阅。
    pub fn subscribe_from(&self, from_seq: u64) -> Subscription<T> {
        Subscription {
            log: self.clone(),
            next_seq: from_seq.max(1),
        }
    }

    /// 关闭日志：拒绝后续发布，订阅者读完剩余事件后结束。
    pub fn close(&self) {
        if let Ok(mut state) = self.inner.state.write() {
            state.closed = true;
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .read()
            .map(|state| state.closed)
            .unwrap_or(true)
    }

    fn entry_at(&self, seq: u64) -> (Option<Arc<T>>, bool) {
        match self.inner.state.read() {
            Ok(state) => (
                state.entries.get(seq as usize - 1).map(Arc::clone),
                state.closed,
            ),
            Err(_) => (None, true),
        }
    }
}

/// 订阅者：独立的读取游标。
pub struct Subscription<T> {
    log: EventLog<T>,
    next_seq: u64,
}

impl<T: Send + Sync> Subscription<T> {
    /// 下一条待读序号。
    pub fn cursor(&self) -> u64 {
        self.next_seq
    }

    /// 非阻塞读取下一条。
    pub fn try_next(&mut self) -> Option<LogEntry<T>> {
        let (value, _) = self.log.entry_at(self.next_seq);
        let value = value?;
        let entry = LogEntry {
            seq: self.next_seq,
            value,
        };
        self.next_seq += 1;
        Some(entry)
    }

    /// 等待下一条；日志关闭且已读完时返回 `None`。
    pub async fn next(&mut self) -> Option<LogEntry<T>> {
        loop {
            // 先登记唤醒再检查，避免检查与等待之间的发布被漏掉。
            let notified = self.log.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (value, closed) = self.log.entry_at(self.next_seq);
            if let Some(value) = value {
                let entry = LogEntry {
                    seq: self.next_seq,
                    value,
                };
                self.next_seq += 1;
                return Some(entry);
            }
            if closed {
                return None;
            }
            notified.await;
        }
    }
}

/// 网关的两条事件流。
#[derive(Clone)]
pub struct EventBus {
    /// 设备 → 订阅方：状态上报与命令结果
    pub reports: EventLog<OutboundEvent>,
    /// 订阅方 → 设备：待下发命令
    pub commands: EventLog<Command>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: EventLog::new("reports", capacity),
            commands: EventLog::new("commands", capacity),
        }
    }

    pub fn close(&self) {
        self.reports.close();
        self.commands.close();
    }
}
