//! Nonce 账本
//!
//! 内存中的时间窗口 nonce 集合，保证同一个 nonce 在保留期内只被接受一次。
//!
//! # 设计
//!
//! - `admit` 在同一把锁内完成检查和插入，并发请求同一 nonce 只有一个成功
//! - 锁只在单次检查或单次清理期间持有，从不跨越 `.await`
//! - 后台清理任务由 [`NonceLedger::spawn`] 启动，生命周期归 [`ReaperHandle`] 所有

use crate::config::GateConfig;
use crate::error::NonceError;
use crate::metrics::{GATE_LEDGER_EVICTIONS, GATE_LEDGER_SIZE};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Nonce 账本
#[derive(Debug)]
pub struct NonceLedger {
    /// nonce -> 首次出现时间
    records: Mutex<HashMap<String, Instant>>,
    retention: Duration,
    capacity: Option<usize>,
}

impl NonceLedger {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            retention,
            capacity: None,
        }
    }

    /// 设置容量上限
    pub fn with_capacity_limit(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.nonce_retention()).with_capacity_limit(config.max_nonces)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Nonce ledger lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// 原子地检查并记录 nonce
    ///
    /// nonce 已存在时返回 `Reused` 且不修改状态。
    /// 达到容量上限时先就地清理过期记录，仍然已满则返回 `Saturated`。
    pub fn admit(&self, nonce: &str) -> Result<(), NonceError> {
        let now = Instant::now();
        let mut records = self.lock();

        if records.contains_key(nonce) {
            return Err(NonceError::Reused);
        }

        if let Some(capacity) = self.capacity
            && records.len() >= capacity
        {
            let evicted = evict_expired(&mut records, now, self.retention);
            if evicted > 0 {
                GATE_LEDGER_EVICTIONS.inc_by(evicted as u64);
                debug!("Ledger at capacity, evicted {} expired nonces inline", evicted);
            }
            if records.len() >= capacity {
                GATE_LEDGER_SIZE.set(records.len() as i64);
                return Err(NonceError::Saturated { capacity });
            }
        }

        records.insert(nonce.to_owned(), now);
        GATE_LEDGER_SIZE.set(records.len() as i64);
        Ok(())
    }

    /// 清理过期记录，返回清理数量
    ///
    /// 过期条件：`now - first_seen_at > retention`
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut records = self.lock();
        let evicted = evict_expired(&mut records, now, self.retention);
        GATE_LEDGER_SIZE.set(records.len() as i64);
        if evicted > 0 {
            GATE_LEDGER_EVICTIONS.inc_by(evicted as u64);
        }
        evicted
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.lock().contains_key(nonce)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 启动后台清理任务
    ///
    /// 必须在 tokio 运行时内调用。返回的 [`ReaperHandle`] 被 drop 或调用
    /// `shutdown()` 时清理任务停止。
    pub fn spawn(self, interval: Duration) -> (Arc<Self>, ReaperHandle) {
        let ledger = Arc::new(self);
        let token = CancellationToken::new();

        let task = tokio::spawn(run_reaper(ledger.clone(), interval, token.clone()));

        info!(
            "Nonce ledger reaper started (retention={}s, interval={}s)",
            ledger.retention.as_secs(),
            interval.as_secs()
        );

        (
            ledger,
            ReaperHandle {
                token,
                task: Some(task),
            },
        )
    }
}

fn evict_expired(records: &mut HashMap<String, Instant>, now: Instant, retention: Duration) -> usize {
    let before = records.len();
    records.retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= retention);
    before - records.len()
}

async fn run_reaper(ledger: Arc<NonceLedger>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即完成
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Nonce ledger reaper cancelled");
                break;
            }
            _ = ticker.tick() => {
                let evicted = ledger.sweep();
                if evicted > 0 {
                    info!("Reaper evicted {} expired nonces, {} remaining", evicted, ledger.len());
                }
            }
        }
    }
}

/// 清理任务句柄
#[derive(Debug)]
pub struct ReaperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// 停止清理任务并等待其退出
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Nonce ledger reaper ended abnormally: {}", e);
        }
        info!("Nonce ledger reaper stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
