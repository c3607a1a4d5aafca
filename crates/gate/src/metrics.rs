//! 准入网关指标

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

lazy_static! {
    /// 准入决策次数（按结果和精确原因分组）
    pub(crate) static ref GATE_ADMISSIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("gate_admissions_total", "Total number of admission decisions")
            .namespace("addrbook"),
        &["outcome", "reason"]
    ).unwrap();

    /// 当前账本中的 nonce 数量
    pub(crate) static ref GATE_LEDGER_SIZE: IntGauge = IntGauge::with_opts(
        Opts::new("gate_ledger_nonces", "Number of nonces currently held by the ledger")
            .namespace("addrbook")
    ).unwrap();

    /// 清理任务回收的 nonce 数量
    pub(crate) static ref GATE_LEDGER_EVICTIONS: IntCounter = IntCounter::with_opts(
        Opts::new("gate_ledger_evictions_total", "Total number of nonces evicted by the reaper")
            .namespace("addrbook")
    ).unwrap();
}

/// 注册网关 metrics 到全局 registry
pub fn register_gate_metrics(registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(GATE_ADMISSIONS.clone()))?;
    registry.register(Box::new(GATE_LEDGER_SIZE.clone()))?;
    registry.register(Box::new(GATE_LEDGER_EVICTIONS.clone()))?;
    Ok(())
}

pub(crate) fn record_accept() {
    GATE_ADMISSIONS.with_label_values(&["accept", "none"]).inc();
}

pub(crate) fn record_reject(reason: &str) {
    GATE_ADMISSIONS.with_label_values(&["reject", reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_gate_metrics() {
        let registry = prometheus::Registry::new();
        register_gate_metrics(&registry).unwrap();

        record_reject("nonce_reused");
        let families = registry.gather();
        assert!(
            families
                .iter()
                .any(|f| f.get_name() == "addrbook_gate_admissions_total")
        );

        // 重复注册应报错
        assert!(register_gate_metrics(&registry).is_err());
    }
}
