//! Prometheus 监控指标模块
//!
//! 提供进程级 Registry 和文本格式导出

use lazy_static::lazy_static;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Once;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    /// 全局 Prometheus Registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// 构建信息，值恒为 1
    pub static ref BUILD_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("build_info", "Build information of the running binary")
            .namespace("addrbook"),
        &["version"]
    ).unwrap();
}

/// 注册进程级指标和准入网关指标到全局 Registry
///
/// 幂等：只有第一次调用会真正注册。
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
            BUILD_INFO
                .with_label_values(&[env!("CARGO_PKG_VERSION")])
                .set(1);

            gate::register_gate_metrics(&REGISTRY)?;

            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    result
}

/// 导出 Prometheus 文本格式的指标
pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_register_metrics_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    #[serial]
    fn test_export_metrics() {
        register_metrics().unwrap();

        let output = export_metrics().unwrap();
        assert!(
            output.contains("addrbook_build_info"),
            "Output should contain build_info metric. Output: {output}"
        );
        assert!(output.contains(env!("CARGO_PKG_VERSION")));
    }
}
