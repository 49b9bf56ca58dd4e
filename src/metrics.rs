//! Prometheus 监控指标
//!
//! 指标以全局静态量定义，由调用方通过 [`register_metrics`] 挂到自己的
//! `Registry` 上导出。

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::Instant;

lazy_static! {
    /// 授权决策次数（按结果与原因分组）
    pub static ref DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("veritoken_decisions_total", "Total number of authorization decisions"),
        &["status", "reason"]
    ).unwrap();

    /// 状态存储调用失败次数
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("veritoken_store_errors_total", "Total number of failed state store calls"),
        &["operation"]
    ).unwrap();

    /// 单次授权耗时（秒），包含 CAS 重试
    pub static ref AUTHORIZE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "veritoken_authorize_duration_seconds",
            "Authorization latency in seconds"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).unwrap();
}

/// 将所有指标注册到 `registry`
///
/// 同一 registry 重复注册会返回 `AlreadyReg` 错误。
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(DECISIONS_TOTAL.clone()))?;
    registry.register(Box::new(STORE_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(AUTHORIZE_DURATION.clone()))?;
    Ok(())
}

/// 导出 `registry` 中的指标（Prometheus 文本格式）
pub fn export_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub(crate) fn record_decision(status: &str, reason: &str) {
    DECISIONS_TOTAL.with_label_values(&[status, reason]).inc();
}

pub(crate) fn record_store_error(operation: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

/// 授权计时器
pub(crate) struct AuthorizeTimer {
    start: Instant,
}

impl AuthorizeTimer {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub(crate) fn observe(self) {
        AUTHORIZE_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}
