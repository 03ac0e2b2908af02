use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Process-wide counters, exported at `GET /metrics`.
pub struct Metrics {
    registry: Registry,
    inbound_messages: IntCounterVec,
    tool_invocations: IntCounterVec,
    backend_calls: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let inbound_messages = IntCounterVec::new(
            Opts::new(
                "opsangel_inbound_messages_total",
                "Webhook messages received, by message type",
            ),
            &["kind"],
        )?;
        let tool_invocations = IntCounterVec::new(
            Opts::new(
                "opsangel_tool_invocations_total",
                "Commands dispatched to a tool",
            ),
            &["tool"],
        )?;
        let backend_calls = IntCounterVec::new(
            Opts::new(
                "opsangel_backend_calls_total",
                "Calls to the backing REST API, by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        registry.register(Box::new(inbound_messages.clone()))?;
        registry.register(Box::new(tool_invocations.clone()))?;
        registry.register(Box::new(backend_calls.clone()))?;

        Ok(Self {
            registry,
            inbound_messages,
            tool_invocations,
            backend_calls,
        })
    }

    pub fn record_inbound(&self, kind: &str) {
        self.inbound_messages.with_label_values(&[kind]).inc();
    }

    pub fn record_tool(&self, tool: &str) {
        self.tool_invocations.with_label_values(&[tool]).inc();
    }

    pub fn record_backend_call(&self, endpoint: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.backend_calls
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("failed to encode metrics: {err}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_output() {
        let metrics = Metrics::new().unwrap();
        metrics.record_inbound("text");
        metrics.record_inbound("text");
        metrics.record_tool("google");
        metrics.record_backend_call("search", false);

        let rendered = metrics.render();
        assert!(rendered.contains("opsangel_inbound_messages_total{kind=\"text\"} 2"));
        assert!(rendered.contains("opsangel_tool_invocations_total{tool=\"google\"} 1"));
        assert!(rendered.contains("endpoint=\"search\""));
        assert!(rendered.contains("outcome=\"error\""));
    }

    #[test]
    fn separate_instances_do_not_share_counters() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_tool("map");
        assert!(!b.render().contains("tool=\"map\""));
    }
}
