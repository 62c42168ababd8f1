use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct CourtMetrics {
    model_calls: Counter<u64>,
    tool_calls: Counter<u64>,
    loop_iterations: Counter<u64>,
}

static METRICS: OnceCell<CourtMetrics> = OnceCell::new();

fn handles() -> &'static CourtMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("histcourt");
        CourtMetrics {
            model_calls: meter
                .u64_counter("model_calls_total")
                .with_description("Model responses received, by agent")
                .init(),
            tool_calls: meter
                .u64_counter("tool_calls_total")
                .with_description("Tool invocations, by agent and tool")
                .init(),
            loop_iterations: meter
                .u64_counter("loop_iterations_total")
                .with_description("Loop agent iterations started")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("HISTCOURT_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "HISTCOURT_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export court metrics."
        );
    }
    Ok(())
}

pub(crate) fn record_model_call(agent: &str) {
    handles()
        .model_calls
        .add(1, &[KeyValue::new("agent", agent.to_string())]);
}

pub(crate) fn record_tool_call(agent: &str, tool: &str) {
    handles().tool_calls.add(
        1,
        &[
            KeyValue::new("agent", agent.to_string()),
            KeyValue::new("tool", tool.to_string()),
        ],
    );
}

pub(crate) fn record_loop_iteration(agent: &str) {
    handles()
        .loop_iterations
        .add(1, &[KeyValue::new("agent", agent.to_string())]);
}
