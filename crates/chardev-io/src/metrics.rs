//! Prometheus metrics for the character device.
//!
//! Buffer traffic, rejected operations and actuation activity, served over
//! a small HTTP endpoint.

use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Buffer Metrics
// ============================================================================

/// Bytes delivered to readers
pub static BYTES_READ: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("chardev_bytes_read_total", "Bytes delivered to readers").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Bytes stored by writers
pub static BYTES_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter =
        IntCounter::new("chardev_bytes_written_total", "Bytes stored by writers").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Operations rejected, labelled by error kind
pub static OPERATIONS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "chardev_operations_rejected_total",
            "Device operations rejected, by error kind",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Current high-water mark of the buffer
pub static USED_LENGTH: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("chardev_buffer_used_bytes", "Buffer high-water mark in bytes").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Open sessions across all minors
pub static OPEN_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("chardev_open_sessions", "Open sessions across all minors").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Actuation Metrics
// ============================================================================

/// Frequency requests accepted
pub static ACTUATION_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "chardev_actuation_requests_total",
        "Frequency requests accepted by the actuation controller",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Output line toggles performed
pub static ACTUATION_TOGGLES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "chardev_actuation_toggles_total",
        "Output line toggles performed by actuation tasks",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Target frequency in Hz (0 = inactive)
pub static TARGET_FREQUENCY_HZ: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "chardev_actuation_frequency_hz",
        "Target actuation frequency in Hz (0 = inactive)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Live actuation tasks (never more than 1)
pub static LIVE_TASKS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("chardev_actuation_live_tasks", "Live actuation tasks").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "chardev_bridge_connected",
        "Bridge client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    );
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    let _ = request.respond(Response::from_string("Ready"));
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = BYTES_READ.get();
    let _ = BYTES_WRITTEN.get();
    let _ = OPERATIONS_REJECTED.with_label_values(&["out_of_range"]).get();
    let _ = USED_LENGTH.get();
    let _ = OPEN_SESSIONS.get();
    let _ = ACTUATION_REQUESTS.get();
    let _ = ACTUATION_TOGGLES.get();
    let _ = TARGET_FREQUENCY_HZ.get();
    let _ = LIVE_TASKS.get();
    let _ = BRIDGE_CONNECTED.get();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exports_device_metrics() {
        init_metrics();
        BYTES_WRITTEN.inc_by(3);
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "chardev_bytes_written_total"));
        assert!(names.iter().any(|n| n == "chardev_actuation_live_tasks"));
    }
}
