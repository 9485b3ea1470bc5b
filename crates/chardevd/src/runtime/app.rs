use crate::infra::audit::{AuditEventType, AuditLogger};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use chardev_core::{OutputLine, SimulatedLine};
use chardev_io::{Bridge, BridgeConfig, DeviceEndpoint, DeviceEvent};
use std::path::{Path, PathBuf};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind bridge on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn run_from_args() -> Result<(), RuntimeError> {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let audit_logger = config
        .audit_path
        .as_deref()
        .map(init_audit_logger)
        .transpose()?;

    let device_config = config.device_config();
    let line: Arc<dyn OutputLine> = if config.fail_line {
        warn!(line = device_config.line_id, "Simulating an unavailable output line");
        Arc::new(SimulatedLine::unavailable(device_config.line_id))
    } else {
        Arc::new(SimulatedLine::new(device_config.line_id))
    };

    let mut endpoint = DeviceEndpoint::new(&device_config, line);
    if let Some(logger) = &audit_logger {
        let logger = Arc::clone(logger);
        endpoint = endpoint.with_events(move |event| {
            if let Err(e) = logger.log_device_event(event) {
                warn!(error = %e, "Failed to write audit entry");
            }
        });
    }
    let endpoint = Arc::new(endpoint);

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "capacity": device_config.capacity,
                "line_id": device_config.line_id,
                "bridge_enabled": config.bridge_enabled,
                "metrics_enabled": metrics_enabled,
            }),
        );
    }

    if let Some(ref logger) = audit_logger {
        record_startup_faults(&endpoint, logger);
    }

    info!(
        capacity = device_config.capacity,
        line = device_config.line_id,
        min_half_period_us = device_config.actuation.min_half_period.as_micros() as u64,
        "Character device ready"
    );

    if let Some(frequency_hz) = config.initial_frequency {
        if let Err(e) = endpoint.request_frequency(frequency_hz) {
            warn!(frequency_hz, error = %e, "Initial frequency rejected");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let updater_handle =
        telemetry::start_metrics_updater(Arc::clone(&endpoint), Arc::clone(&stop));

    let bridge_handle = if config.bridge_enabled {
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            ..Default::default()
        };
        let bridge = Bridge::bind(bridge_config).map_err(|source| RuntimeError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;
        let endpoint_bridge = Arc::clone(&endpoint);
        let stop_bridge = Arc::clone(&stop);
        info!(addr = %config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || bridge.run(endpoint_bridge, stop_bridge)))
    } else {
        info!("Bridge disabled");
        None
    };

    info!("chardevd running");

    let Some(seconds) = config.run_seconds else {
        if let Some(handle) = bridge_handle {
            let _ = handle.join();
        }
        let _ = updater_handle.join();
        return Ok(());
    };

    info!(seconds, "Running for limited duration");
    thread::sleep(Duration::from_secs(seconds));
    stop.store(true, std::sync::atomic::Ordering::Relaxed);

    if let Some(handle) = bridge_handle {
        let _ = handle.join();
    }
    let _ = updater_handle.join();

    endpoint.shutdown();
    let status = endpoint.status();
    info!(
        used_length = status.used_length,
        frequency_hz = status.frequency_hz,
        tasks_started = status.actuation.tasks_started,
        toggles = status.actuation.toggles,
        overruns = status.actuation.overruns,
        max_jitter_us = status.actuation.max_jitter_us,
        "Run complete"
    );

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            AuditEventType::SystemShutdown,
            serde_json::json!({
                "used_length": status.used_length,
                "tasks_started": status.actuation.tasks_started,
                "toggles": status.actuation.toggles,
            }),
        );
    }

    Ok(())
}

/// Line acquisition happens while the endpoint is built, before any event
/// sink can observe it, so a failed line is recorded here.
fn record_startup_faults(endpoint: &DeviceEndpoint, logger: &AuditLogger) {
    let status = endpoint.status();
    if !status.actuator_failed {
        return;
    }
    let event = DeviceEvent::ActuatorUnavailable {
        line_id: status.line_id,
    };
    if let Err(e) = logger.log_device_event(&event) {
        warn!(error = %e, "Failed to write audit entry");
    }
}

fn init_audit_logger(path: &Path) -> Result<Arc<AuditLogger>, RuntimeError> {
    match AuditLogger::new(path) {
        Ok(logger) => {
            info!(path = %path.display(), "Audit logging enabled");
            Ok(Arc::new(logger))
        }
        Err(source) => Err(RuntimeError::Audit {
            path: path.to_path_buf(),
            source,
        }),
    }
}
