use chardev_io::metrics::{
    init_metrics, serve_metrics, ACTUATION_TOGGLES, LIVE_TASKS, OPEN_SESSIONS,
    TARGET_FREQUENCY_HZ, USED_LENGTH,
};
use chardev_io::DeviceEndpoint;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Mirror endpoint status into the gauges every 200ms until `stop` is set.
pub fn start_metrics_updater(
    endpoint: Arc<DeviceEndpoint>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_toggles = 0u64;
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            let status = endpoint.status();
            USED_LENGTH.set(status.used_length as i64);
            OPEN_SESSIONS.set(status.sessions as i64);
            TARGET_FREQUENCY_HZ.set(status.frequency_hz as f64);
            LIVE_TASKS.set(status.live_tasks as i64);
            if status.actuation.toggles > last_toggles {
                ACTUATION_TOGGLES.inc_by(status.actuation.toggles - last_toggles);
                last_toggles = status.actuation.toggles;
            }

            thread::sleep(Duration::from_millis(200));
        }
    })
}
