use chardev_core::DeviceConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub capacity: usize,
    pub line_id: u32,
    pub fail_line: bool,
    pub initial_frequency: Option<u32>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let device = DeviceConfig::default();
        Self {
            show_help: false,
            run_seconds: None,
            capacity: device.capacity,
            line_id: device.line_id,
            fail_line: false,
            initial_frequency: None,
            bind_addr: "127.0.0.1:7100".to_string(),
            bridge_enabled: true,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--capacity" => {
                    if i + 1 < args.len() {
                        if let Some(capacity) =
                            args[i + 1].parse::<usize>().ok().filter(|c| *c > 0)
                        {
                            cfg.capacity = capacity;
                        }
                        i += 1;
                    }
                }
                "--line" => {
                    if i + 1 < args.len() {
                        cfg.line_id = args[i + 1].parse().unwrap_or(cfg.line_id);
                        i += 1;
                    }
                }
                "--fail-line" => {
                    cfg.fail_line = true;
                }
                "--frequency" => {
                    if i + 1 < args.len() {
                        cfg.initial_frequency = args[i + 1].parse::<u32>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            capacity: self.capacity,
            line_id: self.line_id,
            ..DeviceConfig::default()
        }
    }

    pub fn print_help() {
        println!(
            r#"chardevd - In-memory character device with a frequency-driven output line

USAGE:
    chardevd [OPTIONS]

OPTIONS:
    --capacity <BYTES>      Buffer capacity in bytes [default: 4096]
    --line <ID>             Output line driven by the frequency device [default: 16]
    --fail-line             Simulate an output line that cannot be acquired
    --frequency <HZ>        Start toggling the line at this frequency
    --bind <ADDR>           Bridge TCP bind address [default: 127.0.0.1:7100]
    --no-bridge             Disable the TCP bridge
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write JSON logs to a daily-rolling file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9100)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

MINORS:
    0                       Buffer, forward reads
    1                       Buffer, byte-reversed reads
    2                       Actuation frequency as decimal text

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,chardev_core=trace)

EXAMPLES:
    # Short test run
    chardevd --run-seconds 10 --frequency 5

    # With metrics and an audit trail
    chardevd --metrics-addr 0.0.0.0:9100 --audit-log /var/log/chardevd/audit.jsonl
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("chardevd")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_match_device_defaults() {
        let cfg = RuntimeConfig::from_args(&args(&[]));
        assert_eq!(cfg.capacity, 4096);
        assert_eq!(cfg.line_id, 16);
        assert!(cfg.bridge_enabled);
        assert!(cfg.run_seconds.is_none());
    }

    #[test]
    fn parses_device_options() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--capacity",
            "50",
            "--line",
            "21",
            "--frequency",
            "10",
            "--fail-line",
            "--no-bridge",
            "--audit-log",
            "/tmp/audit.jsonl",
        ]));
        assert_eq!(cfg.capacity, 50);
        assert_eq!(cfg.line_id, 21);
        assert_eq!(cfg.initial_frequency, Some(10));
        assert!(cfg.fail_line);
        assert!(!cfg.bridge_enabled);
        assert_eq!(cfg.device_config().capacity, 50);
        assert_eq!(cfg.audit_path, Some(PathBuf::from("/tmp/audit.jsonl")));
    }

    #[test]
    fn zero_capacity_is_ignored() {
        let cfg = RuntimeConfig::from_args(&args(&["--capacity", "0"]));
        assert_eq!(cfg.capacity, 4096);
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--no-bridge"]));
        assert!(cfg.show_help);
        assert!(cfg.bridge_enabled);
    }
}
