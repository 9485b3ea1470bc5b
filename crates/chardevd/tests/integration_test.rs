use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

struct DaemonProcess {
    child: Child,
    addr: String,
}

impl DaemonProcess {
    fn start(extra: &[&str]) -> Self {
        let bin_path = env!("CARGO_BIN_EXE_chardevd");

        let listener = TcpListener::bind("127.0.0.1:0")
            .expect("Failed to bind ephemeral port for integration test");
        let addr = listener
            .local_addr()
            .expect("Failed to resolve bound address");
        let bind_addr = format!("127.0.0.1:{}", addr.port());
        drop(listener);

        let child = Command::new(bin_path)
            .args(["--bind", &bind_addr])
            .args(extra)
            .spawn()
            .expect("Failed to start chardevd");

        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if TcpStream::connect(&bind_addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }
        // The probe connection above occupied the single client slot briefly.
        thread::sleep(Duration::from_millis(200));

        Self {
            child,
            addr: bind_addr,
        }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(&self.addr).expect("Failed to connect to chardevd");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Client { stream, reader }
    }

    fn wait(mut self, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if let Ok(Some(status)) = self.child.try_wait() {
                return status.success();
            }
            thread::sleep(Duration::from_millis(100));
        }
        false
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn call(&mut self, request: serde_json::Value) -> serde_json::Value {
        writeln!(self.stream, "{}", request).unwrap();
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn open(&mut self, minor: u32, truncate: bool) -> u64 {
        let resp = self.call(serde_json::json!({
            "type": "open", "minor": minor, "truncate": truncate
        }));
        assert_eq!(resp["type"], "opened", "{resp}");
        resp["handle"].as_u64().unwrap()
    }
}

#[test]
fn test_buffer_round_trip_over_bridge() {
    let daemon = DaemonProcess::start(&["--capacity", "50", "--run-seconds", "3"]);
    let mut client = daemon.connect();

    let writer = client.open(0, true);
    let resp = client.call(serde_json::json!({
        "type": "write", "handle": writer, "data": STANDARD.encode("hello")
    }));
    assert_eq!(resp["count"], 5);

    let reader = client.open(1, false);
    let resp = client.call(serde_json::json!({
        "type": "read", "handle": reader, "len": 100
    }));
    assert_eq!(resp["type"], "data");
    assert_eq!(STANDARD.decode(resp["data"].as_str().unwrap()).unwrap(), b"olleh");

    let resp = client.call(serde_json::json!({
        "type": "seek", "handle": reader, "offset": 50, "whence": "start"
    }));
    assert_eq!(resp["type"], "error");
    assert_eq!(resp["errno"], -22);

    drop(client);
    assert!(daemon.wait(Duration::from_secs(10)), "daemon did not exit cleanly");
}

#[test]
fn test_frequency_endpoint_and_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let audit_arg = audit_path.to_str().unwrap();

    let daemon = DaemonProcess::start(&["--run-seconds", "3", "--audit-log", audit_arg]);
    let mut client = daemon.connect();

    let freq = client.open(2, false);
    let resp = client.call(serde_json::json!({
        "type": "write", "handle": freq, "data": STANDARD.encode("20\n")
    }));
    assert_eq!(resp["count"], 3);

    let status = client.call(serde_json::json!({"type": "status"}));
    assert_eq!(status["frequency_hz"], 20);
    assert!(status["live_tasks"].as_u64().unwrap() <= 1);

    let resp = client.call(serde_json::json!({
        "type": "write", "handle": freq, "data": STANDARD.encode("fast")
    }));
    assert_eq!(resp["kind"], "invalid_frequency");

    drop(client);
    assert!(daemon.wait(Duration::from_secs(10)), "daemon did not exit cleanly");

    let events = audit_events(&audit_path);
    assert_eq!(events.first().map(String::as_str), Some("system_start"));
    assert!(events.iter().any(|e| e == "frequency_changed"));
    assert_eq!(events.last().map(String::as_str), Some("system_shutdown"));
}

#[test]
fn test_unavailable_line_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let audit_arg = audit_path.to_str().unwrap();

    let daemon = DaemonProcess::start(&[
        "--fail-line",
        "--frequency",
        "5",
        "--run-seconds",
        "3",
        "--audit-log",
        audit_arg,
    ]);
    let mut client = daemon.connect();

    let freq = client.open(2, false);
    let resp = client.call(serde_json::json!({
        "type": "write", "handle": freq, "data": STANDARD.encode("5")
    }));
    assert_eq!(resp["kind"], "actuator_unavailable");
    assert_eq!(resp["errno"], -1);

    let status = client.call(serde_json::json!({"type": "status"}));
    assert_eq!(status["actuator_failed"], true);
    assert_eq!(status["live_tasks"], 0);

    drop(client);
    assert!(daemon.wait(Duration::from_secs(10)), "daemon did not exit cleanly");

    // One entry at startup, one for --frequency, one for the bridge write.
    let events = audit_events(&audit_path);
    let unavailable = events
        .iter()
        .filter(|e| *e == "actuator_unavailable")
        .count();
    assert_eq!(unavailable, 3, "{events:?}");
}

fn audit_events(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).unwrap();
            entry["event_type"].as_str().unwrap().to_string()
        })
        .collect()
}
