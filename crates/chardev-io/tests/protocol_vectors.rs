use chardev_io::protocol::{Request, Response, StatusMsg, WireWhence};

#[test]
fn parses_open_message() {
    let raw = r#"{
        "type":"open",
        "minor":0,
        "truncate":true,
        "append":false
    }"#;

    let msg = Request::parse(raw).expect("open should parse");
    match msg {
        Request::Open {
            minor,
            truncate,
            append,
            flags,
        } => {
            assert_eq!(minor, 0);
            assert!(truncate);
            assert!(!append);
            assert_eq!(flags, 0);
        }
        _ => panic!("expected open message"),
    }
}

#[test]
fn parses_seek_message() {
    let raw = r#"{"type":"seek","handle":4,"offset":-2,"whence":"current"}"#;

    let msg = Request::parse(raw).expect("seek should parse");
    assert_eq!(
        msg,
        Request::Seek {
            handle: 4,
            offset: -2,
            whence: WireWhence::Current
        }
    );
}

#[test]
fn parses_status_message() {
    assert_eq!(Request::parse(r#"{"type":"status"}"#).unwrap(), Request::Status);
}

#[test]
fn rejects_missing_fields() {
    assert!(Request::parse(r#"{"type":"read","handle":1}"#).is_err());
    assert!(Request::parse(r#"{"type":"seek","handle":1,"offset":0,"whence":"middle"}"#).is_err());
    assert!(Request::parse("not json").is_err());
}

#[test]
fn encodes_status_response() {
    let resp = Response::Status(StatusMsg {
        capacity: 50,
        used_length: 10,
        sessions: 2,
        frequency_hz: 20,
        actuation_state: "toggling".to_string(),
        actuator_failed: false,
        live_tasks: 1,
        toggles: 99,
    });
    let value: serde_json::Value = serde_json::from_slice(&resp.to_line()).unwrap();
    assert_eq!(value["type"], "status");
    assert_eq!(value["used_length"], 10);
    assert_eq!(value["actuation_state"], "toggling");
}

#[test]
fn encodes_data_response() {
    let resp = Response::Data {
        count: 5,
        data: "aGVsbG8=".to_string(),
    };
    let value: serde_json::Value = serde_json::from_slice(&resp.to_line()).unwrap();
    assert_eq!(value["type"], "data");
    assert_eq!(value["count"], 5);
    assert_eq!(value["data"], "aGVsbG8=");
}
