fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::{Value, json};
    use thinghub_protocol::{
        ConvertError, Message, MessageConverter, Operation, PassthroughConverter, Status,
        WotConverter,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_raw(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    fn normalize_value(v: &Value) -> Value {
        match v {
            Value::Number(n) => match n.as_f64() {
                Some(f) => json!(f),
                None => v.clone(),
            },
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(normalize_value).collect()),
            _ => v.clone(),
        }
    }

    /// Decodes a fixture, re-encodes the canonical message and compares the
    /// JSON values (order-independent, float-normalized).
    fn roundtrip(conv: &dyn MessageConverter, name: &str) -> Message {
        let raw = load_raw(name);
        let msg = conv
            .decode(&raw)
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        let encoded = conv
            .encode(&msg)
            .unwrap_or_else(|e| panic!("failed to encode {name}: {e}"));

        let fixture: Value = serde_json::from_slice(&raw).unwrap();
        let reencoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reencoded),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  encoded: {reencoded}"
        );
        msg
    }

    // --- Passthrough ---

    #[test]
    fn passthrough_request() {
        let Message::Request(req) = roundtrip(&PassthroughConverter::new(), "passthrough/request_invokeaction.json") else {
            panic!("expected a request");
        };
        assert_eq!(req.operation, Operation::InvokeAction);
        assert_eq!(req.thing_id, "therm-1");
        assert_eq!(req.name, "setpoint");
        assert_eq!(req.input, json!({"celsius": 21.5}));
        assert_eq!(req.correlation_id, "c-1001");
        assert_eq!(req.sender_id, "consumer-1");
    }

    #[test]
    fn passthrough_responses() {
        let conv = PassthroughConverter::new();
        let Message::Response(ok) = roundtrip(&conv, "passthrough/response_completed.json") else {
            panic!("expected a response");
        };
        assert_eq!(ok.status, Status::Completed);
        assert_eq!(ok.output, json!(21.5));
        assert!(!ok.is_error());

        let Message::Response(failed) = roundtrip(&conv, "passthrough/response_failed.json") else {
            panic!("expected a response");
        };
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.error, "no affordance 'reboot'");
        assert_eq!(failed.output, Value::Null);
    }

    #[test]
    fn passthrough_notification() {
        let Message::Notification(n) = roundtrip(&PassthroughConverter::new(), "passthrough/notification_event.json") else {
            panic!("expected a notification");
        };
        assert_eq!(n.operation, Operation::PublishEvent);
        assert_eq!(n.name, "alarm");
        assert_eq!(n.data, json!("overheat"));
    }

    // --- WoT WebSocket sub-protocol ---

    #[test]
    fn wot_invoke_action() {
        let Message::Request(req) = roundtrip(&WotConverter::new(), "wot/invoke_action.json") else {
            panic!("expected a request");
        };
        assert_eq!(req.operation, Operation::InvokeAction);
        assert_eq!(req.name, "setpoint");
        assert_eq!(req.input, json!({"celsius": 19}));
        assert_eq!(req.created, "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn wot_action_status() {
        let Message::Response(resp) = roundtrip(&WotConverter::new(), "wot/action_status.json") else {
            panic!("expected a response");
        };
        assert_eq!(resp.operation, Operation::InvokeAction);
        assert_eq!(resp.status, Status::Completed);
        assert_eq!(resp.correlation_id, "c-2001");
        assert_eq!(resp.output, json!({"accepted": true}));
        assert_eq!(resp.updated, "2024-05-01T10:00:01.000Z");
    }

    #[test]
    fn wot_action_status_without_operation_answers_an_action() {
        let msg = WotConverter::new()
            .decode(&load_raw("wot/action_status_foreign.json"))
            .unwrap();
        let Message::Response(resp) = msg else {
            panic!("expected a response");
        };
        assert_eq!(resp.operation, Operation::InvokeAction);
        assert_eq!(resp.status, Status::Running);
        assert_eq!(resp.name, "toggle");
    }

    #[test]
    fn wot_pong() {
        let Message::Response(resp) = roundtrip(&WotConverter::new(), "wot/pong.json") else {
            panic!("expected a response");
        };
        assert_eq!(resp.operation, Operation::Ping);
        assert_eq!(resp.status, Status::Completed);
        assert_eq!(resp.output, json!("pong"));
    }

    #[test]
    fn wot_property_reading_is_a_notification() {
        let Message::Notification(n) = roundtrip(&WotConverter::new(), "wot/property_reading.json") else {
            panic!("expected a notification");
        };
        assert_eq!(n.operation, Operation::UpdateProperty);
        assert_eq!(n.name, "temperature");
        assert_eq!(n.data, json!(22.25));
    }

    #[test]
    fn wot_subscription_and_td_requests() {
        let conv = WotConverter::new();
        let Message::Request(req) = roundtrip(&conv, "wot/observe_all_properties.json") else {
            panic!("expected a request");
        };
        assert_eq!(req.operation, Operation::ObserveAllProperties);
        assert!(req.name.is_empty());

        let Message::Request(req) = roundtrip(&conv, "wot/read_td.json") else {
            panic!("expected a request");
        };
        assert_eq!(req.operation, Operation::ReadTD);
        assert_eq!(req.correlation_id, "c-2005");
    }

    #[test]
    fn wot_update_td_without_correlation_is_a_notification() {
        let Message::Notification(n) = roundtrip(&WotConverter::new(), "wot/update_td.json") else {
            panic!("expected a notification");
        };
        assert_eq!(n.operation, Operation::UpdateTD);
        assert_eq!(n.data["title"], "Thermostat");
    }

    #[test]
    fn wot_error_decodes_to_failed_response() {
        let msg = WotConverter::new().decode(&load_raw("wot/error.json")).unwrap();
        let Message::Response(resp) = msg else {
            panic!("expected a response");
        };
        assert_eq!(resp.status, Status::Failed);
        assert_eq!(resp.error, "thing is offline");
        assert_eq!(resp.output, json!("agent-1 has no open connection"));
        assert_eq!(resp.correlation_id, "c-2006");
    }

    #[test]
    fn wot_unknown_type_is_rejected() {
        let err = WotConverter::new()
            .decode(&load_raw("wot/unknown_type.json"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnknownMessageType(ref t) if t == "teleport"));
    }

    #[test]
    fn passthrough_rejects_wot_frames() {
        assert!(
            PassthroughConverter::new()
                .decode(&load_raw("wot/invoke_action.json"))
                .is_err()
        );
    }
}
