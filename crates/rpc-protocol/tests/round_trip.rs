//! Round-trip tests across the four framed message kinds, for a spread of
//! representable params (spec.md §8: "decode(encode(msg)) == msg").

use rpc_protocol::{decode, error, notification, request, response, Id, Message, RpcError};
use serde_json::json;

#[test]
fn request_round_trip_with_mixed_param_types() {
    let id = Id::Number(42);
    let params = vec![json!("cmd"), json!(1), json!([0, 0]), json!(null)];
    let bytes = request(&id, "publish", &params);
    assert_eq!(
        decode(&bytes).unwrap(),
        Message::Request {
            id,
            method: "publish".to_owned(),
            params,
        }
    );
}

#[test]
fn notification_round_trip_with_no_params() {
    let bytes = notification("subscribe", &[]);
    assert_eq!(
        decode(&bytes).unwrap(),
        Message::Notification {
            method: "subscribe".to_owned(),
            params: vec![],
        }
    );
}

#[test]
fn response_round_trip_with_string_id() {
    let id = Id::Str("locate-prefix-3".to_owned());
    let result = vec![json!(7100), json!("h2")];
    let bytes = response(&id, &result);
    assert_eq!(decode(&bytes).unwrap(), Message::Response { id, result });
}

#[test]
fn error_round_trip_carries_code_and_message() {
    let id = Id::Number(5);
    let err = RpcError::new(-32601, "Method not found");
    let bytes = error(&id, &err);
    assert_eq!(
        decode(&bytes).unwrap(),
        Message::ErrorResponse { id, error: err }
    );
}

#[test]
fn encoded_messages_carry_the_jsonrpc_version_tag() {
    let bytes = notification("publish", &[json!("cmd"), json!("h")]);
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["jsonrpc"], "2.0");
}
