//! Deserialization tests for the wire models.

use std::time::Duration;

use rust_decimal_macros::dec;

use lobsync::LobsyncError;
use lobsync::book::{L3Snapshot, OrderBookL3, Sequence, Side};
use lobsync::models::event::{BookEvent, EventType};
use lobsync::models::token::{ApiResponse, Token};
use lobsync::models::{ControlRequest, InboundFrame, TopicKind};

const SNAPSHOT_JSON: &str = include_str!("fixtures/snapshot.json");
const TOKEN_JSON: &str = include_str!("fixtures/token.json");
const API_ERROR_JSON: &str = include_str!("fixtures/api_error.json");
const LEVEL3_MATCH_JSON: &str = include_str!("fixtures/level3_match.json");

#[test]
fn test_snapshot_response_deserializes() {
    let response: ApiResponse<L3Snapshot> =
        serde_json::from_str(SNAPSHOT_JSON).expect("Failed to deserialize snapshot response");
    let snapshot = response.into_data().expect("snapshot envelope not successful");

    assert_eq!(snapshot.sequence, Sequence(1573503933086));
    assert_eq!(snapshot.asks.len(), 2);
    assert_eq!(snapshot.bids.len(), 2);
    assert_eq!(snapshot.time, 1577936689438);

    let book = OrderBookL3::from_snapshot(&snapshot).expect("snapshot orders should parse");
    assert_eq!(book.len(), 4);
    assert_eq!(book.best_ask().unwrap().price, dec!(0.1917));
    assert_eq!(book.best_bid().unwrap().price, dec!(0.19155));
    assert_eq!(book.best_bid().unwrap().id, "5e0d671a91432f000819d134");
}

#[test]
fn test_api_error_envelope() {
    let response: ApiResponse<L3Snapshot> =
        serde_json::from_str(API_ERROR_JSON).expect("Failed to deserialize error envelope");

    match response.into_data() {
        Err(LobsyncError::Api { code, message }) => {
            assert_eq!(code, "400100");
            assert_eq!(message, "symbol not exists");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[test]
fn test_token_response_deserializes() {
    let response: ApiResponse<Token> =
        serde_json::from_str(TOKEN_JSON).expect("Failed to deserialize token response");
    let token = response.into_data().unwrap();

    let instance = token.instance().unwrap();
    assert_eq!(instance.endpoint, "wss://ws-api-spot.kucoin.com/");
    assert!(instance.encrypt);

    let heartbeat = instance.heartbeat();
    assert_eq!(heartbeat.interval, Duration::from_secs(17));
    assert_eq!(heartbeat.timeout, Duration::from_secs(10));

    let url = token.connect_url(instance).unwrap();
    assert!(url.starts_with("wss://ws-api-spot.kucoin.com/?connectId="));
    assert!(url.contains("&token=2neAiuYvAU61ZDXANAGAsiL4"));
}

#[test]
fn test_token_without_websocket_instance() {
    let token: Token = serde_json::from_value(serde_json::json!({
        "token": "t",
        "instanceServers": [{
            "endpoint": "https://example.com",
            "protocol": "http",
            "pingInterval": 1000,
            "pingTimeout": 1000
        }]
    }))
    .unwrap();

    assert!(matches!(token.instance(), Err(LobsyncError::Protocol(_))));
}

#[test]
fn test_level3_message_frame() {
    let frame = InboundFrame::parse(LEVEL3_MATCH_JSON).expect("Failed to parse frame");
    let InboundFrame::Topic(message) = frame else {
        panic!("expected a topic frame");
    };

    assert_eq!(message.kind, TopicKind::Message);
    assert_eq!(message.topic, "/market/level3:BTC-USDT");
    assert_eq!(message.subject.as_deref(), Some("trade.l3match"));

    let event: BookEvent = serde_json::from_value(message.data).unwrap();
    assert_eq!(event.sequence, Sequence(1545896669147));
    assert_eq!(event.tpe, EventType::Match);
    assert_eq!(event.side, Some(Side::Bid));
    assert_eq!(event.maker_order_id, "5c24c5da03aa673885cd67aa");
    assert_eq!(event.size, "0.011");
    assert!(event.order_id.is_empty());
}

#[test]
fn test_control_frames_classify() {
    let welcome = InboundFrame::parse(r#"{"id":"hQvf8jkno","type":"welcome"}"#).unwrap();
    assert!(matches!(welcome, InboundFrame::Welcome { ref id } if id == "hQvf8jkno"));

    let ack = InboundFrame::parse(r#"{"id":"1545910590801","type":"ack"}"#).unwrap();
    assert!(matches!(ack, InboundFrame::Ack { ref id } if id == "1545910590801"));

    let pong = InboundFrame::parse(r#"{"id":"7","type":"pong"}"#).unwrap();
    assert!(matches!(pong, InboundFrame::Pong { .. }));

    let error =
        InboundFrame::parse(r#"{"id":"1","type":"error","code":404,"data":"topic not found"}"#)
            .unwrap();
    match error {
        InboundFrame::Error { code, message, .. } => {
            assert_eq!(code, 404);
            assert_eq!(message, "topic not found");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[test]
fn test_unexpected_frame_type_is_protocol_error() {
    let err = InboundFrame::parse(r#"{"id":"1","type":"subscribe"}"#).unwrap_err();
    assert!(matches!(err, LobsyncError::Protocol(_)));

    let err = InboundFrame::parse("not json").unwrap_err();
    assert!(matches!(err, LobsyncError::Json(_)));
}

#[test]
fn test_control_request_wire_format() {
    let subscribe = ControlRequest::subscribe(
        "42".into(),
        "/market/level3:BTC-USDT",
        None,
        false,
        true,
    );
    let json = serde_json::to_value(&subscribe).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": "42",
            "type": "subscribe",
            "topic": "/market/level3:BTC-USDT",
            "response": true
        })
    );

    let ping = serde_json::to_value(ControlRequest::ping("43".into())).unwrap();
    assert_eq!(ping, serde_json::json!({"id": "43", "type": "ping"}));

    let open = serde_json::to_value(ControlRequest::open_tunnel("44".into(), "bt1", true)).unwrap();
    assert_eq!(
        open,
        serde_json::json!({"id": "44", "type": "openTunnel", "newTunnelId": "bt1", "response": true})
    );
}

#[test]
fn test_snapshot_serializes_sequence_as_text() {
    let snapshot = L3Snapshot {
        sequence: Sequence(7),
        ..L3Snapshot::default()
    };
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["sequence"], "7");
}
