//! Real API integration tests against the public KuCoin endpoints.
//!
//! These tests require network access.
//! Run with: `cargo test --features integration-tests`

#![cfg(feature = "integration-tests")]

use std::sync::Arc;
use std::time::Duration;

use lobsync::book::{OrderBookL3, Sequence};
use lobsync::config::{ExchangeConfig, SessionConfig};
use lobsync::rest::RestClient;
use lobsync::sync::BookSync;
use lobsync::websocket::{Session, SessionState};

fn exchange() -> ExchangeConfig {
    ExchangeConfig {
        rest_url: "https://api.kucoin.com".to_string(),
        symbol: "BTC-USDT".to_string(),
        snapshot_path: "/api/v1/market/orderbook/level3".to_string(),
        depth: 10,
    }
}

#[tokio::test]
async fn test_public_token() {
    let rest = RestClient::new(&exchange()).expect("Failed to build client");
    let token = rest.public_token().await.expect("Failed to fetch token");

    let instance = token.instance().expect("No websocket instance");
    assert!(instance.ping_interval > 0);
}

#[tokio::test]
async fn test_connect_and_stream_level3() {
    let config = exchange();
    let rest = RestClient::new(&config).expect("Failed to build client");
    let token = rest.public_token().await.expect("Failed to fetch token");
    let instance = token.instance().expect("No websocket instance");
    let url = token.connect_url(instance).expect("Invalid connect url");

    let session = Arc::new(
        Session::connect(&url, instance.heartbeat(), SessionConfig::default())
            .await
            .expect("Failed to connect"),
    );
    assert_eq!(session.state(), SessionState::Running);

    let book = Arc::new(OrderBookL3::new());
    let sync = Arc::new(BookSync::new(Arc::clone(&book), rest, &config.symbol));
    session
        .subscribe(&config.level3_topic(), None, false, true, Arc::clone(&sync))
        .await
        .expect("Failed to subscribe");

    let listener = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.listen().await }
    });

    // The first event gaps against the empty book and pulls a snapshot.
    let synced = tokio::time::timeout(Duration::from_secs(30), async {
        while book.sequence() == Sequence(0) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    assert!(synced.is_ok(), "book never synchronized");
    assert!(sync.resyncs() >= 1);
    assert!(book.best_bid().is_some());

    session.close();
    assert!(listener.await.expect("listener panicked").is_ok());
}
