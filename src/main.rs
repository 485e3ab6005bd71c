use std::sync::Arc;
use std::time::Duration;

use lobsync::LobsyncError;
use lobsync::book::OrderBookL3;
use lobsync::config::fetch_config;
use lobsync::rest::RestClient;
use lobsync::sync::BookSync;
use lobsync::websocket::Session;
use tracing::{debug, info};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), LobsyncError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let exchange = &app_config.exchange;

    let rest = RestClient::new(exchange)?;
    let token = rest.public_token().await?;
    let instance = token.instance()?;
    let url = token.connect_url(instance)?;

    let session = Session::connect(&url, instance.heartbeat(), app_config.session.clone()).await?;

    let book = Arc::new(OrderBookL3::new());
    let sync = Arc::new(BookSync::new(Arc::clone(&book), rest, &exchange.symbol));
    sync.resync().await?;
    session
        .subscribe(&exchange.level3_topic(), None, false, true, Arc::clone(&sync))
        .await?;

    let depth = exchange.depth;
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REPORT_INTERVAL);
        loop {
            ticker.tick().await;
            let l2 = book.to_l2();
            info!(
                sequence = %l2.sequence,
                best_bid = ?l2.best_bid(),
                best_ask = ?l2.best_ask(),
                orders = book.len(),
                "Book"
            );
            let (asks, bids) = l2.top_levels(depth);
            for level in asks.iter().chain(bids.iter()) {
                debug!(%level, "Level");
            }
        }
    });

    let result = session.listen().await;
    reporter.abort();
    session.shutdown().await;
    result
}
