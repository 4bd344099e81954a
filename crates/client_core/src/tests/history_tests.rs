use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use flashloan_shared::domain::Amount;
use serde_json::json;
use tokio::net::TcpListener;

use crate::backend::HttpFlashLoanBackend;

const ASSET: &str = "0x1111111111111111111111111111111111111111";
const ALICE: &str = "0x2222222222222222222222222222222222222222";
const BOB: &str = "0x3333333333333333333333333333333333333333";
const WALLET: &str = "0x5555555555555555555555555555555555555555";

fn address(raw: &str) -> Address {
    raw.parse().expect("address")
}

fn record(id: &str, success: bool) -> BatchRecord {
    BatchRecord {
        batch_id: BatchId(id.into()),
        asset: address(ASSET),
        total_amount: Amount::parse_decimal("4").expect("amount"),
        premium: Amount::parse_decimal("0.00000001").expect("amount"),
        recipients: vec![address(ALICE), address(BOB)],
        allocations: vec![Amount::parse_decimal("1.5").expect("amount")],
        initiator: address(WALLET),
        timestamp: 1_700_000_000,
        success,
        failure_reason: (!success).then(|| "receiver reverted".to_string()),
        tx_hash: success.then(|| "0xfeed".to_string()),
    }
}

#[test]
fn collapsed_rows_format_exact_amounts() {
    let rows = render_rows(&[record("b-1", true)], &HashSet::new(), None);
    let row = &rows[0];
    assert_eq!(row.status, BatchStatus::Succeeded);
    assert_eq!(row.asset, "0x1111...1111");
    assert_eq!(row.total_amount, "4.0");
    assert_eq!(row.premium, "0.00000001");
    assert_eq!(row.recipient_count, 2);
    assert_eq!(row.executed_at, "2023-11-14 22:13:20 UTC");
    assert_eq!(row.tx_hash.as_deref(), Some("0xfeed"));
    assert!(row.tx_link.is_none());
    assert!(row.allocations.is_none());
}

#[test]
fn expanded_rows_list_allocations_and_links() {
    let expanded = HashSet::from([BatchId("b-1".into())]);
    let rows = render_rows(
        &[record("b-1", true), record("b-2", false)],
        &expanded,
        Some("https://scan.example/tx/{tx}"),
    );

    let lines = rows[0].allocations.as_ref().expect("expanded");
    assert_eq!(lines[0].recipient, ALICE);
    assert_eq!(lines[0].amount, "1.5");
    assert_eq!(lines[1].amount, "-", "missing allocation is shown as a dash");
    assert_eq!(rows[0].tx_link.as_deref(), Some("https://scan.example/tx/0xfeed"));

    assert!(rows[1].allocations.is_none());
    assert_eq!(
        rows[1].status,
        BatchStatus::Failed(Some("receiver reverted".into()))
    );
    assert!(rows[1].tx_link.is_none());
}

#[test]
fn explorer_base_without_placeholder_appends_hash() {
    assert_eq!(
        tx_link("https://scan.example/tx", "0xabc").as_deref(),
        Some("https://scan.example/tx/0xabc")
    );
    assert_eq!(tx_link("not a url", "0xabc"), None);
}

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

async fn handle_history(State(hits): State<Hits>) -> impl IntoResponse {
    let n = hits.0.fetch_add(1, Ordering::SeqCst);
    if n == 1 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "indexer is catching up" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": [{
                "batchId": format!("b-{n}"),
                "asset": ASSET,
                "totalAmount": "4000000000000000000",
                "premium": "3600000000000000",
                "recipients": [ALICE],
                "allocations": ["4000000000000000000"],
                "initiator": WALLET,
                "timestamp": 1700000000,
                "success": true
            }]
        })),
    )
}

async fn spawn_history_server(hits: Hits) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/flashloans/multi/user/:address", get(handle_history))
        .with_state(hits);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn refresh_toggle_and_failed_refresh_keep_rows() {
    let hits = Hits::default();
    let url = spawn_history_server(hits.clone()).await;
    let backend = Arc::new(HttpFlashLoanBackend::new(&url, None).expect("backend"));
    let store = BatchStore::new(backend);
    let mut viewer = HistoryViewer::new(Arc::clone(&store), address(WALLET));

    assert!(viewer.refresh().await);
    let rows = viewer.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].batch_id, BatchId("b-0".into()));

    assert!(viewer.toggle(&rows[0].batch_id));
    assert!(viewer.rows().await[0].allocations.is_some());
    assert!(!viewer.toggle(&rows[0].batch_id));

    assert!(!viewer.refresh().await);
    assert_eq!(viewer.rows().await, rows);
    assert_eq!(
        store.last_error().await.as_deref(),
        Some("indexer is catching up")
    );
}

#[tokio::test]
async fn poller_fetches_immediately_and_on_interval() {
    let hits = Hits::default();
    let url = spawn_history_server(hits.clone()).await;
    let backend = Arc::new(HttpFlashLoanBackend::new(&url, None).expect("backend"));
    let store = BatchStore::new(backend);
    let viewer = HistoryViewer::new(Arc::clone(&store), address(WALLET));

    let poller = viewer.spawn_poller(Duration::from_millis(50));
    tokio::time::timeout(Duration::from_secs(5), async {
        while hits.0.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poller kept fetching");
    poller.abort();

    assert!(!store.user_batches().await.is_empty());
}
