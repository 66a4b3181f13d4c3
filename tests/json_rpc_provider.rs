//! JSON-RPC provider against a mock node.
//!
//! The mock node is a small axum server on a random port that answers each
//! method from a script and records every call it receives.

use alloy_primitives::{Address, B256, U256};
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use dapp_wallet::config::{AppConfig, ProviderConfig};
use dapp_wallet::provider::{
    DeploymentTransaction, JsonRpcProvider, SubmissionFailure, SubmissionOutcome, WalletProvider,
};
use dapp_wallet::{App, AppError, SessionState};

const POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct MockNode {
    /// Method name to `{"result": ..}` or `{"error": ..}` reply.
    replies: Mutex<HashMap<String, Value>>,
    /// Receipt polls answered with `null` before the receipt is returned.
    pending_polls: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockNode {
    fn reply(&self, method: &str, reply: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
    }

    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

async fn rpc(State(node): State<Arc<MockNode>>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    node.calls
        .lock()
        .unwrap()
        .push((method.clone(), request["params"].clone()));

    let mut body = json!({ "jsonrpc": "2.0", "id": request["id"].clone() });
    if method == "eth_getTransactionReceipt" {
        let waiting = node
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if waiting {
            body["result"] = Value::Null;
            return Json(body);
        }
    }

    match node.replies.lock().unwrap().get(&method) {
        Some(Value::Object(reply)) => {
            for (key, value) in reply {
                body[key] = value.clone();
            }
        }
        _ => {
            body["error"] = json!({ "code": -32601, "message": format!("method {} not found", method) });
        }
    }
    Json(body)
}

/// Start the mock node on a random port.
async fn start_node() -> (Arc<MockNode>, String) {
    let node = Arc::new(MockNode::default());
    let app = Router::new().route("/", post(rpc)).with_state(node.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (node, format!("http://{}", addr))
}

fn deployment() -> DeploymentTransaction {
    DeploymentTransaction {
        from: Address::repeat_byte(0xa1),
        data: vec![0x60, 0x80, 0x60, 0x40].into(),
        gas: 2_000_000,
    }
}

#[tokio::test]
async fn request_accounts_returns_granted_addresses() {
    let (node, url) = start_node().await;
    let alice = Address::repeat_byte(0xa1);
    node.reply("eth_requestAccounts", json!({ "result": [alice] }));

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    assert_eq!(provider.request_accounts().await.unwrap(), vec![alice]);
}

#[tokio::test]
async fn user_rejection_is_recognised() {
    let (node, url) = start_node().await;
    node.reply(
        "eth_requestAccounts",
        json!({ "error": { "code": 4001, "message": "User rejected the request." } }),
    );

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let err = provider.request_accounts().await.unwrap_err();
    assert!(err.is_user_rejection());
    assert_eq!(err.reason(), "user rejected");
}

#[tokio::test]
async fn balance_is_read_from_hex_quantity() {
    let (node, url) = start_node().await;
    node.reply("eth_getBalance", json!({ "result": "0xde0b6b3a7640000" }));

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let account = Address::repeat_byte(0xa1);
    let wei = provider.get_balance(account).await.unwrap();
    assert_eq!(wei, U256::from(1_000_000_000_000_000_000u64));

    let params = &node.calls_to("eth_getBalance")[0];
    assert_eq!(params[1], "latest");
}

#[tokio::test]
async fn revoke_tolerates_unsupported_method() {
    let (node, url) = start_node().await;
    let provider = JsonRpcProvider::new(&url, POLL).unwrap();

    // No scripted reply: the node answers -32601.
    provider.revoke_permissions().await.unwrap();
    let params = &node.calls_to("wallet_revokePermissions")[0];
    assert!(params[0].get("eth_accounts").is_some());

    node.reply(
        "wallet_revokePermissions",
        json!({ "error": { "code": -32603, "message": "internal error" } }),
    );
    let err = provider.revoke_permissions().await.unwrap_err();
    assert!(matches!(err, AppError::Rpc { code: -32603, .. }));
}

#[tokio::test]
async fn submission_polls_until_receipt_arrives() {
    let (node, url) = start_node().await;
    let hash = B256::repeat_byte(0x77);
    let contract = Address::repeat_byte(0xcc);
    node.reply("eth_sendTransaction", json!({ "result": hash }));
    node.reply(
        "eth_getTransactionReceipt",
        json!({ "result": {
            "transactionHash": hash,
            "contractAddress": contract,
            "status": "0x1",
            "blockNumber": "0x2a"
        } }),
    );
    node.pending_polls.store(2, Ordering::SeqCst);

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        provider.submit_transaction(deployment()).outcome(),
    )
    .await
    .unwrap();

    match outcome {
        SubmissionOutcome::Confirmed(receipt) => {
            assert_eq!(receipt.transaction_hash, hash);
            assert_eq!(receipt.contract_address, contract);
            assert_eq!(receipt.block_number, Some(42));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let sent = &node.calls_to("eth_sendTransaction")[0][0];
    assert_eq!(sent["data"], "0x60806040");
    assert_eq!(sent["gas"], "0x1e8480");
    assert!(sent.get("to").is_none());
    assert_eq!(node.calls_to("eth_getTransactionReceipt").len(), 3);
}

#[tokio::test]
async fn rejected_submission_resolves_as_rejected() {
    let (node, url) = start_node().await;
    node.reply(
        "eth_sendTransaction",
        json!({ "error": { "code": 4001, "message": "User denied transaction signature." } }),
    );

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let outcome = provider.submit_transaction(deployment()).outcome().await;
    assert_eq!(outcome, SubmissionOutcome::Failed(SubmissionFailure::Rejected));
    assert!(node.calls_to("eth_getTransactionReceipt").is_empty());
}

#[tokio::test]
async fn dropping_the_handle_stops_receipt_polling() {
    let (node, url) = start_node().await;
    node.reply("eth_sendTransaction", json!({ "result": B256::repeat_byte(0x02) }));
    node.pending_polls.store(usize::MAX, Ordering::SeqCst);

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let handle = provider.submit_transaction(deployment());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!node.calls_to("eth_getTransactionReceipt").is_empty());

    drop(handle);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = node.calls_to("eth_getTransactionReceipt").len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(node.calls_to("eth_getTransactionReceipt").len(), settled);
}

#[tokio::test]
async fn repeated_receipt_errors_drop_the_transaction() {
    let (node, url) = start_node().await;
    node.reply("eth_sendTransaction", json!({ "result": B256::repeat_byte(0x01) }));
    node.reply(
        "eth_getTransactionReceipt",
        json!({ "error": { "code": -32000, "message": "unknown block" } }),
    );

    let provider = JsonRpcProvider::new(&url, POLL).unwrap();
    let outcome = provider.submit_transaction(deployment()).outcome().await;
    assert_eq!(outcome, SubmissionOutcome::Failed(SubmissionFailure::Dropped));
    assert_eq!(node.calls_to("eth_getTransactionReceipt").len(), 5);
}

#[tokio::test]
async fn http_failure_is_an_rpc_error() {
    let app = Router::new().route(
        "/",
        post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let provider = JsonRpcProvider::new(&format!("http://{}", addr), POLL).unwrap();
    let err = provider.request_accounts().await.unwrap_err();
    assert!(matches!(err, AppError::Rpc { code: 502, .. }));
}

#[tokio::test]
async fn bootstrap_against_node_connects_and_reads_balance() {
    let (node, url) = start_node().await;
    let alice = Address::repeat_byte(0xa1);
    node.reply("eth_requestAccounts", json!({ "result": [alice] }));
    node.reply("eth_getBalance", json!({ "result": "0x14d1120d7b160000" }));

    let config = AppConfig {
        provider: ProviderConfig {
            url: Some(url),
            receipt_poll_ms: 10,
        },
        ..AppConfig::default()
    };
    let app = App::bootstrap(&config);
    assert!(app.is_available());

    assert_eq!(app.connect().await.unwrap(), alice);
    let snapshot = app.view().snapshot();
    assert_eq!(snapshot.session_state, SessionState::Connected);
    assert_eq!(snapshot.balance.unwrap().value_ether, "1.5");

    app.disconnect().await.unwrap();
    assert_eq!(app.session().state(), SessionState::Disconnected);
}
