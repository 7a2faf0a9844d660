//! Mock CMQ gateway answering every action with plausible JSON.
//!
//! Sent messages are kept in memory per queue so send, receive and delete
//! round trips behave like the real service.

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use super::config::MockServerConfig;
use crate::signer::{SignMethod, Signer};

pub const CODE_INVALID_PARAMETER: i64 = 4000;
pub const CODE_AUTH_FAILED: i64 = 4100;
pub const CODE_INTERNAL: i64 = 6000;
pub const CODE_NO_MESSAGE: i64 = 7000;

type Params = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct StoredMessage {
    queue: String,
    msg_id: String,
    body: String,
    enqueue_time: i64,
    first_dequeue_time: i64,
    dequeue_count: i64,
}

struct MockState {
    config: MockServerConfig,
    next_id: AtomicU64,
    queues: Mutex<HashMap<String, VecDeque<StoredMessage>>>,
    /// Received but not yet deleted, by receipt handle
    inflight: Mutex<HashMap<String, StoredMessage>>,
}

impl MockState {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, VecDeque<StoredMessage>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, StoredMessage>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, queue: &str, body: &str) -> String {
        let msg_id = self.next_id().to_string();
        let message = StoredMessage {
            queue: queue.to_string(),
            msg_id: msg_id.clone(),
            body: body.to_string(),
            enqueue_time: chrono::Utc::now().timestamp(),
            first_dequeue_time: 0,
            dequeue_count: 0,
        };
        self.queues()
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        msg_id
    }

    fn dequeue(&self, queue: &str, max: usize) -> Vec<(String, StoredMessage)> {
        let taken: Vec<StoredMessage> = {
            let mut queues = self.queues();
            match queues.get_mut(queue) {
                Some(q) => {
                    let n = max.min(q.len());
                    q.drain(..n).collect()
                }
                None => Vec::new(),
            }
        };

        let now = chrono::Utc::now().timestamp();
        let mut inflight = self.inflight();
        taken
            .into_iter()
            .map(|mut m| {
                m.dequeue_count += 1;
                if m.first_dequeue_time == 0 {
                    m.first_dequeue_time = now;
                }
                let handle = format!("{}:{}", m.msg_id, self.next_id());
                inflight.insert(handle.clone(), m.clone());
                (handle, m)
            })
            .collect()
    }

    fn ack(&self, queue: &str, handle: &str) -> bool {
        let mut inflight = self.inflight();
        match inflight.get(handle) {
            Some(m) if m.queue == queue => {
                inflight.remove(handle);
                true
            }
            _ => false,
        }
    }
}

/// Mock CMQ gateway for tests and standalone perf runs
pub struct MockCmqServer {
    config: MockServerConfig,
    state: Option<Arc<MockState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockCmqServer {
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            state: None,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock server and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let state = Arc::new(MockState {
            config: self.config.clone(),
            next_id: AtomicU64::new(0),
            queues: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        });
        self.state = Some(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .fallback(handle_action)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tracing::debug!(port, "Mock CMQ server started");
        Ok(port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint URI, with the root path so signatures cover "/"
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Messages waiting in a queue
    pub fn pending(&self, queue: &str) -> usize {
        self.state
            .as_ref()
            .and_then(|s| s.queues().get(queue).map(VecDeque::len))
            .unwrap_or(0)
    }

    /// Messages received but not yet deleted
    pub fn inflight(&self) -> usize {
        self.state.as_ref().map(|s| s.inflight().len()).unwrap_or(0)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockCmqServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_action(
    State(state): State<Arc<MockState>>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    // POST bodies arrive unescaped; GET queries were escaped by the URL layer
    let params = if method == Method::GET {
        parse_params(query.as_deref().unwrap_or_default(), true)
    } else {
        parse_params(&body, false)
    };

    if state.config.latency_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(state.config.latency_ms)).await;
    }

    let request_id = format!("mock-{}", state.next_id());
    let client_id: u64 = params
        .get("clientRequestId")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let reply = |code: i64, message: &str, extra: Value| {
        let mut body = json!({
            "code": code,
            "message": message,
            "requestId": request_id,
            "clientRequestId": client_id,
        });
        if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
            body.extend(extra);
        }
        body
    };

    if state.config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < state.config.error_rate {
        let body = reply(CODE_INTERNAL, "simulated error", json!({}));
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }

    if let Some(key) = &state.config.secret_key {
        if let Err(reason) = verify_signature(key, &method, &headers, &uri, &params) {
            tracing::debug!(reason = %reason, "Mock rejected signature");
            return Json(reply(CODE_AUTH_FAILED, &reason, json!({}))).into_response();
        }
    }

    let body = match dispatch(&state, &headers, &params) {
        Ok(extra) => reply(0, "", extra),
        Err((code, message)) => reply(code, &message, json!({})),
    };
    Json(body).into_response()
}

type ActionResult = Result<Value, (i64, String)>;

/// Split `k=v&k=v` on the first `=` of each pair
fn parse_params(raw: &str, decode: bool) -> Params {
    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            if decode {
                (
                    percent_decode_str(k).decode_utf8_lossy().into_owned(),
                    percent_decode_str(v).decode_utf8_lossy().into_owned(),
                )
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect()
}

fn required<'a>(params: &'a Params, key: &str) -> Result<&'a str, (i64, String)> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (CODE_INVALID_PARAMETER, format!("missing {}", key)))
}

fn indexed<'a>(params: &'a Params, prefix: &str) -> Vec<&'a str> {
    (0..)
        .map_while(|i| params.get(&format!("{}.{}", prefix, i)).map(String::as_str))
        .collect()
}

fn dispatch(state: &MockState, headers: &HeaderMap, params: &Params) -> ActionResult {
    match required(params, "Action")? {
        "QueryQueueRoute" | "QueryTopicRoute" => {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("127.0.0.1");
            Ok(json!({ "addr": [host] }))
        }
        "SendMessage" => {
            let queue = required(params, "queueName")?;
            let msg_id = state.enqueue(queue, required(params, "msgBody")?);
            Ok(json!({ "msgId": msg_id }))
        }
        "BatchSendMessage" => {
            let queue = required(params, "queueName")?;
            let bodies = indexed(params, "msgBody");
            if bodies.is_empty() {
                return Err((CODE_INVALID_PARAMETER, "missing msgBody.0".to_string()));
            }
            let ids: Vec<Value> = bodies
                .iter()
                .map(|b| json!({ "msgId": state.enqueue(queue, b) }))
                .collect();
            Ok(json!({ "msgList": ids }))
        }
        "ReceiveMessage" => {
            let queue = required(params, "queueName")?;
            match state.dequeue(queue, 1).pop() {
                Some((handle, m)) => {
                    let mut info = message_info(&handle, &m);
                    if let Some(obj) = info.as_object_mut() {
                        obj.insert("nextVisibleTime".to_string(), json!(m.first_dequeue_time + 30));
                    }
                    Ok(info)
                }
                None => Err((CODE_NO_MESSAGE, "no message".to_string())),
            }
        }
        "BatchReceiveMessage" => {
            let queue = required(params, "queueName")?;
            let n = params
                .get("numOfMsg")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let received = state.dequeue(queue, n);
            if received.is_empty() {
                return Err((CODE_NO_MESSAGE, "no message".to_string()));
            }
            let list: Vec<Value> = received.iter().map(|(h, m)| message_info(h, m)).collect();
            Ok(json!({ "msgInfoList": list }))
        }
        "DeleteMessage" => {
            let queue = required(params, "queueName")?;
            let handle = required(params, "receiptHandle")?;
            if state.ack(queue, handle) {
                Ok(json!({}))
            } else {
                Err((CODE_INVALID_PARAMETER, format!("invalid receipt handle {}", handle)))
            }
        }
        "BatchDeleteMessage" => {
            let queue = required(params, "queueName")?;
            let errors: Vec<Value> = indexed(params, "receiptHandle")
                .into_iter()
                .filter(|h| !state.ack(queue, h))
                .map(|h| {
                    json!({
                        "code": CODE_INVALID_PARAMETER,
                        "message": "invalid receipt handle",
                        "receiptHandle": h,
                    })
                })
                .collect();
            Ok(json!({ "errorList": errors }))
        }
        "PublishMessage" => {
            required(params, "topicName")?;
            required(params, "msgBody")?;
            Ok(json!({ "msgId": state.next_id().to_string() }))
        }
        "BatchPublishMessage" => {
            required(params, "topicName")?;
            let ids: Vec<Value> = indexed(params, "msgBody")
                .iter()
                .map(|_| json!({ "msgId": state.next_id().to_string() }))
                .collect();
            Ok(json!({ "msgList": ids }))
        }
        other => Err((CODE_INVALID_PARAMETER, format!("unknown action {}", other))),
    }
}

fn message_info(handle: &str, m: &StoredMessage) -> Value {
    json!({
        "msgId": m.msg_id,
        "msgBody": m.body,
        "receiptHandle": handle,
        "enqueueTime": m.enqueue_time,
        "firstDequeueTime": m.first_dequeue_time,
        "dequeueCount": m.dequeue_count,
    })
}

fn verify_signature(
    key: &str,
    method: &Method,
    headers: &HeaderMap,
    uri: &Uri,
    params: &Params,
) -> Result<(), String> {
    let mut params = params.clone();
    let signature = params
        .remove("Signature")
        .ok_or_else(|| "missing Signature".to_string())?;
    let sign_method: SignMethod = params
        .get("SignatureMethod")
        .map(String::as_str)
        .unwrap_or("HmacSHA256")
        .parse()
        .map_err(|e: crate::error::CmqError| e.to_string())?;
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    let signer = Signer::new(key, sign_method);
    // A client configured without a path signs "" but the request line says "/"
    let mut paths = vec![uri.path()];
    if uri.path() == "/" {
        paths.push("");
    }
    if paths
        .iter()
        .any(|p| signer.signature(method.as_str(), host, p, &params) == signature)
    {
        Ok(())
    } else {
        Err("signature mismatch".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started(config: MockServerConfig) -> MockCmqServer {
        let mut server = MockCmqServer::new(config);
        let port = server.start().await.unwrap();
        assert!(port > 0);
        server
    }

    fn raw_body(form: &[(&str, &str)]) -> String {
        form.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn post(server: &MockCmqServer, form: &[(&str, &str)]) -> Value {
        reqwest::Client::new()
            .post(server.url())
            .body(raw_body(form))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_receive_delete() {
        let server = started(MockServerConfig::default()).await;

        let sent = post(&server, &[("Action", "SendMessage"), ("queueName", "q"), ("msgBody", "hi")]).await;
        assert_eq!(sent["code"], 0);
        assert_eq!(server.pending("q"), 1);

        let got = post(&server, &[("Action", "ReceiveMessage"), ("queueName", "q")]).await;
        assert_eq!(got["msgBody"], "hi");
        assert_eq!(got["dequeueCount"], 1);
        assert_eq!(server.inflight(), 1);

        let handle = got["receiptHandle"].as_str().unwrap().to_string();
        let deleted = post(
            &server,
            &[("Action", "DeleteMessage"), ("queueName", "q"), ("receiptHandle", handle.as_str())],
        )
        .await;
        assert_eq!(deleted["code"], 0);
        assert_eq!(server.inflight(), 0);

        let empty = post(&server, &[("Action", "ReceiveMessage"), ("queueName", "q")]).await;
        assert_eq!(empty["code"], CODE_NO_MESSAGE);
    }

    #[tokio::test]
    async fn test_rejects_unsigned_requests() {
        let server = started(MockServerConfig {
            secret_key: Some("key".to_string()),
            ..Default::default()
        })
        .await;
        let resp = post(&server, &[("Action", "QueryQueueRoute"), ("queueName", "q")]).await;
        assert_eq!(resp["code"], CODE_AUTH_FAILED);
    }

    #[tokio::test]
    async fn test_error_injection() {
        let server = started(MockServerConfig {
            error_rate: 1.0,
            ..Default::default()
        })
        .await;
        let resp = reqwest::Client::new()
            .post(server.url())
            .body(raw_body(&[("Action", "QueryQueueRoute"), ("queueName", "q")]))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_parse_params() {
        let raw = parse_params("Signature=ab+c/d=&msgBody=a b:c", false);
        assert_eq!(raw["Signature"], "ab+c/d=");
        assert_eq!(raw["msgBody"], "a b:c");

        let query = parse_params("msgBody=a%20b:100%&Signature=x+y=", true);
        assert_eq!(query["msgBody"], "a b:100%");
        assert_eq!(query["Signature"], "x+y=");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let server = started(MockServerConfig::default()).await;
        let resp = post(&server, &[("Action", "CreateQueue")]).await;
        assert_eq!(resp["code"], CODE_INVALID_PARAMETER);
    }
}
