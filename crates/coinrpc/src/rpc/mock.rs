use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CoreError, TransportError};

use super::{SessionState, Transport};

/// Scripted reply produced by a [`MockTransport`] handler.
pub enum MockReply {
    Json(Value),
    Raw(Vec<u8>),
    /// Non-2xx HTTP status with the given body.
    Status(u16, String),
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn result(id: &Value, result: Value) -> Self {
        MockReply::Json(json!({"result": result, "error": null, "id": id}))
    }

    pub fn error(id: &Value, code: i64, message: &str) -> Self {
        MockReply::Json(json!({
            "result": null,
            "error": {"code": code, "message": message},
            "id": id,
        }))
    }

    pub fn after(self, delay: Duration) -> Self {
        MockReply::Delayed(delay, Box::new(self))
    }
}

type Handler = Box<dyn Fn(&Value) -> MockReply + Send + Sync>;

/// A test double for [`Transport`]. Each decoded request is handed to a
/// handler closure, which decides the reply and an optional delay.
pub struct MockTransport {
    handler: Handler,
    state: Mutex<SessionState>,
    requests: Mutex<Vec<Value>>,
    in_flight: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&Value) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            state: Mutex::new(SessionState::Unopened),
            requests: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reply with `{"method": ..., "params": ...}` of each request. Batch
    /// replies come back in reverse order.
    pub fn echo() -> Self {
        fn echo_one(req: &Value) -> Value {
            json!({
                "result": {"method": req["method"], "params": req["params"]},
                "error": null,
                "id": req["id"],
            })
        }

        Self::new(|req| match req.as_array() {
            Some(batch) => MockReply::Json(Value::Array(
                batch.iter().rev().map(echo_one).collect(),
            )),
            None => MockReply::Json(echo_one(req)),
        })
    }

    /// Every request received so far, decoded.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Exchanges currently suspended inside `send`.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("state lock");
        if *state == SessionState::Closed {
            return Err(CoreError::Closed);
        }
        *state = SessionState::Open;
        Ok(())
    }

    async fn send(&self, body: Vec<u8>) -> Result<Vec<u8>, CoreError> {
        self.open().await?;
        let request: Value = serde_json::from_slice(&body).expect("client must send JSON");
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let _guard = InFlightGuard::enter(&self.in_flight);
        let mut reply = (self.handler)(&request);
        loop {
            match reply {
                MockReply::Delayed(delay, next) => {
                    tokio::time::sleep(delay).await;
                    reply = *next;
                }
                MockReply::Json(value) => {
                    return Ok(serde_json::to_vec(&value).expect("reply must serialize"))
                }
                MockReply::Raw(bytes) => return Ok(bytes),
                MockReply::Status(status, body) => {
                    return Err(TransportError::Status { status, body }.into())
                }
            }
        }
    }

    fn close(&self) {
        *self.state.lock().expect("state lock") = SessionState::Closed;
    }

    fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_reverses_batches() {
        let transport = MockTransport::echo();
        let body = serde_json::to_vec(&json!([
            {"jsonrpc": "2.0", "id": 1, "method": "a", "params": []},
            {"jsonrpc": "2.0", "id": 2, "method": "b", "params": []},
        ]))
        .expect("JSON");

        let reply = transport.send(body).await.expect("send must succeed");
        let reply: Value = serde_json::from_slice(&reply).expect("JSON");
        assert_eq!(reply[0]["id"], json!(2));
        assert_eq!(reply[1]["result"]["method"], json!("a"));
        assert_eq!(transport.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn closed_mock_rejects_sends() {
        let transport = MockTransport::echo();
        transport.close();
        let err = transport
            .send(b"{}".to_vec())
            .await
            .expect_err("closed must fail");
        assert!(matches!(err, CoreError::Closed));
        assert!(transport.requests().is_empty());
    }
}
