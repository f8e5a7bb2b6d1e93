//! RPC channel between the host and an execution context.
//!
//! Frames are JSON strings carrying one [`RpcEnvelope`]. The host side holds
//! an [`RpcProxy`] that multiplexes concurrent calls over a pending-request
//! map; the context side runs [`serve`] over a [`ContextHandler`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use plugdock_core::HostError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Reserved request answered by [`serve`] with the handler's method list.
pub const DESCRIBE_METHOD: &str = "rpc.describe";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RpcEnvelope {
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

impl RpcEnvelope {
    pub fn encode(&self) -> Result<String, RpcError> {
        serde_json::to_string(self).map_err(|e| RpcError::Encode(e.to_string()))
    }

    pub fn decode(frame: &str) -> Result<Self, RpcError> {
        serde_json::from_str(frame).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcError {
    #[error("channel closed")]
    Closed,
    #[error("call to '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },
    #[error("'{method}' failed: {message}")]
    Remote { method: String, message: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("malformed frame: {0}")]
    Decode(String),
    #[error("channel buffer full; context is not reading")]
    Full,
}

impl From<RpcError> for HostError {
    fn from(err: RpcError) -> Self {
        HostError::Rpc(err.to_string())
    }
}

/// One end of a duplex frame channel.
pub struct RpcTransport {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Two connected transports: `(host, context)`.
pub fn channel_pair(buffer: usize) -> (RpcTransport, RpcTransport) {
    let buffer = buffer.max(1);
    let (host_tx, ctx_rx) = mpsc::channel(buffer);
    let (ctx_tx, host_rx) = mpsc::channel(buffer);
    (
        RpcTransport {
            outbound: host_tx,
            inbound: host_rx,
        },
        RpcTransport {
            outbound: ctx_tx,
            inbound: ctx_rx,
        },
    )
}

/// Method table exposed by an execution context.
#[async_trait]
pub trait ContextHandler: Send + Sync {
    fn methods(&self) -> Vec<String>;

    async fn call(&self, method: &str, params: Value) -> Result<Value, String>;
}

/// Serves requests and notifications until the host side hangs up.
///
/// Each request runs in its own task, so a slow call does not hold up the
/// rest of the channel. Dropping the returned future (or aborting its task)
/// cancels in-flight calls and closes the channel.
pub async fn serve(transport: RpcTransport, handler: Arc<dyn ContextHandler>) {
    let RpcTransport {
        outbound,
        mut inbound,
    } = transport;
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                match RpcEnvelope::decode(&frame) {
                    Ok(RpcEnvelope::Request { id, method, params }) => {
                        let handler = handler.clone();
                        let outbound = outbound.clone();
                        tasks.spawn(async move {
                            let reply = if method == DESCRIBE_METHOD {
                                RpcEnvelope::Response {
                                    id,
                                    result: Some(Value::from(handler.methods())),
                                    error: None,
                                }
                            } else {
                                match handler.call(&method, params).await {
                                    Ok(result) => RpcEnvelope::Response { id, result: Some(result), error: None },
                                    Err(error) => RpcEnvelope::Response { id, result: None, error: Some(error) },
                                }
                            };
                            if let Ok(frame) = reply.encode() {
                                let _ = outbound.send(frame).await;
                            }
                        });
                    }
                    Ok(RpcEnvelope::Notification { method, params }) => {
                        let handler = handler.clone();
                        tasks.spawn(async move {
                            if let Err(e) = handler.call(&method, params).await {
                                debug!(method = %method, error = %e, "Notification handler failed");
                            }
                        });
                    }
                    Ok(RpcEnvelope::Response { id, .. }) => {
                        debug!(id, "Ignoring unsolicited response");
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed frame"),
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>;

/// Host-side view of one context's channel.
pub struct RpcProxy {
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl RpcProxy {
    pub fn new(transport: RpcTransport, call_timeout: Duration) -> Self {
        let RpcTransport {
            outbound,
            mut inbound,
        } = transport;
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                match RpcEnvelope::decode(&frame) {
                    Ok(RpcEnvelope::Response { id, result, error }) => {
                        let Some(waiter) = reader_pending.lock().remove(&id) else {
                            debug!(id, "Response for unknown request");
                            continue;
                        };
                        let outcome = match error {
                            Some(message) => Err(RpcError::Remote {
                                method: String::new(),
                                message,
                            }),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = waiter.send(outcome);
                    }
                    Ok(other) => debug!(frame = ?other, "Ignoring non-response frame from context"),
                    Err(e) => warn!(error = %e, "Dropping malformed frame from context"),
                }
            }
            let _ = closed_tx.send(true);
            for (_, waiter) in reader_pending.lock().drain() {
                let _ = waiter.send(Err(RpcError::Closed));
            }
        });

        Self {
            outbound: Mutex::new(Some(outbound)),
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
            closed: closed_rx,
            reader,
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.call_with_timeout(method, params, self.call_timeout).await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value, RpcError> {
        let outbound = self.sender()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RpcEnvelope::Request {
            id,
            method: method.to_string(),
            params,
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // `limit` bounds queueing the frame as well as the reply.
        let exchange = async {
            if outbound.send(frame).await.is_err() {
                return Err(RpcError::Closed);
            }
            rx.await.unwrap_or(Err(RpcError::Closed))
        };
        match tokio::time::timeout(limit, exchange).await {
            Ok(Err(RpcError::Remote { message, .. })) => Err(RpcError::Remote {
                method: method.to_string(),
                message,
            }),
            Ok(outcome) => {
                if outcome.is_err() {
                    self.pending.lock().remove(&id);
                }
                outcome
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    after: limit,
                })
            }
        }
    }

    /// Fire-and-forget; succeeds once the frame is queued. Never waits for
    /// buffer space: a full buffer fails with [`RpcError::Full`].
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        let outbound = self.sender()?;
        let frame = RpcEnvelope::Notification {
            method: method.to_string(),
            params,
        }
        .encode()?;
        outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RpcError::Full,
            mpsc::error::TrySendError::Closed(_) => RpcError::Closed,
        })
    }

    /// Methods the context exposes.
    pub async fn describe(&self) -> Result<Vec<String>, RpcError> {
        let value = self.call(DESCRIBE_METHOD, Value::Null).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// Hangs up the host side. Pending calls fail with `Closed`.
    pub fn close(&self) {
        self.outbound.lock().take();
        self.reader.abort();
        for (_, waiter) in self.pending.lock().drain() {
            let _ = waiter.send(Err(RpcError::Closed));
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.outbound.lock().is_none()
    }

    /// Resolves to `true` once the context side goes away.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }

    fn sender(&self) -> Result<mpsc::Sender<String>, RpcError> {
        if *self.closed.borrow() {
            return Err(RpcError::Closed);
        }
        self.outbound.lock().clone().ok_or(RpcError::Closed)
    }
}

impl Drop for RpcProxy {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ContextHandler for Echo {
        fn methods(&self) -> Vec<String> {
            vec!["echo".into(), "slow".into(), "fail".into()]
        }

        async fn call(&self, method: &str, params: Value) -> Result<Value, String> {
            match method {
                "echo" => Ok(params),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }
                "fail" => Err("boom".into()),
                other => Err(format!("unknown method '{other}'")),
            }
        }
    }

    fn start(call_timeout: Duration) -> (RpcProxy, JoinHandle<()>) {
        let (host, ctx) = channel_pair(8);
        let server = tokio::spawn(serve(ctx, Arc::new(Echo)));
        (RpcProxy::new(host, call_timeout), server)
    }

    #[test]
    fn test_envelope_wire_format() {
        let frame = RpcEnvelope::Request {
            id: 7,
            method: "initialize".into(),
            params: Value::Null,
        }
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["kind"], "request");
        assert_eq!(value["id"], 7);

        assert!(RpcEnvelope::decode(r#"{"kind":"bogus"}"#).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_multiplexed() {
        let (proxy, _server) = start(Duration::from_secs(5));
        let (a, b) = tokio::join!(
            proxy.call("echo", json!({"n": 1})),
            proxy.call("echo", json!({"n": 2}))
        );
        assert_eq!(a.unwrap()["n"], 1);
        assert_eq!(b.unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn test_describe_lists_methods() {
        let (proxy, _server) = start(Duration::from_secs(5));
        let methods = proxy.describe().await.unwrap();
        assert!(methods.contains(&"echo".to_string()));
    }

    #[tokio::test]
    async fn test_remote_error_carries_method() {
        let (proxy, _server) = start(Duration::from_secs(5));
        let err = proxy.call("fail", Value::Null).await.unwrap_err();
        assert_eq!(
            err,
            RpcError::Remote {
                method: "fail".into(),
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_call_times_out_without_blocking_channel() {
        let (proxy, _server) = start(Duration::from_secs(5));
        let err = proxy
            .call_with_timeout("slow", Value::Null, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
        assert!(proxy.call("echo", json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_context_exit_closes_proxy() {
        let (proxy, server) = start(Duration::from_secs(5));
        let mut closed = proxy.closed_signal();
        server.abort();
        closed.wait_for(|c| *c).await.unwrap();
        assert!(proxy.is_closed());
        assert_eq!(proxy.call("echo", Value::Null).await, Err(RpcError::Closed));
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let (proxy, _server) = start(Duration::from_secs(5));
        proxy.close();
        assert_eq!(proxy.notify("echo", Value::Null).await, Err(RpcError::Closed));
    }
}
