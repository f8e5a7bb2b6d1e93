//! Network API: HTTP requests and socket connections.
//!
//! Socket handles keep a reference to the capability API and re-check their
//! sub-capability on every operation, so a narrowed grant cuts off a socket
//! that is already open.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use plugdock_core::{Capability, HostError, HostResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{boundary, CapabilityApi};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketProtocol {
    WebSocket,
    SocketIo,
}

impl SocketProtocol {
    fn capability(self) -> Capability {
        match self {
            SocketProtocol::WebSocket => Capability::WEBSOCKET,
            SocketProtocol::SocketIo => Capability::SOCKETIO,
        }
    }
}

impl fmt::Display for SocketProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketProtocol::WebSocket => f.write_str("websocket"),
            SocketProtocol::SocketIo => f.write_str("socketio"),
        }
    }
}

/// An open socket as provided by the transport.
#[async_trait]
pub trait SocketStream: Send {
    async fn send(&mut self, frame: String) -> Result<()>;
    /// `None` once the peer has closed.
    async fn recv(&mut self) -> Result<Option<String>>;
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait NetworkTransport: Send + Sync {
    async fn http(&self, request: HttpRequest) -> Result<HttpResponse>;
    async fn connect(&self, protocol: SocketProtocol, url: &str) -> Result<Box<dyn SocketStream>>;
}

/// HTTP through `reqwest`. Sockets are not supported.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkTransport for ReqwestTransport {
    async fn http(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid http method '{}'", request.method))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("request to {} failed", request.url))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response.text().await.context("read response body")?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn connect(&self, protocol: SocketProtocol, url: &str) -> Result<Box<dyn SocketStream>> {
        bail!("{protocol} connections are not supported by the http transport ({url})")
    }
}

/// Every operation fails. Default for hosts without network access.
pub struct OfflineTransport;

#[async_trait]
impl NetworkTransport for OfflineTransport {
    async fn http(&self, request: HttpRequest) -> Result<HttpResponse> {
        bail!("network unavailable ({})", request.url)
    }

    async fn connect(&self, protocol: SocketProtocol, url: &str) -> Result<Box<dyn SocketStream>> {
        bail!("network unavailable ({protocol} {url})")
    }
}

pub struct NetworkApi<'a> {
    api: &'a CapabilityApi,
}

impl<'a> NetworkApi<'a> {
    pub(super) fn new(api: &'a CapabilityApi) -> Self {
        Self { api }
    }

    pub fn http(&self) -> HttpApi<'a> {
        HttpApi { api: self.api }
    }

    pub fn websocket(&self) -> SocketApi<'a> {
        SocketApi {
            api: self.api,
            protocol: SocketProtocol::WebSocket,
        }
    }

    pub fn socketio(&self) -> SocketApi<'a> {
        SocketApi {
            api: self.api,
            protocol: SocketProtocol::SocketIo,
        }
    }
}

pub struct HttpApi<'a> {
    api: &'a CapabilityApi,
}

impl HttpApi<'_> {
    pub async fn fetch(&self, request: &HttpRequest) -> HostResult<HttpResponse> {
        self.api.require(Capability::HTTP, "network.http.fetch")?;
        let request: HttpRequest = boundary::transfer(request)?;
        debug!(plugin = %self.api.plugin_id(), method = %request.method, url = %request.url, "Plugin http request");
        let response = self
            .api
            .network_transport()
            .http(request)
            .await
            .map_err(|e| HostError::Transport(format!("{e:#}")))?;
        boundary::transfer(&response)
    }
}

pub struct SocketApi<'a> {
    api: &'a CapabilityApi,
    protocol: SocketProtocol,
}

impl SocketApi<'_> {
    pub async fn connect(&self, url: &str) -> HostResult<SocketHandle> {
        let capability = self.protocol.capability();
        self.api
            .require(capability, &format!("network.{}.connect", self.protocol))?;
        let stream = self
            .api
            .network_transport()
            .connect(self.protocol, url)
            .await
            .map_err(|e| HostError::Transport(format!("{e:#}")))?;
        Ok(SocketHandle {
            api: self.api.clone(),
            protocol: self.protocol,
            url: url.to_string(),
            stream: Mutex::new(stream),
        })
    }
}

pub struct SocketHandle {
    api: CapabilityApi,
    protocol: SocketProtocol,
    url: String,
    stream: Mutex<Box<dyn SocketStream>>,
}

impl SocketHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> SocketProtocol {
        self.protocol
    }

    pub async fn send(&self, frame: &Value) -> HostResult<()> {
        self.api.require(
            self.protocol.capability(),
            &format!("network.{}.send", self.protocol),
        )?;
        let raw = boundary::to_wire(frame)?;
        self.stream
            .lock()
            .await
            .send(raw)
            .await
            .map_err(|e| HostError::Transport(format!("{e:#}")))
    }

    pub async fn recv(&self) -> HostResult<Option<Value>> {
        self.api.require(
            self.protocol.capability(),
            &format!("network.{}.recv", self.protocol),
        )?;
        let raw = self
            .stream
            .lock()
            .await
            .recv()
            .await
            .map_err(|e| HostError::Transport(format!("{e:#}")))?;
        raw.map(|r| boundary::from_wire(&r)).transpose()
    }

    /// Closing never requires a capability.
    pub async fn close(&self) -> HostResult<()> {
        self.stream
            .lock()
            .await
            .close()
            .await
            .map_err(|e| HostError::Transport(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_transport_fails() {
        let transport = OfflineTransport;
        assert!(transport.http(HttpRequest::get("https://example.com")).await.is_err());
        assert!(transport
            .connect(SocketProtocol::WebSocket, "wss://example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reqwest_transport_rejects_sockets() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        let err = match transport.connect(SocketProtocol::SocketIo, "https://example.com").await {
            Err(e) => e,
            Ok(_) => panic!("socket connect should fail"),
        };
        assert!(err.to_string().contains("socketio"));
    }

    #[test]
    fn test_request_defaults() {
        let request: HttpRequest = serde_json::from_str(r#"{"url":"https://example.com"}"#).unwrap();
        assert_eq!(request, HttpRequest::get("https://example.com"));
    }
}
