use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::http::Request;
use kube::Client;
use log::trace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("API server proxy request failed! Reason: {}", .0)]
    Kube(kube::Error),
    #[error("HTTP request failed! Reason: {}", .0)]
    Http(reqwest::Error),
    #[error("Couldn't build a request for '{}'!", .0)]
    InvalidRequest(String),
    #[error("Request to '{}' didn't complete within {:?}!", .0, .1)]
    Timeout(String, Duration),
}

/// Fetches raw response bodies from an endpoint exposing the spark REST API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// human readable endpoint description used in logs
    fn endpoint(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTarget {
    Pod,
    Service,
}

impl ProxyTarget {
    fn collection(&self) -> &'static str {
        match self {
            ProxyTarget::Pod => "pods",
            ProxyTarget::Service => "services",
        }
    }
}

/// Reaches a pod or a service through the API server's proxy subresource.
pub struct ProxyTransport {
    client: Client,
    target: ProxyTarget,
    namespace: String,
    name: String,
    port: u16,
    timeout: Duration,
}

impl ProxyTransport {
    pub fn new(
        client: Client,
        target: ProxyTarget,
        namespace: &str,
        name: &str,
        port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            target,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            port,
            timeout,
        }
    }

    pub fn proxy_url(&self, path: &str) -> String {
        proxy_url(self.target, &self.namespace, &self.name, self.port, path)
    }
}

pub fn proxy_url(target: ProxyTarget, namespace: &str, name: &str, port: u16, path: &str) -> String {
    format!(
        "/api/v1/namespaces/{namespace}/{}/{name}:{port}/proxy/{}",
        target.collection(),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.proxy_url(path);
        let request = Request::get(url.as_str())
            .body(Vec::new())
            .map_err(|_| TransportError::InvalidRequest(url.to_owned()))?;

        trace!("GET {url}");

        let response = tokio::time::timeout(self.timeout, self.client.request_text(request))
            .await
            .map_err(|_| TransportError::Timeout(url, self.timeout))?
            .map_err(TransportError::Kube)?;

        Ok(response.into_bytes())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.target.collection(),
            self.namespace,
            self.name,
            self.port
        )
    }
}

/// Reaches an endpoint directly by host and port.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn base_url(host: &str, port: u16) -> String {
    // bare IPv6 addresses need brackets
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path);

        trace!("GET {url}");

        let response = self
            .client
            .get(url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(TransportError::Http)?;

        Ok(response
            .bytes()
            .await
            .map_err(TransportError::Http)?
            .to_vec())
    }

    fn endpoint(&self) -> String {
        self.base_url.to_owned()
    }
}
