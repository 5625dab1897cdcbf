//! Asynchronous resolution of guest→host requests.
//!
//! An HTTP request resolves into exactly three host→guest messages tagged
//! with the request id, in order: metadata, one body chunk holding the whole
//! response body, then the completion sentinel. Transport failures keep that
//! shape (error status, empty body) so the guest's protocol expectations
//! hold; they are never surfaced as host-level errors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::engine::store::SharedState;
use crate::protocol::{HostIpcMessage, HttpRequest, HttpResponseMeta};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Status enqueued when the host-side network call itself fails.
const GATEWAY_ERROR_STATUS: u16 = 502;

/// Host-side network access used to resolve guest HTTP requests. Abstracted
/// so tests can resolve against a mock network.
pub trait HttpBackend: Send + Sync {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<Result<HttpBackendResponse>>;
}

pub struct HttpBackendResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The real network, proxied through reqwest.
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpBackend for ReqwestBackend {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<Result<HttpBackendResponse>> {
        let client = self.client.clone();
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())?;
            let mut builder = client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.bytes().await?.to_vec();

            Ok(HttpBackendResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Resolve one guest HTTP request on a background task. The tick loop keeps
/// running while the request is in flight; the three response messages land
/// on the shared queue whenever the network answers.
pub(crate) fn spawn(shared: Arc<SharedState>, generation: u64, id: u32, request: HttpRequest) {
    tokio::spawn(resolve_http(shared, generation, id, request));
}

pub(crate) async fn resolve_http(
    shared: Arc<SharedState>,
    generation: u64,
    id: u32,
    request: HttpRequest,
) {
    tracing::debug!("request {id}: {} {}", request.method, request.url);
    let url = request.url.clone();

    let response = match shared.http.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("request {id} to {url} failed: {e:#}");
            HttpBackendResponse {
                status: GATEWAY_ERROR_STATUS,
                headers: Vec::new(),
                body: Vec::new(),
            }
        }
    };

    enqueue_response(
        &shared,
        generation,
        id,
        HostIpcMessage::HttpResponseMeta(HttpResponseMeta {
            status: response.status,
            headers: response.headers,
        }),
    );
    enqueue_response(
        &shared,
        generation,
        id,
        HostIpcMessage::HttpResponseBody(response.body),
    );
    enqueue_response(&shared, generation, id, HostIpcMessage::HttpResponseComplete);
}

fn enqueue_response(shared: &SharedState, generation: u64, id: u32, message: HostIpcMessage) {
    match serde_json::to_vec(&message) {
        Ok(payload) => {
            if !shared.enqueue_for_generation(generation, id, payload) {
                tracing::debug!(
                    "discarding response for request {id}: run generation {generation} is retired"
                );
            }
        }
        Err(e) => tracing::error!("failed to encode host IPC message: {e}"),
    }
}
