use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::error::TransportError;

/// One side of an audited HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Exchange {
    Request {
        method: Method,
        url: String,
        headers: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Response {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
}

impl Exchange {
    fn from_request(request: &HttpRequest) -> Self {
        let mut headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), redact(name, value)))
            .collect();
        if let Some((user, _)) = &request.basic_auth {
            headers.insert("Authorization".to_string(), format!("Basic {user}:[redacted]"));
        }
        Exchange::Request {
            method: request.method,
            url: request.url.clone(),
            headers,
            body: request.body.render(),
        }
    }

    fn from_response(response: &HttpResponse) -> Self {
        Exchange::Response {
            status: response.status,
            headers: response.headers.iter().cloned().collect(),
            body: response.body.clone(),
        }
    }
}

/// Credentials never reach the transcript: bearer tokens are masked and
/// basic auth keeps only the user name.
fn redact(name: &str, value: &str) -> String {
    if !name.eq_ignore_ascii_case("Authorization") {
        return value.to_string();
    }
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} [redacted]"),
        None => "[redacted]".to_string(),
    }
}

/// HTTP client wrapper that keeps a transcript of everything it sends and
/// receives. Each test instance owns one.
pub struct Requester {
    inner: Arc<dyn HttpClient>,
    transcript: Mutex<Vec<Exchange>>,
}

impl Requester {
    pub fn new(inner: Arc<dyn HttpClient>) -> Self {
        Self {
            inner,
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub async fn get(
        &self,
        url: impl Into<String>,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = HttpRequest::get(url).header("Accept", "application/json");
        if let Some(token) = bearer {
            request = request.bearer(token);
        }
        self.send(request).await
    }

    pub async fn transcript(&self) -> Vec<Exchange> {
        self.transcript.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.transcript.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transcript.lock().await.is_empty()
    }
}

#[async_trait]
impl HttpClient for Requester {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let recorded = Exchange::from_request(&request);
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        self.transcript.lock().await.push(recorded);

        let response = self.inner.send(request).await;
        if let Ok(response) = &response {
            self.transcript
                .lock()
                .await
                .push(Exchange::from_response(response));
        }
        response
    }
}
