//! Interactive authorization flow.
//!
//! A flow sends the user agent to the authorization endpoint, completes the
//! consent screens by replaying scripted steps and waits until the server
//! redirects back to the client's `redirect_uri` with a `code`.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{HttpClient, HttpRequest};
use crate::core::AuthConfig;
use crate::error::TransportError;

/// Query parameters of an authorization request, in insertion order.
pub type AuthParams = IndexMap<String, String>;

/// One scripted action on the consent screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuthorizationStep {
    /// Click the element matched by a CSS selector.
    Click { target: String },
    /// Type `text` into the element matched by a CSS selector.
    SendKeys { target: String, text: String },
    /// Run an opaque script in the page.
    Script { source: String },
}

#[async_trait]
pub trait AuthorizationFlow: Send {
    /// Navigate to the authorization endpoint and return the landing URI.
    async fn init_authorization(&mut self, params: &AuthParams) -> Result<String, TransportError>;

    /// Replay `steps` on the current page. With `raise_on_error` unset a
    /// failing step yields `Ok(false)` instead of an error.
    async fn run_authorization_steps(
        &mut self,
        steps: &[AuthorizationStep],
        raise_on_error: bool,
    ) -> Result<bool, TransportError>;

    /// Wait for the redirect back to the client and return the code.
    async fn wait_for_redirect(&mut self, timeout: Duration) -> Result<String, TransportError>;
}

/// Opens a fresh flow (a new browser session) for every attempt.
pub trait AuthorizationFlowFactory: Send + Sync {
    fn open(&self, config: &AuthConfig) -> Box<dyn AuthorizationFlow>;
}

pub fn default_params(config: &AuthConfig, state: &str) -> AuthParams {
    [
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", config.scope.as_str()),
        ("state", state),
        ("aud", config.aud.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `authorize_uri` with `params` appended as the query string.
pub fn authorization_url(authorize_uri: &str, params: &AuthParams) -> Result<String, TransportError> {
    let mut url = Url::parse(authorize_uri)
        .map_err(|e| TransportError::network(format!("invalid authorize URI: {e}")))?;
    url.query_pairs_mut().extend_pairs(params.iter());
    Ok(url.into())
}

/// Run the default flow end to end and return the authorization code.
pub async fn authorize(
    factory: &dyn AuthorizationFlowFactory,
    config: &AuthConfig,
    state: &str,
    timeout: Duration,
) -> Result<String, TransportError> {
    let mut flow = factory.open(config);
    flow.init_authorization(&default_params(config, state)).await?;
    flow.run_authorization_steps(&config.authorization_steps, true)
        .await?;

    let code = tokio::time::timeout(timeout, flow.wait_for_redirect(timeout))
        .await
        .map_err(|_| TransportError::Timeout {
            seconds: timeout.as_secs(),
        })??;
    tracing::debug!("authorization code received");
    Ok(code)
}

const MAX_REDIRECTS: usize = 10;

/// Flow for servers that approve without any consent screen. It follows
/// HTTP redirects from the authorization endpoint and succeeds once it lands
/// on the client's `redirect_uri` with a code. Scripted steps cannot be
/// replayed without a browser and always count as a failure.
pub struct RedirectOnlyFlow {
    client: Arc<dyn HttpClient>,
    redirect_uri: String,
    authorize_uri: String,
    current_url: Option<String>,
}

impl RedirectOnlyFlow {
    pub fn new(client: Arc<dyn HttpClient>, config: &AuthConfig) -> Self {
        Self {
            client,
            redirect_uri: config.redirect_uri.clone(),
            authorize_uri: config.authorize_uri.clone(),
            current_url: None,
        }
    }

    fn is_redirect_target(&self, url: &str) -> bool {
        !self.redirect_uri.is_empty() && url.starts_with(&self.redirect_uri)
    }

    fn received_code(&self) -> Option<String> {
        let current = self.current_url.as_deref()?;
        if !self.is_redirect_target(current) {
            return None;
        }
        Url::parse(current)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
    }
}

#[async_trait]
impl AuthorizationFlow for RedirectOnlyFlow {
    async fn init_authorization(&mut self, params: &AuthParams) -> Result<String, TransportError> {
        let mut url = authorization_url(&self.authorize_uri, params)?;

        for _ in 0..MAX_REDIRECTS {
            if self.is_redirect_target(&url) {
                break;
            }
            let response = self.client.send(HttpRequest::get(url.as_str())).await?;
            let Some(location) = response
                .header("Location")
                .filter(|_| (300..400).contains(&response.status))
            else {
                break;
            };
            url = Url::parse(&url)
                .and_then(|base| base.join(location))
                .map_err(|e| TransportError::network(format!("invalid redirect: {e}")))?
                .into();
        }

        self.current_url = Some(url.clone());
        Ok(url)
    }

    async fn run_authorization_steps(
        &mut self,
        steps: &[AuthorizationStep],
        raise_on_error: bool,
    ) -> Result<bool, TransportError> {
        let outcome = if !steps.is_empty() {
            Err(TransportError::browser(
                "scripted authorization steps need an interactive browser",
            ))
        } else if self.received_code().is_none() {
            Err(TransportError::browser(
                "the server did not redirect back with an authorization code",
            ))
        } else {
            Ok(true)
        };

        match outcome {
            Err(e) if !raise_on_error => {
                tracing::debug!(error = %e, "authorization steps failed");
                Ok(false)
            }
            other => other,
        }
    }

    async fn wait_for_redirect(&mut self, _timeout: Duration) -> Result<String, TransportError> {
        self.received_code().ok_or_else(|| {
            TransportError::browser(format!(
                "never redirected to {}",
                self.redirect_uri
            ))
        })
    }
}

pub struct RedirectOnlyFlowFactory {
    client: Arc<dyn HttpClient>,
}

impl RedirectOnlyFlowFactory {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl AuthorizationFlowFactory for RedirectOnlyFlowFactory {
    fn open(&self, config: &AuthConfig) -> Box<dyn AuthorizationFlow> {
        Box::new(RedirectOnlyFlow::new(self.client.clone(), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            authorize_uri: "https://ehr.example.org/authorize".into(),
            token_uri: "https://ehr.example.org/token".into(),
            redirect_uri: "https://app.example.org/callback".into(),
            scope: "launch/patient patient/*.read".into(),
            aud: "https://ehr.example.org/fhir".into(),
            authorization_steps: Vec::new(),
        }
    }

    /// Approves any request that carries a `client_id`.
    struct AutoApprove;

    #[async_trait]
    impl HttpClient for AutoApprove {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let url = Url::parse(&request.url).unwrap();
            let has_client = url.query_pairs().any(|(k, _)| k == "client_id");
            if !has_client {
                return Ok(HttpResponse::new(400, "missing client_id"));
            }
            Ok(HttpResponse::new(302, "")
                .with_header("Location", "https://app.example.org/callback?code=abc&state=s"))
        }
    }

    #[test]
    fn test_step_serialization() {
        let steps: Vec<AuthorizationStep> = serde_json::from_str(
            r##"[
                {"action": "click", "target": "#login"},
                {"action": "send_keys", "target": "#user", "text": "demo"},
                {"action": "script", "source": "document.forms[0].submit()"}
            ]"##,
        )
        .unwrap();
        assert_eq!(
            steps[1],
            AuthorizationStep::SendKeys {
                target: "#user".into(),
                text: "demo".into()
            }
        );
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let mut params = default_params(&auth_config(), "a&b");
        params.shift_remove("aud");
        let url = authorization_url("https://ehr.example.org/authorize", &params).unwrap();
        assert!(url.starts_with("https://ehr.example.org/authorize?response_type=code&client_id=client"));
        assert!(url.contains("state=a%26b"));
        assert!(!url.contains("aud="));
    }

    #[tokio::test]
    async fn test_authorize_follows_redirect() {
        let factory = RedirectOnlyFlowFactory::new(Arc::new(AutoApprove));
        let code = authorize(&factory, &auth_config(), "s", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(code, "abc");
    }

    #[tokio::test]
    async fn test_rejected_authorization_reports_failure() {
        let config = auth_config();
        let mut flow = RedirectOnlyFlow::new(Arc::new(AutoApprove), &config);
        let mut params = default_params(&config, "s");
        params.shift_remove("client_id");

        flow.init_authorization(&params).await.unwrap();
        assert!(!flow.run_authorization_steps(&[], false).await.unwrap());
        assert!(flow.run_authorization_steps(&[], true).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_steps_unsupported() {
        let mut config = auth_config();
        config.authorization_steps = vec![AuthorizationStep::Click {
            target: "#approve".into(),
        }];
        let factory = RedirectOnlyFlowFactory::new(Arc::new(AutoApprove));
        let err = authorize(&factory, &config, "s", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Browser { .. }));
    }
}
