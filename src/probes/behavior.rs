//! OAuth behavior probes.
//!
//! Each probe starts from a baseline parameter set and runs a fixed table
//! of scenarios, each derived from the baseline by one [`Override`] and
//! asserting whether the server should accept or reject the request.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{BaseTest, ProbeContext, TestCase};
use crate::core::{AuthConfig, ScenarioLog};
use crate::error::TransportError;
use crate::transport::{
    AuthParams, AuthorizationFlowFactory, HttpClient, HttpRequest, HttpResponse, Method,
    authorize, default_params,
};

const TOKEN_RESPONSE_KEYS: [&str; 4] = ["access_token", "token_type", "scope", "patient"];

const LONG_STATE: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
    Nulla mollis libero interdum mi eleifend mollis. Phasellus \
    velit lectus, feugiat eu turpis a, efficitur auctor leo. \
    Praesent sed bibendum nisi, vel mollis dui. Nulla volutpat \
    tortor in erat laoreet sodales. Nunc ex dolor, vehicula eget \
    convallis non, volutpat a odio. Aenean nec rutrum nibh. \
    Suspendisse fermentum sem a enim aliquet, non rhoncus dui \
    faucibus.";

const SPECIAL_STATE: &str = r#"`%2B~!@#$%^&*()-_=+[{]}\;:\'",<.>/?"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    AskForAuthorization,
    ExchangeCodeForToken,
    RefreshToken,
}

/// One change applied to a baseline parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    Omit(&'static str),
    Set(&'static str, String),
}

impl Override {
    pub fn set(key: &'static str, value: impl Into<String>) -> Self {
        Override::Set(key, value.into())
    }
}

/// Copy of `params` with every override applied in order. Replaced keys
/// keep their position; new keys are appended.
pub fn apply_overrides(params: &AuthParams, overrides: &[Override]) -> AuthParams {
    let mut params = params.clone();
    for change in overrides {
        match change {
            Override::Omit(key) => {
                params.shift_remove(*key);
            }
            Override::Set(key, value) => {
                params.insert(key.to_string(), value.clone());
            }
        }
    }
    params
}

struct AuthorizationScenario {
    title: &'static str,
    change: Override,
    should_authorize: bool,
}

fn authorization_scenarios() -> Vec<AuthorizationScenario> {
    let reject = |title, change| AuthorizationScenario {
        title,
        change,
        should_authorize: false,
    };
    let accept = |title, change| AuthorizationScenario {
        title,
        change,
        should_authorize: true,
    };

    vec![
        reject("Missing `response_type` parameter", Override::Omit("response_type")),
        reject("Wrong `response_type` parameter", Override::set("response_type", "token")),
        reject("Missing `client_id` parameter", Override::Omit("client_id")),
        reject("Wrong `client_id` parameter", Override::set("client_id", "example")),
        reject("Missing `redirect_uri` parameter", Override::Omit("redirect_uri")),
        reject(
            "Wrong `redirect_uri` parameter",
            Override::set("redirect_uri", "https://example.com"),
        ),
        reject("Missing `scope` parameter", Override::Omit("scope")),
        reject("Missing `state` parameter", Override::Omit("state")),
        accept("Long `state` parameter", Override::set("state", LONG_STATE)),
        accept(
            "Special characters in `state` parameter",
            Override::set("state", SPECIAL_STATE),
        ),
    ]
}

/// Where the `code` parameter of a token request comes from.
#[derive(Debug, Clone, Copy)]
enum CodeSource {
    /// Run a full authorization first.
    Fresh,
    Fixed(&'static str),
    Absent,
}

struct ExchangeScenario {
    title: &'static str,
    code: CodeSource,
    overrides: Vec<Override>,
    method: Method,
    /// Send the request twice and judge the second response.
    replay: bool,
    should_succeed: bool,
}

impl ExchangeScenario {
    fn new(title: &'static str, code: CodeSource) -> Self {
        Self {
            title,
            code,
            overrides: Vec::new(),
            method: Method::Post,
            replay: false,
            should_succeed: false,
        }
    }

    fn with(mut self, change: Override) -> Self {
        self.overrides.push(change);
        self
    }

    fn via(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    fn replayed(mut self) -> Self {
        self.replay = true;
        self
    }

    fn succeeds(mut self) -> Self {
        self.should_succeed = true;
        self
    }
}

fn exchange_scenarios() -> Vec<ExchangeScenario> {
    use CodeSource::{Absent, Fixed, Fresh};

    vec![
        ExchangeScenario::new("Success response has all required parameters", Fresh).succeeds(),
        ExchangeScenario::new(
            "We cannot use a \"GET\" request to retrieve an access token",
            Fresh,
        )
        .via(Method::Get),
        ExchangeScenario::new("Missing `grant_type` parameter", Fresh)
            .with(Override::Omit("grant_type")),
        ExchangeScenario::new("Wrong `grant_type` parameter", Fresh)
            .with(Override::set("grant_type", "Hugh")),
        ExchangeScenario::new("Missing `code` parameter", Absent),
        ExchangeScenario::new(
            "Wrong `code` parameter",
            Fixed("WURVFXGJYTHEIZXSQXOBGSVRUDOOJXATBKT"),
        ),
        ExchangeScenario::new("Missing `redirect_uri` parameter", Fresh)
            .with(Override::Omit("redirect_uri")),
        ExchangeScenario::new("Wrong `redirect_uri` parameter", Fresh)
            .with(Override::set("redirect_uri", "https://example.com")),
        ExchangeScenario::new("Use received code twice", Fresh).replayed(),
    ]
}

fn refresh_scenarios() -> Vec<ExchangeScenario> {
    use CodeSource::Absent;

    vec![
        ExchangeScenario::new("Success response has all required parameters", Absent).succeeds(),
        ExchangeScenario::new("Missing `grant_type` parameter", Absent)
            .with(Override::Omit("grant_type")),
        ExchangeScenario::new("Missing `refresh_token` parameter", Absent)
            .with(Override::Omit("refresh_token")),
    ]
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> AuthParams {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Problems with a token response that should have succeeded.
fn token_response_problems(response: &HttpResponse) -> Vec<String> {
    if !response.is_ok() {
        return vec!["Status code should be 200".to_string()];
    }
    let body = response.json().unwrap_or(JsonValue::Null);
    TOKEN_RESPONSE_KEYS
        .into_iter()
        .filter(|key| body.get(key).is_none())
        .map(|key| format!("JSON response should contain `{key}`"))
        .collect()
}

pub struct BehaviorProbe {
    base: BaseTest,
    kind: BehaviorKind,
    auth: AuthConfig,
    state: String,
    auth_flows: Arc<dyn AuthorizationFlowFactory>,
    refresh_token: Option<String>,
}

impl BehaviorProbe {
    /// The refresh-token variant obtains its refresh token here, once.
    pub async fn new(base: BaseTest, kind: BehaviorKind, ctx: &ProbeContext) -> Self {
        let mut probe = Self {
            base,
            kind,
            auth: ctx.config.auth.clone(),
            state: ctx.config.state.clone(),
            auth_flows: ctx.auth_flows.clone(),
            refresh_token: None,
        };
        if kind == BehaviorKind::RefreshToken {
            probe.refresh_token = probe.obtain_refresh_token().await;
        }
        probe
    }

    pub fn kind(&self) -> BehaviorKind {
        self.kind
    }

    async fn obtain_refresh_token(&self) -> Option<String> {
        let code = match self.authorization_code().await {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(slug = %self.base.slug(), error = %e, "could not authorize");
                return None;
            }
        };
        let request = params([
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", self.auth.redirect_uri.as_str()),
        ]);
        let response = self.exchange(&request, Method::Post).await.ok()?;
        response
            .json()
            .ok()?
            .get("refresh_token")
            .and_then(JsonValue::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }

    async fn authorization_code(&self) -> Result<String, TransportError> {
        authorize(
            self.auth_flows.as_ref(),
            &self.auth,
            &self.state,
            self.base.config().redirect_timeout(),
        )
        .await
    }

    async fn exchange(
        &self,
        params: &AuthParams,
        method: Method,
    ) -> Result<HttpResponse, TransportError> {
        let request = HttpRequest::new(method, self.auth.token_uri.as_str())
            .basic_auth(self.auth.client_id.as_str(), self.auth.client_secret.as_str())
            .form(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.base.requester().send(request).await
    }

    /// Whether a fresh consent flow with `params` completes.
    async fn attempt_authorization(&self, params: &AuthParams) -> bool {
        let mut flow = self.auth_flows.open(&self.auth);
        if let Err(e) = flow.init_authorization(params).await {
            tracing::debug!(error = %e, "authorization request rejected");
            return false;
        }
        flow.run_authorization_steps(&self.auth.authorization_steps, false)
            .await
            .unwrap_or(false)
    }

    async fn run_authorization(&self, log: &mut ScenarioLog) {
        let baseline = default_params(&self.auth, &self.state);

        for scenario in authorization_scenarios() {
            let request = apply_overrides(&baseline, std::slice::from_ref(&scenario.change));
            let authorized = self.attempt_authorization(&request).await;

            match (scenario.should_authorize, authorized) {
                (true, false) => log.fail(scenario.title, "The user should be able to authorize."),
                (false, true) => {
                    log.fail(scenario.title, "The user should not be able to authorize.")
                }
                _ => log.pass(scenario.title),
            }
        }
    }

    async fn run_exchanges(
        &self,
        baseline: &AuthParams,
        scenarios: Vec<ExchangeScenario>,
        log: &mut ScenarioLog,
    ) {
        for scenario in scenarios {
            let mut overrides = Vec::with_capacity(scenario.overrides.len() + 1);
            match scenario.code {
                CodeSource::Fresh => match self.authorization_code().await {
                    Ok(code) => overrides.push(Override::set("code", code)),
                    Err(e) => {
                        log.fail(
                            scenario.title,
                            format!("Could not obtain an authorization code: {e}"),
                        );
                        continue;
                    }
                },
                CodeSource::Fixed(code) => overrides.push(Override::set("code", code)),
                CodeSource::Absent => {}
            }
            overrides.extend(scenario.overrides.iter().cloned());
            let request = apply_overrides(baseline, &overrides);

            let mut response = self.exchange(&request, scenario.method).await;
            if scenario.replay {
                response = self.exchange(&request, scenario.method).await;
            }

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    log.fail(scenario.title, format!("Token request failed: {e}"));
                    continue;
                }
            };

            if scenario.should_succeed {
                let problems = token_response_problems(&response);
                if problems.is_empty() {
                    log.pass(scenario.title);
                } else {
                    log.fail(scenario.title, problems.join("; "));
                }
            } else if response.is_ok() {
                log.fail(scenario.title, "Response code should not be 200");
            } else {
                log.pass(scenario.title);
            }
        }
    }
}

#[async_trait]
impl TestCase for BehaviorProbe {
    fn base(&self) -> &BaseTest {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTest {
        &mut self.base
    }

    async fn should_skip(&mut self) -> Option<String> {
        if let Some(reason) = self.base.should_skip().await {
            return Some(reason);
        }
        if self.kind == BehaviorKind::RefreshToken && self.refresh_token.is_none() {
            return Some("No refresh token was supplied".to_string());
        }
        None
    }

    async fn run(&mut self, log: &mut ScenarioLog) {
        match self.kind {
            BehaviorKind::AskForAuthorization => self.run_authorization(log).await,
            BehaviorKind::ExchangeCodeForToken => {
                let baseline = params([
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", self.auth.redirect_uri.as_str()),
                ]);
                self.run_exchanges(&baseline, exchange_scenarios(), log).await;
            }
            BehaviorKind::RefreshToken => {
                let token = self.refresh_token.clone().unwrap_or_default();
                let baseline = params([
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.as_str()),
                ]);
                self.run_exchanges(&baseline, refresh_scenarios(), log).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let baseline = params([("a", "1"), ("b", "2"), ("c", "3")]);
        let changed = apply_overrides(
            &baseline,
            &[Override::Omit("a"), Override::set("c", "x"), Override::set("d", "4")],
        );
        let pairs: Vec<_> = changed.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("b", "2"), ("c", "x"), ("d", "4")]);
        assert_eq!(baseline.len(), 3);

        let missing = apply_overrides(&baseline, &[Override::Omit("zzz")]);
        assert_eq!(missing, baseline);
    }

    #[test]
    fn test_scenario_tables() {
        let auth = authorization_scenarios();
        assert_eq!(auth.len(), 10);
        assert_eq!(auth.iter().filter(|s| s.should_authorize).count(), 2);

        let exchanges = exchange_scenarios();
        assert_eq!(exchanges.len(), 9);
        assert!(exchanges.last().unwrap().replay);
        assert_eq!(refresh_scenarios().len(), 3);
    }

    #[test]
    fn test_token_response_problems() {
        let complete = HttpResponse::new(
            200,
            r#"{"access_token": "a", "token_type": "bearer", "scope": "s", "patient": "p"}"#,
        );
        assert!(token_response_problems(&complete).is_empty());

        let partial = HttpResponse::new(200, r#"{"access_token": "a", "token_type": "bearer"}"#);
        assert_eq!(
            token_response_problems(&partial),
            vec![
                "JSON response should contain `scope`".to_string(),
                "JSON response should contain `patient`".to_string()
            ]
        );

        let denied = HttpResponse::new(401, "{}");
        assert_eq!(
            token_response_problems(&denied),
            vec!["Status code should be 200".to_string()]
        );
    }
}
