use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use smart_certify::transport::{
    AuthParams, AuthorizationFlow, AuthorizationFlowFactory, AuthorizationStep, HttpClient,
    HttpRequest, HttpResponse, Method, RemoteValidationService, RequestBody,
};
use smart_certify::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URI: &str = "https://ehr.example.org/fhir";
pub const AUTHORIZE_URI: &str = "https://ehr.example.org/authorize";
pub const TOKEN_URI: &str = "https://ehr.example.org/token";
pub const REDIRECT_URI: &str = "https://app.example.org/callback";
pub const VALIDATOR_URI: &str = "https://validator.example.org/baseDstu2";
pub const PATIENT_ID: &str = "1234";
pub const BEARER_TOKEN: &str = "token-abc";
pub const CLIENT_ID: &str = "certify-client";
pub const CLIENT_SECRET: &str = "s3cret";
pub const REFRESH_TOKEN: &str = "refresh-1";

/// Authorization codes issued by the mock consent flow and redeemed at the
/// mock token endpoint.
#[derive(Debug, Default)]
pub struct AuthServerState {
    issued: HashSet<String>,
    redeemed: HashSet<String>,
    next_code: u32,
}

impl AuthServerState {
    fn issue(&mut self) -> String {
        self.next_code += 1;
        let code = format!("code-{}", self.next_code);
        self.issued.insert(code.clone());
        code
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}

pub type SharedAuthState = Arc<Mutex<AuthServerState>>;

/// Every request the mock server saw, plus the highest number of requests
/// it was handling at once.
#[derive(Debug, Default)]
pub struct TrafficLog {
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl TrafficLog {
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.starts_with(prefix))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, request: &HttpRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
pub fn authorization_header(request: &HttpRequest) -> Option<&str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k == "Authorization")
        .map(|(_, v)| v.as_str())
}

/// In-process stand-in for the server under test, its token endpoint and
/// the validation service.
pub struct MockEhr {
    pub auth_state: SharedAuthState,
    pub resources: HashMap<String, JsonValue>,
    pub resource_types: Vec<&'static str>,
    pub security_extension: bool,
    pub issue_refresh_tokens: bool,
    pub metadata_available: bool,
    pub validator_available: bool,
    pub validator_issues: Vec<JsonValue>,
    pub panic_on: Option<String>,
    /// Delay before answering, so overlapping requests become visible.
    pub latency: Option<Duration>,
    /// The consent flow never redirects back to the client.
    pub stall_redirects: bool,
    pub traffic: Arc<TrafficLog>,
}

impl MockEhr {
    pub fn new() -> Self {
        Self {
            auth_state: Arc::new(Mutex::new(AuthServerState::default())),
            resources: HashMap::new(),
            resource_types: vec![
                "Patient",
                "Observation",
                "Condition",
                "AllergyIntolerance",
                "Procedure",
                "Immunization",
                "DocumentReference",
                "MedicationOrder",
                "MedicationStatement",
            ],
            security_extension: true,
            issue_refresh_tokens: true,
            metadata_available: true,
            validator_available: true,
            validator_issues: Vec::new(),
            panic_on: None,
            latency: None,
            stall_redirects: false,
            traffic: Arc::new(TrafficLog::default()),
        }
    }

    pub fn with_resource(mut self, path: &str, resource: JsonValue) -> Self {
        self.resources.insert(path.to_string(), resource);
        self
    }

    pub fn without_type(mut self, resource_type: &str) -> Self {
        self.resource_types.retain(|t| *t != resource_type);
        self
    }

    fn capability(&self) -> JsonValue {
        let resources: Vec<_> = self
            .resource_types
            .iter()
            .map(|t| json!({"type": t}))
            .collect();
        let mut rest = json!({"mode": "server", "resource": resources});
        if self.security_extension {
            rest["security"] = json!({"extension": [{
                "url": "http://fhir-registry.smarthealthit.org/StructureDefinition/oauth-uris",
                "extension": [
                    {"url": "authorize", "valueUri": AUTHORIZE_URI},
                    {"url": "token", "valueUri": TOKEN_URI}
                ]
            }]});
        }
        json!({"resourceType": "Conformance", "rest": [rest]})
    }

    fn token_body(&self) -> JsonValue {
        let mut body = json!({
            "access_token": "access-1",
            "token_type": "bearer",
            "scope": "launch/patient patient/*.read",
            "patient": PATIENT_ID
        });
        if self.issue_refresh_tokens {
            body["refresh_token"] = json!(REFRESH_TOKEN);
        }
        body
    }

    fn token(&self, request: &HttpRequest) -> HttpResponse {
        if request.method != Method::Post {
            return HttpResponse::new(405, r#"{"error": "invalid_request"}"#);
        }
        if request.basic_auth != Some((CLIENT_ID.to_string(), CLIENT_SECRET.to_string())) {
            return HttpResponse::new(401, r#"{"error": "invalid_client"}"#);
        }
        let form: HashMap<&str, &str> = match &request.body {
            RequestBody::Form(pairs) => pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
            _ => HashMap::new(),
        };
        let rejected = HttpResponse::new(400, r#"{"error": "invalid_grant"}"#);

        match form.get("grant_type").copied() {
            Some("authorization_code") => {
                if form.get("redirect_uri").copied() != Some(REDIRECT_URI) {
                    return rejected;
                }
                let Some(code) = form.get("code") else {
                    return rejected;
                };
                let Ok(mut state) = self.auth_state.lock() else {
                    return HttpResponse::new(500, "{}");
                };
                if !state.issued.contains(*code) || !state.redeemed.insert(code.to_string()) {
                    return rejected;
                }
                HttpResponse::new(200, self.token_body().to_string())
            }
            Some("refresh_token") if form.get("refresh_token").copied() == Some(REFRESH_TOKEN) => {
                HttpResponse::new(200, self.token_body().to_string())
            }
            _ => rejected,
        }
    }

    fn validate(&self) -> HttpResponse {
        if !self.validator_available {
            return HttpResponse::new(503, "Service Unavailable");
        }
        let outcome = json!({"resourceType": "OperationOutcome", "issue": self.validator_issues});
        HttpResponse::new(200, outcome.to_string())
    }

    fn fhir(&self, request: &HttpRequest, path: &str) -> HttpResponse {
        if path == "metadata" {
            if !self.metadata_available {
                return HttpResponse::new(500, "{}");
            }
            return HttpResponse::new(200, self.capability().to_string());
        }
        let authorized = request
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && *v == format!("Bearer {BEARER_TOKEN}"));
        if !authorized {
            return HttpResponse::new(401, "{}");
        }
        match self.resources.get(path) {
            Some(resource) => HttpResponse::new(200, resource.to_string()),
            None => HttpResponse::new(404, r#"{"resourceType": "OperationOutcome"}"#),
        }
    }
}

#[async_trait]
impl HttpClient for MockEhr {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.traffic.enter(&request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let response = self.route(request);
        self.traffic.leave();
        response
    }
}

impl MockEhr {
    fn route(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        if let Some(fragment) = &self.panic_on
            && request.url.contains(fragment.as_str())
        {
            panic!("mock server crashed on {}", request.url);
        }

        if request.url == TOKEN_URI {
            return Ok(self.token(&request));
        }
        if request.url.starts_with(VALIDATOR_URI) {
            return Ok(self.validate());
        }
        if let Some(path) = request.url.strip_prefix(&format!("{BASE_URI}/")) {
            return Ok(self.fhir(&request, path));
        }
        Err(TransportError::network(format!("no route to {}", request.url)))
    }
}

/// Consent flow that approves exactly the well-formed requests and then
/// issues a single-use code.
pub struct MockFlowFactory {
    state: SharedAuthState,
    stall_redirects: bool,
}

impl MockFlowFactory {
    pub fn new(state: SharedAuthState) -> Self {
        Self {
            state,
            stall_redirects: false,
        }
    }

    pub fn stalled(mut self, stall_redirects: bool) -> Self {
        self.stall_redirects = stall_redirects;
        self
    }
}

impl AuthorizationFlowFactory for MockFlowFactory {
    fn open(&self, config: &AuthConfig) -> Box<dyn AuthorizationFlow> {
        Box::new(MockFlow {
            state: self.state.clone(),
            config: config.clone(),
            params: None,
            stall_redirects: self.stall_redirects,
        })
    }
}

struct MockFlow {
    state: SharedAuthState,
    config: AuthConfig,
    params: Option<AuthParams>,
    stall_redirects: bool,
}

impl MockFlow {
    fn request_is_valid(&self) -> bool {
        let Some(params) = &self.params else {
            return false;
        };
        let get = |key: &str| params.get(key).map(String::as_str);
        get("response_type") == Some("code")
            && get("client_id") == Some(self.config.client_id.as_str())
            && get("redirect_uri") == Some(self.config.redirect_uri.as_str())
            && get("scope").is_some()
            && get("state").is_some_and(|s| !s.is_empty())
    }
}

#[async_trait]
impl AuthorizationFlow for MockFlow {
    async fn init_authorization(
        &mut self,
        params: &AuthParams,
    ) -> std::result::Result<String, TransportError> {
        self.params = Some(params.clone());
        Ok(format!("{AUTHORIZE_URI}/consent"))
    }

    async fn run_authorization_steps(
        &mut self,
        _steps: &[AuthorizationStep],
        raise_on_error: bool,
    ) -> std::result::Result<bool, TransportError> {
        match (self.request_is_valid(), raise_on_error) {
            (true, _) => Ok(true),
            (false, true) => Err(TransportError::browser("consent screen showed an error")),
            (false, false) => Ok(false),
        }
    }

    async fn wait_for_redirect(
        &mut self,
        _timeout: Duration,
    ) -> std::result::Result<String, TransportError> {
        if self.stall_redirects {
            std::future::pending::<()>().await;
        }
        if !self.request_is_valid() {
            return Err(TransportError::browser("no redirect to the client"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::browser("auth state poisoned"))?;
        Ok(state.issue())
    }
}

#[allow(dead_code)]
pub fn create_test_config_json() -> JsonValue {
    json!({
        "fhir_version": "DSTU2",
        "use_cases": ["EHR", "Security"],
        "base_uri": BASE_URI,
        "base_fhir_uri": format!("{BASE_URI}/"),
        "patient_id": PATIENT_ID,
        "bearer_token": BEARER_TOKEN,
        "state": "state-xyz",
        "auth": {
            "client_id": CLIENT_ID,
            "client_secret": CLIENT_SECRET,
            "authorize_uri": AUTHORIZE_URI,
            "token_uri": TOKEN_URI,
            "redirect_uri": REDIRECT_URI,
            "scope": "launch/patient patient/*.read offline_access",
            "aud": BASE_URI
        },
        "validator": {
            "dstu2_endpoint": VALIDATOR_URI,
            "stu3_endpoint": "https://validator.example.org/baseDstu3"
        },
        "redirect_timeout_secs": 5
    })
}

#[allow(dead_code)]
pub fn create_test_config(tests: &[&str]) -> CertifyConfig {
    let mut config = create_test_config_json();
    config["tests"] = json!(tests);
    CertifyConfig::from_json_str(&config.to_string()).expect("test config is valid")
}

#[allow(dead_code)]
pub fn create_test_context(ehr: MockEhr, config: CertifyConfig) -> ProbeContext {
    let flows = MockFlowFactory::new(ehr.auth_state.clone()).stalled(ehr.stall_redirects);
    let http: Arc<MockEhr> = Arc::new(ehr);
    let validation = RemoteValidationService::new(config.validator.clone());
    ProbeContext {
        config: Arc::new(config),
        http,
        auth_flows: Arc::new(flows),
        validation: Arc::new(validation),
    }
}

#[allow(dead_code)]
pub fn create_test_patient() -> JsonValue {
    json!({
        "resourceType": "Patient",
        "id": PATIENT_ID,
        "identifier": [{"system": "urn:mrn", "value": "MRN-1"}],
        "name": [{"family": ["Doe"], "given": ["Jane"], "use": "official"}],
        "gender": "female",
        "address": [{"city": "Boston"}],
        "maritalStatus": {"coding": [{"system": "http://hl7.org/fhir/v3/MaritalStatus", "code": "M"}]},
        "managingOrganization": {"reference": "Organization/1"}
    })
}

#[allow(dead_code)]
pub fn create_test_organization() -> JsonValue {
    json!({"resourceType": "Organization", "id": "1", "name": "General Hospital"})
}

/// Run `slugs` through a full suite and return the reports in creation
/// order.
#[allow(dead_code)]
pub async fn run_suite(ehr: MockEhr, slugs: &[&str]) -> Vec<TestReport> {
    let ctx = create_test_context(ehr, create_test_config(slugs));
    let registry = Arc::new(TestRegistry::standard().expect("standard registry builds"));
    let recorder = Arc::new(MemoryRecorder::new());
    let suite = SuiteRun::new(registry, ctx, recorder.clone())
        .await
        .expect("suite is created");
    suite.dispatch(&StagedDispatcher::new()).await;
    recorder.reports().await
}

#[allow(dead_code)]
pub fn scenario<'a>(report: &'a TestReport, title: &str) -> &'a ScenarioResult {
    report
        .scenarios
        .iter()
        .find(|s| s.title == title)
        .unwrap_or_else(|| panic!("scenario {title:?} missing from {}", report.slug))
}
