use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::{HttpClient, HttpRequest};
use crate::core::{FhirVersion, ValidatorConfig};
use crate::error::TransportError;

/// Independent structural validation of a resource by a third party.
///
/// Requests go through the caller's `client`, so they land in the calling
/// test's transcript.
#[async_trait]
pub trait ResourceValidationService: Send + Sync {
    /// Error-severity issues reported for `resource`; empty when valid.
    async fn validate(
        &self,
        client: &dyn HttpClient,
        version: FhirVersion,
        resource: &JsonValue,
    ) -> Result<Vec<JsonValue>, TransportError>;
}

/// Posts resources to a FHIR server's `$validate` operation.
pub struct RemoteValidationService {
    config: ValidatorConfig,
}

impl RemoteValidationService {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn operation_url(&self, version: FhirVersion, resource: &JsonValue) -> String {
        let resource_type = resource
            .get("resourceType")
            .and_then(JsonValue::as_str)
            .unwrap_or("Resource");
        format!(
            "{}/{resource_type}/$validate",
            self.config.endpoint_for(version).trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ResourceValidationService for RemoteValidationService {
    async fn validate(
        &self,
        client: &dyn HttpClient,
        version: FhirVersion,
        resource: &JsonValue,
    ) -> Result<Vec<JsonValue>, TransportError> {
        let url = self.operation_url(version, resource);
        tracing::debug!(url = %url, "validating resource remotely");

        let response = client
            .send(
                HttpRequest::post(url.as_str())
                    .header("Accept", "application/json")
                    .json(resource.clone()),
            )
            .await?;
        if response.is_server_error() {
            return Err(TransportError::Status {
                status: response.status,
                url,
            });
        }

        let outcome = response.json()?;
        Ok(outcome
            .get("issue")
            .and_then(JsonValue::as_array)
            .into_iter()
            .flatten()
            .filter(|issue| {
                matches!(
                    issue.get("severity").and_then(JsonValue::as_str),
                    Some("error" | "fatal")
                )
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use serde_json::json;

    struct Fixed(u16, &'static str);

    #[async_trait]
    impl HttpClient for Fixed {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            assert!(request.url.ends_with("/Patient/$validate"));
            Ok(HttpResponse::new(self.0, self.1))
        }
    }

    async fn validate(
        status: u16,
        body: &'static str,
        version: FhirVersion,
    ) -> Result<Vec<JsonValue>, TransportError> {
        RemoteValidationService::new(ValidatorConfig::default())
            .validate(&Fixed(status, body), version, &json!({"resourceType": "Patient"}))
            .await
    }

    #[tokio::test]
    async fn test_returns_error_issues_only() {
        let body = r#"{"resourceType": "OperationOutcome", "issue": [
            {"severity": "information", "diagnostics": "ok"},
            {"severity": "error", "diagnostics": "bad gender"}
        ]}"#;
        let issues = validate(412, body, FhirVersion::Dstu2).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["diagnostics"], "bad gender");
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let err = validate(503, "", FhirVersion::Stu3).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
    }
}
