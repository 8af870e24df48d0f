use async_trait::async_trait;
use url::Url;

use super::{BaseTest, TestCase};
use crate::core::{FhirVersion, ScenarioLog};

/// Data categories every certified server exposes, with the resource type
/// carrying each one.
const MUST_SUPPORT: &[(&str, &str)] = &[
    ("Patient demographics", "Patient"),
    ("Smoking status", "Observation"),
    ("Problems", "Condition"),
    ("Allergies and intolerances", "AllergyIntolerance"),
    ("Lab results", "Observation"),
    ("Vital signs", "Observation"),
    ("Procedures", "Procedure"),
    ("Immunizations", "Immunization"),
    ("Patient documents", "DocumentReference"),
];

const OAUTH_ENDPOINTS: [&str; 2] = ["authorize", "token"];

const NO_SECURITY_EXTENSION: &str =
    "The conformance statement does not provide a `security` extension";

fn medication_types(version: FhirVersion) -> &'static [&'static str] {
    match version {
        FhirVersion::Dstu2 => &[
            "MedicationOrder",
            "MedicationStatement",
            "MedicationDispense",
            "MedicationAdministration",
        ],
        FhirVersion::Stu3 => &[
            "MedicationRequest",
            "MedicationStatement",
            "MedicationDispense",
            "MedicationAdministration",
        ],
    }
}

/// Checks the capability statement itself.
pub struct ConformanceProbe {
    base: BaseTest,
}

impl ConformanceProbe {
    pub fn new(base: BaseTest) -> Self {
        Self { base }
    }
}

#[async_trait]
impl TestCase for ConformanceProbe {
    fn base(&self) -> &BaseTest {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTest {
        &mut self.base
    }

    async fn run(&mut self, log: &mut ScenarioLog) {
        let Some(statement) = self.base.capability() else {
            log.fail(
                "Conformance statement is available",
                "The server's conformance statement could not be retrieved",
            );
            return;
        };

        for (label, resource_type) in MUST_SUPPORT {
            let title = format!("Server implements {label}");
            if statement.supports(resource_type) {
                log.pass(title);
            } else {
                log.fail(
                    title,
                    format!("The server must support the {resource_type} resource type"),
                );
            }
        }

        let medications = medication_types(self.base.config().fhir_version);
        if medications.iter().any(|t| statement.supports(t)) {
            log.pass("Server implements Medications");
        } else {
            log.fail(
                "Server implements Medications",
                format!(
                    "The server must support at least one of {}",
                    medications.join(", ")
                ),
            );
        }

        const SPECIFIED: &str = "Conformance statement specifies the authorize and token endpoints";
        const VALID: &str = "Conformance statement OAuth endpoints are valid";

        let Some(uris) = statement.oauth_uris() else {
            log.fail(SPECIFIED, NO_SECURITY_EXTENSION);
            log.fail(VALID, NO_SECURITY_EXTENSION);
            return;
        };

        let missing: Vec<&str> = OAUTH_ENDPOINTS
            .into_iter()
            .filter(|name| !uris.contains_key(*name))
            .collect();
        if missing.is_empty() {
            log.pass(SPECIFIED);
        } else {
            log.fail(
                SPECIFIED,
                format!(
                    "The conformance statement is missing the {} endpoint(s)",
                    missing.join(" and ")
                ),
            );
        }

        let invalid: Vec<&str> = OAUTH_ENDPOINTS
            .into_iter()
            .filter(|name| {
                uris.get(*name)
                    .is_some_and(|uri| Url::parse(uri).is_err())
            })
            .collect();
        if invalid.is_empty() {
            log.pass(VALID);
        } else {
            log.fail(
                VALID,
                format!("The {} endpoint(s) are invalid", invalid.join(" and ")),
            );
        }
    }
}
