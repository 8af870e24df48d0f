//! Argonaut and CMS profile schemas for the resources checked during
//! certification.
//!
//! The schemas are built once on first use and shared for the lifetime of the
//! process.

use once_cell::sync::Lazy;
use serde_json::json;

use super::schema::{Schema, SchemaType, required};
use crate::terminology::BindingStrength;
use crate::terminology::value_sets::{
    ADMINISTRATIVE_GENDER, LANGUAGE, LINK_TYPE, MARITAL_STATUS, PATIENT_CONTACT_RELATIONSHIP,
};

fn coding_is(system: &str, code: &str) -> Schema {
    Schema::new()
        .property(
            "coding",
            Schema::new().constant(json!([{ "system": system, "code": code }])),
        )
        .require(&["coding"])
}

fn value_presence(fields: &[&[&str]]) -> Vec<Schema> {
    fields.iter().map(|names| required(names)).collect()
}

fn identifiers() -> Schema {
    Schema::new()
        .min_items(1)
        .items(required(&["system", "value"]))
}

pub static PATIENT_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property("identifier", identifiers())
        .property(
            "name",
            Schema::new()
                .min_items(1)
                .items(required(&["family", "given"])),
        )
        .property(
            "gender",
            Schema::new().one_of_values(vec![
                json!("male"),
                json!("female"),
                json!("other"),
                json!("unknown"),
            ]),
        )
        .require(&["identifier", "name", "gender"])
});

pub static PATIENT_CMS: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property("identifier", identifiers())
        .property(
            "name",
            Schema::new()
                .min_items(1)
                .max_items(1)
                .items(required(&["family", "given", "use"])),
        )
        .property(
            "gender",
            Schema::new().one_of_values(vec![json!("male"), json!("female"), json!("other")]),
        )
        .require(&["identifier", "name", "gender", "address"])
});

/// Patient bindings plus the Argonaut and CMS profiles nested under `profiles`.
pub static PATIENT: Lazy<Schema> = Lazy::new(|| {
    patient_bindings()
        .profile("Argonaut patient", Some(PATIENT_ARGONAUT.clone()))
        .profile("CMS patient", Some(PATIENT_CMS.clone()))
});

/// Terminology bindings and references on the core Patient resource.
fn patient_bindings() -> Schema {
    let gender = || {
        Schema::new()
            .of_type(SchemaType::Code)
            .bind(ADMINISTRATIVE_GENDER.clone(), BindingStrength::Required)
    };
    let reference = || Schema::new().of_type(SchemaType::Reference);

    Schema::new()
        .property("gender", gender())
        .property(
            "maritalStatus",
            Schema::new()
                .of_type(SchemaType::CodeableConcept)
                .bind(MARITAL_STATUS.clone(), BindingStrength::Required),
        )
        .property(
            "contact",
            Schema::new().items(
                Schema::new()
                    .property(
                        "relationship",
                        Schema::new().items(
                            Schema::new()
                                .of_type(SchemaType::CodeableConcept)
                                .bind(
                                    PATIENT_CONTACT_RELATIONSHIP.clone(),
                                    BindingStrength::Extensible,
                                ),
                        ),
                    )
                    .property("gender", gender())
                    .property("organization", reference()),
            ),
        )
        .property(
            "communication",
            Schema::new().items(
                Schema::new().property(
                    "language",
                    Schema::new()
                        .of_type(SchemaType::CodeableConcept)
                        .bind(LANGUAGE.clone(), BindingStrength::Required),
                ),
            ),
        )
        .property("careProvider", Schema::new().items(reference()))
        .property("generalPractitioner", Schema::new().items(reference()))
        .property("managingOrganization", reference())
        .property(
            "link",
            Schema::new().items(
                Schema::new().property("other", reference()).property(
                    "type",
                    Schema::new()
                        .of_type(SchemaType::Code)
                        .bind(LINK_TYPE.clone(), BindingStrength::Required),
                ),
            ),
        )
}

pub static ALLERGIES_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    // DSTU2 carries `status` + `substance`, STU3 moved to `code`.
    Schema::new().one_of(vec![
        required(&["status", "substance"]),
        required(&["code"]),
    ])
});

pub static IMMUNIZATION_ARGONAUT: Lazy<Schema> = Lazy::new(|| required(&["date"]));

pub static LAB_RESULTS_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property(
            "category",
            Schema::new().contains(coding_is(
                "http://hl7.org/fhir/observation-category",
                "laboratory",
            )),
        )
        .require(&["category", "subject"])
        .one_of(value_presence(&[
            &["valueQuantity"],
            &["valueCodeableConcept"],
            &["valueString"],
            &["valueRange"],
            &["valueRatio"],
            &["valueSampledData"],
            &["valueAttachment"],
            &["valueTime"],
            &["valueDateTime"],
            &["valuePeriod"],
            &["dataAbsentReason"],
        ]))
});

pub static MEDICATION_ORDER_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .require(&["dateWritten", "status", "patient", "prescriber"])
        .one_of(value_presence(&[
            &["medicationCodeableConcept"],
            &["medicationReference"],
        ]))
});

pub static MEDICATION_REQUEST_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .require(&["authoredOn", "status", "subject", "requester"])
        .one_of(value_presence(&[
            &["medicationCodeableConcept"],
            &["medicationReference"],
        ]))
});

pub static MEDICATION_STATEMENT_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new().require(&["dateAsserted"]).one_of(value_presence(&[
        &["medicationCodeableConcept"],
        &["medicationReference"],
    ]))
});

pub static DOCUMENT_REFERENCE_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property(
            "content",
            Schema::new().items(
                Schema::new()
                    .property("attachment", required(&["contentType", "url"]))
                    .require(&["format"]),
            ),
        )
        .require(&["subject"])
});

pub static CONDITION_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    let entered_in_error = || {
        Schema::new()
            .property(
                "verificationStatus",
                Schema::new().constant(json!("entered-in-error")),
            )
            .require(&["verificationStatus"])
    };

    Schema::new().require(&["category"]).one_of(vec![
        entered_in_error().not(required(&["clinicalStatus"])),
        Schema::new()
            .not(entered_in_error())
            .require(&["clinicalStatus"]),
    ])
});

pub static PROCEDURE_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new().one_of(value_presence(&[
        &["performedDateTime"],
        &["performedPeriod"],
    ]))
});

pub static SMOKING_STATUS_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property("code", coding_is("http://loinc.org", "72166-2"))
        .require(&["subject", "issued", "valueCodeableConcept"])
});

pub static VITAL_SIGNS_ARGONAUT: Lazy<Schema> = Lazy::new(|| {
    Schema::new()
        .property(
            "category",
            Schema::new().min_items(1).max_items(1).contains(coding_is(
                "http://hl7.org/fhir/observation-category",
                "vital-signs",
            )),
        )
        .property(
            "related",
            Schema::new().items(
                Schema::new().property("type", Schema::new().constant(json!("has-member"))),
            ),
        )
        .property(
            "component",
            Schema::new().items(
                Schema::new()
                    .property("valueQuantity", required(&["value"]))
                    .one_of(value_presence(&[&["valueQuantity"], &["dataAbsentReason"]])),
            ),
        )
        .property("valueQuantity", required(&["value"]))
        .require(&["subject"])
        .one_of(value_presence(&[
            &["effectiveDateTime", "valueQuantity"],
            &["effectiveDateTime", "dataAbsentReason"],
            &["effectivePeriod", "valueQuantity"],
            &["effectivePeriod", "dataAbsentReason"],
        ]))
});
