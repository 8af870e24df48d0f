//! Value sets referenced by the bundled certification profiles.

use once_cell::sync::Lazy;
use std::sync::Arc;

use super::ValueSet;

pub static ADMINISTRATIVE_GENDER: Lazy<Arc<ValueSet>> = Lazy::new(|| {
    Arc::new(
        ValueSet::new(
            "Administrative gender",
            "http://hl7.org/fhir/ValueSet/administrative-gender",
        )
        .with_codes(
            "http://hl7.org/fhir/administrative-gender",
            ["male", "female", "other", "unknown"],
        ),
    )
});

pub static MARITAL_STATUS: Lazy<Arc<ValueSet>> = Lazy::new(|| {
    Arc::new(
        ValueSet::new("Marital status", "http://hl7.org/fhir/ValueSet/marital-status")
            .with_codes("http://hl7.org/fhir/marital-status", ["U"])
            .with_codes(
                "http://hl7.org/fhir/v3/MaritalStatus",
                ["A", "D", "I", "L", "M", "P", "S", "T", "W"],
            )
            .with_codes("http://hl7.org/fhir/v3/NullFlavor", ["UNK"]),
    )
});

pub static PATIENT_CONTACT_RELATIONSHIP: Lazy<Arc<ValueSet>> = Lazy::new(|| {
    Arc::new(
        ValueSet::new(
            "Patient-contact relationship",
            "http://hl7.org/fhir/ValueSet/patient-contact-relationship",
        )
        .with_codes(
            "http://hl7.org/fhir/patient-contact-relationship",
            [
                "emergency",
                "family",
                "guardian",
                "friend",
                "partner",
                "work",
                "caregiver",
                "agent",
                "guarantor",
                "owner",
                "parent",
            ],
        ),
    )
});

// Only the common tags; a full BCP-47 registry is out of reach for a static table.
pub static LANGUAGE: Lazy<Arc<ValueSet>> = Lazy::new(|| {
    Arc::new(
        ValueSet::new("Language", "http://hl7.org/fhir/ValueSet/languages").with_codes(
            "urn:ietf:bcp:47",
            [
                "ar", "bn", "cs", "da", "de", "de-AT", "de-CH", "de-DE", "el", "en", "en-AU",
                "en-CA", "en-GB", "en-IN", "en-NZ", "en-SG", "en-US", "es", "es-AR", "es-ES",
                "es-UY", "fi", "fr", "fr-BE", "fr-CH", "fr-FR", "fy", "fy-NL", "hi", "hr", "it",
                "it-CH", "it-IT", "ja", "ko", "nl", "nl-BE", "nl-NL", "no", "no-NO", "pa", "pl",
                "pt", "pt-BR", "ru", "ru-RU", "sr", "sr-RS", "sv", "sv-SE", "te", "zh", "zh-CN",
                "zh-HK", "zh-SG", "zh-TW",
            ],
        ),
    )
});

pub static LINK_TYPE: Lazy<Arc<ValueSet>> = Lazy::new(|| {
    Arc::new(
        ValueSet::new("Link type", "http://hl7.org/fhir/ValueSet/link-type").with_codes(
            "http://hl7.org/fhir/link-type",
            ["replace", "refer", "seealso"],
        ),
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_membership() {
        assert!(ADMINISTRATIVE_GENDER.contains("female", None));
        assert!(MARITAL_STATUS.contains("UNK", Some("http://hl7.org/fhir/v3/NullFlavor")));
        assert!(PATIENT_CONTACT_RELATIONSHIP.contains("guardian", None));
        assert!(LANGUAGE.contains("en-US", Some("urn:ietf:bcp:47")));
        assert!(!LINK_TYPE.contains("replaced-by", None));
    }
}
