//! # SMART Certify
//!
//! Certification engine for SMART-on-FHIR servers. It drives the OAuth2
//! authorization flow, probes resource endpoints and checks the returned
//! data against terminology bindings and clinical profiles, producing a
//! pass/warn/fail/skip outcome per scenario.
//!
//! ## Features
//!
//! - **Test registry**: built-in conformance, resource and OAuth behavior tests
//! - **Schema validation**: JSON Schema (via `jsonschema`) extended with
//!   clinical types and the `binding` / `profiles` keywords
//! - **Terminology**: value sets and binding checks for codes, codings and
//!   codeable concepts
//! - **Scheduling**: ordered stages of concurrent tests, ending with a serial
//!   stage for ungrouped tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smart_certify::*;
//! use std::sync::Arc;
//!
//! # async fn example(ctx: ProbeContext) -> Result<()> {
//! let registry = Arc::new(TestRegistry::standard()?);
//! let recorder = Arc::new(MemoryRecorder::new());
//! let suite = SuiteRun::new(registry, ctx, recorder.clone()).await?;
//! suite.dispatch(&StagedDispatcher::new()).await;
//!
//! let verdicts = recorder.reports().await.into_iter().filter_map(|r| r.verdict);
//! println!("suite {}", suite_verdict(verdicts));
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod probes;
pub mod storage;
pub mod suite;
pub mod terminology;
pub mod transport;
pub mod validation;

pub use crate::core::*;
pub use error::Result;
pub use error::{CertifyError, TransportError};
pub use probes::{ProbeContext, TestCase};
pub use storage::*;
pub use suite::{
    Dispatcher, ExecutionPlan, StageMode, StagedDispatcher, SuiteRun, TestDescriptor,
    TestExecutor, TestKind, TestRegistry, schedule, suite_verdict, test_verdict,
};
pub use terminology::{BindingError, BindingStrength, ValueSet};
pub use validation::{InvalidSchema, Schema, SchemaError, SchemaType, SchemaValidator};
