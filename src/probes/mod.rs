//! Test variants run against the server under test.
//!
//! Every variant wraps a [`BaseTest`] and implements [`TestCase`]. The base
//! owns the shared skip checks and the audited requester; variants add their
//! own skip conditions and scenario lists on top.

pub mod base;
pub mod behavior;
pub mod capability;
pub mod conformance;
pub mod resource;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{CertifyConfig, ScenarioLog};
use crate::suite::registry::{TestDescriptor, TestKind};
use crate::transport::{AuthorizationFlowFactory, HttpClient, ResourceValidationService};

pub use base::BaseTest;
pub use behavior::{BehaviorKind, BehaviorProbe, Override, apply_overrides};
pub use capability::CapabilityStatement;
pub use conformance::ConformanceProbe;
pub use resource::{PostCheck, ResourceProbe, ResourceProbeSpec};

/// Run-wide settings and collaborators handed to every test instance.
#[derive(Clone)]
pub struct ProbeContext {
    pub config: Arc<CertifyConfig>,
    pub http: Arc<dyn HttpClient>,
    pub auth_flows: Arc<dyn AuthorizationFlowFactory>,
    pub validation: Arc<dyn ResourceValidationService>,
}

#[async_trait]
pub trait TestCase: Send + Sync {
    fn base(&self) -> &BaseTest;

    fn base_mut(&mut self) -> &mut BaseTest;

    /// Reason to skip this test, if any. Runs before [`TestCase::run`].
    async fn should_skip(&mut self) -> Option<String> {
        self.base_mut().should_skip().await
    }

    /// Execute every scenario, recording each into `log`.
    async fn run(&mut self, log: &mut ScenarioLog);
}

/// Build the test instance a descriptor describes.
pub async fn instantiate(descriptor: &TestDescriptor, ctx: &ProbeContext) -> Box<dyn TestCase> {
    let base = BaseTest::new(descriptor, ctx);
    match &descriptor.kind {
        TestKind::Conformance => Box::new(ConformanceProbe::new(base)),
        TestKind::Resource(spec) => Box::new(ResourceProbe::new(base, spec.clone(), ctx)),
        TestKind::Behavior(kind) => Box::new(BehaviorProbe::new(base, *kind, ctx).await),
    }
}
