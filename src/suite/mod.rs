//! Registry, scheduling and execution of certification tests.

pub mod aggregate;
pub mod lifecycle;
pub mod registry;
pub mod runner;
pub mod scheduler;

pub use aggregate::{suite_verdict, test_verdict};
pub use lifecycle::{StatusCell, TestLifecycle};
pub use registry::{TestDescriptor, TestKind, TestRegistry, TestRegistryBuilder, standard_tests};
pub use runner::{Dispatcher, PlannedRun, StagedDispatcher, SuiteRun, TestExecutor};
pub use scheduler::{ExecutionPlan, StageMode, schedule};
