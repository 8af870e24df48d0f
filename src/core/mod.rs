pub mod config;
pub mod types;

pub use config::{AuthConfig, CertifyConfig, ValidatorConfig};
pub use types::*;
