pub mod diagnostics;
pub mod k8s;
pub mod models;
pub mod refs;
pub mod resources;
pub mod schema;

pub use diagnostics::{DeprecationNotice, Diagnostics, TracingDiagnostics};
pub use models::{EnvironmentConfig, RawEnvironment, SpecError};
pub use schema::{EnvironmentSchema, SchemaOptions};
