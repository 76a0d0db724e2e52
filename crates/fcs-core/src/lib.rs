//! Functional conformance suite core.
//!
//! Verifies a banking API implementation against the Open-Banking read/write
//! specifications (account information, payment initiation, funds
//! confirmation):
//!
//! - [`conditionality`] and [`specification`]: static catalogues of what each
//!   specification requires
//! - [`discovery`]: the operator's discovery document and its validator
//! - [`swagger`]: OpenAPI/Swagger loading with a per-URL cache
//! - [`generator`]: discovery + swagger → ordered test cases
//! - [`permissions`]: the minimum set of consent bundles covering a plan
//! - [`engine`]: sequential execution of a plan against the live target
//! - [`journey`]: the stateful session wiring the above together
//!
//! # Quick Start
//!
//! ```no_run
//! use fcs_core::journey::{Journey, JourneyDeps};
//!
//! # async fn example(doc: serde_json::Value) -> anyhow::Result<()> {
//! let journey = Journey::new(JourneyDeps::builtin()?);
//! journey.set_discovery_model(&doc).await?;
//! for spec in journey.test_cases().await?.iter() {
//!     println!("{}: {} cases", spec.api_specification.name, spec.test_cases.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod conditionality;
pub mod config;
pub mod context;
pub mod discovery;
pub mod engine;
pub mod generator;
pub mod journey;
pub mod json_path;
pub mod model;
pub mod oauth;
pub mod paths;
pub mod permissions;
pub mod report;
pub mod signing;
pub mod specification;
pub mod swagger;
pub mod transport;
pub mod version;

pub use conditionality::{Conditionality, ConditionalityCatalogue, MethodPath, StaticCatalogue};
pub use config::{Certificates, ConfigError, JourneyConfig};
pub use context::{Context, UnresolvedVariable};
pub use discovery::{Discovery, DiscoveryValidator, Validation, ValidationFailure};
pub use engine::{CaseFailure, FailureKind, RunEvent, RunPolicy, Runner, TestCaseResult};
pub use generator::Generator;
pub use journey::{Journey, JourneyDeps, JourneyError, Phase, ResultStream};
pub use model::{SpecificationTestCases, TestCase};
pub use permissions::{PermissionPlanner, PermissionTable, SpecConsentRequirements};
pub use specification::{SpecRegistry, Specification};
pub use swagger::{SchemaError, SwaggerDoc, SwaggerLoader, SwaggerSource};

/// User agent sent on every outbound request.
pub const USER_AGENT: &str = concat!("fcs/", env!("CARGO_PKG_VERSION"));
