//! Azsite Core
//!
//! Typed binding for an Azure static website resource: argument and output
//! models, the registration shim with deferred outputs, and the machinery a
//! provider uses to converge child resources (differ, plan, interpreter).

pub mod component;
pub mod differ;
pub mod effect;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod options;
pub mod output;
pub mod plan;
pub mod provider;
pub mod reference;
pub mod resource;
pub mod schema;
pub mod website;

pub use component::Website;
pub use engine::{Context, Monitor, Urn};
pub use error::{Error, OutputError, ValidationError};
pub use options::ResourceOptions;
pub use output::Output;
pub use website::{WebsiteArgs, WebsiteSpec, WebsiteState};
