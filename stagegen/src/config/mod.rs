//! Generator configuration.
//!
//! Configuration is an explicit value handed to the components that need it;
//! there is no process-wide configuration state. Values come from an optional
//! TOML file and are then overridden by CLI flags.

mod credentials;
mod model;

pub use credentials::{load_credential, load_credential_with, ApiKey};
pub use model::{GeneratorConfig, DEFAULT_API_KEY_ENV, DEFAULT_MODEL};
