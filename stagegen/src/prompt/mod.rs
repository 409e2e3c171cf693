//! Prompt templates and their resolution.
//!
//! Templates use `{name}` placeholders:
//!
//! ```text
//! {base_prompt}
//!
//! ## Current Focus
//! Generate the backend API.
//! ```
//!
//! `{{` and `}}` render literal braces. A `{` that does not open a valid
//! placeholder (for example inside a JSON sample) is kept as-is.

mod loader;
mod template;

pub use loader::{load_template, parse_substitution, substitutions_from_pairs, Substitutions};
pub use template::{resolve, PromptTemplate, ResolvedPrompt};
