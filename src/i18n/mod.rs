//! Supported translation languages.
//!
//! - `registry`: the fixed table of languages the adapter may target
//! - `language`: `Language`, a code that has been checked against the table
//!
//! Profile codes are free-form strings. They become a `Language` only when
//! the registry knows them; anything else means "deliver untranslated".

mod language;
mod registry;

pub use language::Language;
pub use registry::{LanguageConfig, LanguageRegistry};
