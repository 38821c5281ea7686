//! Lightly marked-up text to HTML pages, with presets and named drafts.

pub mod compiler;
pub mod completion;
pub mod config;
pub mod drafts;
pub mod preset;
pub mod rules;
pub mod store;
pub mod template;
pub mod theme;

pub use compiler::{compile_to_html_body, escape_html};
pub use rules::{MarkerMap, MarkerSpec, RulesConfig};
