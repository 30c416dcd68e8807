// Composition engine: plans pages, selects patterns, fills props, validates,
// migrates sections and resolves images.
// All generative calls go through llm_client; every stage has a deterministic fallback.

pub mod blueprint;
pub mod composer;
pub mod gap_filler;
pub mod handlers;
pub mod image_generator;
pub mod migration;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod prop_generator;
pub mod request;
pub mod selector;
pub mod styles;
pub mod validation;
