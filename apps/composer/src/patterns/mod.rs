// Pattern catalog: definitions, the immutable registry and its read-only API.

pub mod handlers;
pub mod models;
pub mod registry;
