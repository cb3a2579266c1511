//! Remote markup service boundary: wire types, service trait, HTTP client.

pub mod client;
pub mod types;

pub use client::{ClientConfig, WikiClient};
pub use types::{MarkupService, TemplateResolution};
