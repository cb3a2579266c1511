//! tplscope - interactive expansion-tree debugger for wikitext templates
//!
//! The engine behind a template-debugging view: it keeps an in-memory tree
//! of unexpanded markup, lets the caller selectively evaluate or collapse
//! any subtree against a remote markup service, override placeholder values
//! and re-evaluate consistently, descend into called templates (and return
//! to any ancestor point), and undo evaluation actions - with at most one
//! asynchronous operation in flight at a time.
//!
//! All template semantics live in the remote service; this crate only
//! orchestrates when and what to ask it to expand. Start with
//! [`session::Session`] and the [`api::MarkupService`] trait.

pub mod api;
pub mod error;
pub mod nav;
pub mod params;
pub mod parsetree;
pub mod session;
pub mod transclude;
pub mod tree;
pub mod undo;
pub mod view;

pub use api::{ClientConfig, MarkupService, TemplateResolution, WikiClient};
pub use error::{EngineError, EngineResult, ServiceError, ServiceResult};
pub use session::{DescendOutcome, EvalOutcome, Session};
pub use transclude::extract_transclusion_body;
