//! Test-fixture harness for a config-driven static form website.
//!
//! Browser-automation suites need a real site to drive: this crate copies the
//! website source into isolated temporary workspaces, rewrites each copy's
//! `config.json` so the generated form posts back to the harness itself, and
//! serves the workspace over a local HTTP server whose `/submit` endpoint
//! echoes processed form data as HTML for assertion.
//!
//! # Components
//!
//! - [`workspace`] — per-scope copies of the website source
//! - [`config`] — `config.json` load/write and the backend-URL patch
//! - [`server`] — thread-backed static site server with the submission route
//! - [`form`] — multi-valued field decoding, merging, and response rendering
//! - [`fixtures`] — session- and function-scoped lifecycle composition
//! - [`logging`] — stderr tracing setup
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use formsite_harness::fixtures::SiteFixture;
//!
//! let fixture = SiteFixture::function(Path::new("website")).expect("fixture");
//! let url = fixture.base_url();
//! // ... drive a browser against `url`, post the form to /submit ...
//! drop(fixture); // server stops, workspace removed
//! ```

pub mod config;
pub mod fixtures;
pub mod form;
pub mod logging;
pub mod server;
pub mod workspace;

pub use config::SiteConfig;
pub use fixtures::SiteFixture;
pub use server::SiteServer;
