//! Lifecycle fixtures: composition of workspace, config, and server into the
//! two scopes browser tests run against.
//!
//! A session fixture is built once and shared (read-only, as a running server)
//! by every test in the session; a function fixture is built and torn down per
//! test. Each scope owns its own workspace directory, so config mutation in
//! one scope can never race another.
//!
//! Scope lifecycle, in order: temp root created → workspace provisioned →
//! config patched with the server's submission URL → server constructed →
//! server started → tests drive `base_url()` → server stops → workspace
//! removed. No transitions back.

use std::path::{Path, PathBuf};

use rand::Rng;
use tempfile::TempDir;
use thiserror::Error;

use crate::config::{ConfigError, SiteConfig, SUBMIT_ROUTE};
use crate::server::{RunningServer, ServerError, SiteServer};
use crate::workspace::{self, WorkspaceError, WEBSITE_FILES};

/// Fixed well-known port used by the session-scoped server.
pub const SESSION_PORT: u16 = 5000;

/// Inclusive range the function-scoped port is drawn from.
pub const FUNCTION_PORT_RANGE: std::ops::RangeInclusive<u16> = 5001..=65535;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Any failure during fixture setup. Setup aborts on the first error; the
/// partially built scope is dropped (and its temp root removed) on unwind.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("temp root creation failed: {0}")]
    TempRoot(#[from] std::io::Error),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

// ---------------------------------------------------------------------------
// Port selection
// ---------------------------------------------------------------------------

/// Pick a pseudo-random port for a function-scoped server.
///
/// Best-effort collision avoidance across parallel test runs; a bind failure
/// on an occupied port propagates without retry.
pub fn random_port() -> u16 {
    rand::thread_rng().gen_range(FUNCTION_PORT_RANGE)
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A fully initialized test scope: private workspace + patched config +
/// running server.
///
/// Dropping the fixture stops the server (joining its accept thread), then
/// removes the temp root and the workspace inside it. Field order matters:
/// `server` is declared before `temp_root` so shutdown happens before the
/// serving directory disappears.
#[derive(Debug)]
pub struct SiteFixture {
    server: RunningServer,
    workspace: PathBuf,
    config: SiteConfig,
    temp_root: TempDir,
}

impl SiteFixture {
    fn build(project_dir: &Path, port: u16) -> Result<Self, FixtureError> {
        crate::logging::init();

        let temp_root = TempDir::new()?;
        let workspace = workspace::provision(project_dir, temp_root.path(), &WEBSITE_FILES)?;

        let mut config = SiteConfig::load(project_dir)?;
        config.set_backend_url(&workspace, port)?;

        let server = SiteServer::new(&workspace, port, SUBMIT_ROUTE).start()?;

        tracing::info!(port, workspace = %workspace.display(), "site fixture ready");
        Ok(Self {
            server,
            workspace,
            config,
            temp_root,
        })
    }

    /// Build a session-scoped fixture on the fixed well-known port.
    ///
    /// Intended to be constructed once (e.g. behind `OnceLock`) and shared by
    /// every test in the session.
    pub fn session(project_dir: &Path) -> Result<Self, FixtureError> {
        Self::build(project_dir, SESSION_PORT)
    }

    /// Build a function-scoped fixture on a pseudo-random high port.
    ///
    /// Construct one per test and let it drop at the end of the test.
    pub fn function(project_dir: &Path) -> Result<Self, FixtureError> {
        Self::build(project_dir, random_port())
    }

    /// Base URL of the running server, e.g. `http://localhost:5000`.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.server.port())
    }

    /// Full URL for a path on the running server.
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    /// Bound server port.
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// The scope's private workspace directory.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The patched configuration served from this workspace.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Whether the server is accepting connections.
    pub fn is_healthy(&self) -> bool {
        self.server.is_healthy()
    }

    /// Root owning the workspace; removed when the fixture drops.
    pub fn temp_root(&self) -> &Path {
        self.temp_root.path()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
