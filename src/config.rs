//! Site configuration document: `config.json` read, write, and the single
//! mutation the harness performs (pointing `form_backend_url` at the test
//! server's submission endpoint).
//!
//! The website defines arbitrary fields (title, subject, questions, ...) that
//! this harness never interprets; they are carried as order-preserving
//! passthrough so a written config is structurally identical to what was
//! loaded.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// File name of the site configuration inside a workspace or project dir.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Fixed submission route the generated form posts to.
pub const SUBMIT_ROUTE: &str = "/submit";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {CONFIG_FILE_NAME}: {0}")]
    Read(#[from] io::Error),

    #[error("malformed {CONFIG_FILE_NAME}: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// SiteConfig
// ---------------------------------------------------------------------------

/// The `config.json` document driving the generated form site.
///
/// Only `form_backend_url` is interpreted by the harness. Everything else the
/// site defines is kept verbatim (and in order, via `preserve_order`) in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Where the generated form posts its data. `None` (serialized as `null`)
    /// means the site has no backend wired up yet.
    pub form_backend_url: Option<String>,

    /// Site-defined fields passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteConfig {
    /// Load `config.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Surfaces the underlying I/O error when the file is missing and a parse
    /// error when it is malformed; fixture setup aborts on either.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(dir.join(CONFIG_FILE_NAME))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Serialize with 2-space indentation and overwrite `config.json` in `dir`.
    pub fn write(&self, dir: &Path) -> Result<(), ConfigError> {
        let pretty = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(CONFIG_FILE_NAME), pretty)?;
        Ok(())
    }

    /// Point the form backend at `http://localhost:<port>/submit` and persist
    /// the result into `dir`.
    pub fn set_backend_url(&mut self, dir: &Path, port: u16) -> Result<(), ConfigError> {
        let url = format!("http://localhost:{port}{SUBMIT_ROUTE}");
        tracing::debug!(%url, "redirecting form backend to test server");
        self.form_backend_url = Some(url);
        self.write(dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config() -> SiteConfig {
        serde_json::from_value(json!({
            "subject": "Test Form",
            "title": "A Test Form",
            "form_backend_url": null,
            "email": "foo@bar.com",
            "questions": [
                {"label": "Name", "name": "name", "type": "text", "required": true}
            ]
        }))
        .expect("sample config should parse")
    }

    #[test]
    fn load_after_write_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sample_config();

        config.write(dir.path()).expect("write");
        let loaded = SiteConfig::load(dir.path()).expect("load");

        assert_eq!(loaded, config);
    }

    #[test]
    fn passthrough_fields_keep_their_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_config().write(dir.path()).expect("write");

        let raw = fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let subject = raw.find("\"subject\"").expect("subject present");
        let title = raw.find("\"title\"").expect("title present");
        let email = raw.find("\"email\"").expect("email present");
        assert!(subject < title && title < email, "field order must survive");
    }

    #[test]
    fn written_config_uses_two_space_indent() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_config().write(dir.path()).expect("write");

        let raw = fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(
            raw.lines().any(|l| l.starts_with("  \"") && !l.starts_with("   ")),
            "expected 2-space indentation, got:\n{raw}"
        );
    }

    #[test]
    fn set_backend_url_updates_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = sample_config();

        config.set_backend_url(dir.path(), 5000).expect("set");

        assert_eq!(
            config.form_backend_url.as_deref(),
            Some("http://localhost:5000/submit")
        );
        let loaded = SiteConfig::load(dir.path()).expect("load");
        assert_eq!(
            loaded.form_backend_url.as_deref(),
            Some("http://localhost:5000/submit")
        );
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SiteConfig::load(dir.path()).expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Read(_)), "got: {err}");
    }

    #[test]
    fn load_malformed_json_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();
        let err = SiteConfig::load(dir.path()).expect_err("malformed file should fail");
        assert!(matches!(err, ConfigError::Parse(_)), "got: {err}");
    }

    #[test]
    fn null_backend_url_parses_as_none() {
        let config: SiteConfig =
            serde_json::from_value(json!({"form_backend_url": null})).expect("parse");
        assert!(config.form_backend_url.is_none());
    }
}
