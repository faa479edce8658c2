//! Path sandbox: confines every filesystem touch to one root directory.
//!
//! The default check is lexical. A path is accepted iff it starts with the
//! configured root and contains none of the forbidden substrings. The
//! substring match is coarse: `/data/foo..bar` is rejected just
//! like `/data/foo/../bar`.
//!
//! `Containment::Canonical` adds a second pass that resolves symlinks on the
//! longest existing ancestor and requires the result to stay under the
//! canonical root.
//!
//! Subprocesses started by the executor are NOT confined by this module;
//! for them the root is only the working directory.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::{Containment, SandboxConfig};
use crate::error::{DispatchError, Result};

/// Immutable confinement policy, built once at startup.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: String,
    forbidden: Vec<String>,
    containment: Containment,
}

impl PathSandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            root: config.root.clone(),
            forbidden: config.forbidden.clone(),
            containment: config.containment,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns `path` unchanged if it is confined to the root.
    pub fn validate<'a>(&self, path: &'a str) -> Result<&'a str> {
        if path == "/" {
            return Err(self.deny(path, "the filesystem root is not accessible"));
        }

        if let Some(token) = self.forbidden.iter().find(|t| path.contains(t.as_str())) {
            return Err(self.deny(path, &format!("path contains forbidden token '{token}'")));
        }

        if !path.starts_with(&self.root) {
            return Err(self.deny(path, &format!("access outside {} is forbidden", self.root)));
        }

        if self.containment == Containment::Canonical {
            self.check_canonical(path)?;
        }

        Ok(path)
    }

    /// Validates every path, failing on the first rejected one.
    pub fn validate_all(&self, paths: &[&str]) -> Result<()> {
        for path in paths {
            self.validate(path)?;
        }
        Ok(())
    }

    fn check_canonical(&self, path: &str) -> Result<()> {
        let root = Path::new(&self.root)
            .canonicalize()
            .map_err(|e| self.deny(path, &format!("sandbox root cannot be resolved: {e}")))?;

        let resolved = resolve_existing_prefix(Path::new(path))
            .map_err(|e| self.deny(path, &format!("path cannot be resolved: {e}")))?;

        if !resolved.starts_with(&root) {
            return Err(self.deny(
                path,
                &format!("path resolves to {} outside the sandbox", resolved.display()),
            ));
        }
        Ok(())
    }

    fn deny(&self, path: &str, reason: &str) -> DispatchError {
        warn!(path = %path, "Sandbox rejected path: {reason}");
        DispatchError::AccessDenied(format!("{path}: {reason}"))
    }
}

/// Canonicalizes the longest existing ancestor and re-appends the missing tail.
fn resolve_existing_prefix(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
