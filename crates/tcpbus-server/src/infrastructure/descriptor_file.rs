//! Loading the TOML descriptor from disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::ServerDescriptor;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse descriptor {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("descriptor {} defines no instances", .0.display())]
    NoInstances(PathBuf),

    #[error("duplicate instance name \"{0}\"")]
    DuplicateInstance(String),
}

/// Reads and validates the descriptor at `path`.
///
/// # Errors
///
/// Returns [`DescriptorError`] if the file cannot be read, is not valid TOML,
/// defines no instances, or uses an instance name twice.
pub fn load_descriptor(path: &Path) -> Result<ServerDescriptor, DescriptorError> {
    let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_descriptor(&content, path)
}

/// Parses descriptor text.  `origin` is only used in error messages.
pub fn parse_descriptor(content: &str, origin: &Path) -> Result<ServerDescriptor, DescriptorError> {
    let descriptor: ServerDescriptor =
        toml::from_str(content).map_err(|source| DescriptorError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

    if descriptor.instances.is_empty() {
        return Err(DescriptorError::NoInstances(origin.to_path_buf()));
    }
    let mut seen = HashSet::new();
    for instance in &descriptor.instances {
        if !seen.insert(instance.name.as_str()) {
            return Err(DescriptorError::DuplicateInstance(instance.name.clone()));
        }
    }
    Ok(descriptor)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
