//! Hierarchical node paths.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::{ContainerResult, InvalidPathSnafu};

/// An absolute, normalized node path such as `/`, `/df` or `/group/df`.
///
/// Keys are accepted with or without a leading `/`; empty segments are
/// collapsed. Segments starting with `_` are reserved for container
/// bookkeeping files and are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// The root group.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a user key into a normalized path.
    pub fn parse(key: &str) -> ContainerResult<Self> {
        let mut segments = Vec::new();
        for seg in key.split('/') {
            if seg.is_empty() {
                continue;
            }
            validate_segment(key, seg)?;
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    /// Child path `self/name`.
    pub fn join(&self, name: &str) -> ContainerResult<Self> {
        validate_segment(name, name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// True for `/`.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments from the root down.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &NodePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    pub(crate) fn to_fs(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for seg in &self.segments {
            out.push(seg);
        }
        out
    }
}

fn validate_segment(path: &str, seg: &str) -> ContainerResult<()> {
    let reason = if seg.is_empty() {
        Some("empty segment")
    } else if seg == "." || seg == ".." {
        Some("relative segments are not allowed")
    } else if seg.starts_with('_') {
        Some("segments starting with '_' are reserved")
    } else if seg.contains(['/', '\\', '\0']) {
        Some("segment contains a path separator")
    } else {
        None
    };
    match reason {
        Some(reason) => InvalidPathSnafu {
            path: path.to_string(),
            reason: reason.to_string(),
        }
        .fail(),
        None => Ok(()),
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}
