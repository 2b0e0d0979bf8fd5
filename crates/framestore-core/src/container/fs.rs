//! Small filesystem helpers used by the container.
//!
//! Node records are replaced with write-then-rename so a crash never leaves
//! a half-written `_node.json` behind.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use snafu::ResultExt;

use super::error::{ContainerResult, IoSnafu};

/// Guard that removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; the caller is already handling another error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

pub(crate) fn create_dir_all(path: &Path) -> ContainerResult<()> {
    fs::create_dir_all(path).context(IoSnafu {
        path: path.display().to_string(),
    })
}

/// Write `contents` to `path` atomically: temp file, fsync, rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> ContainerResult<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .context(IoSnafu {
                path: tmp_path.display().to_string(),
            })?;
        file.write_all(contents).context(IoSnafu {
            path: tmp_path.display().to_string(),
        })?;
        file.sync_all().context(IoSnafu {
            path: tmp_path.display().to_string(),
        })?;
    }

    fs::rename(&tmp_path, path).context(IoSnafu {
        path: path.display().to_string(),
    })?;
    guard.disarm();
    Ok(())
}

pub(crate) fn read_bytes(path: &Path) -> ContainerResult<Vec<u8>> {
    fs::read(path).context(IoSnafu {
        path: path.display().to_string(),
    })
}

pub(crate) fn remove_file_if_exists(path: &Path) -> ContainerResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(IoSnafu {
            path: path.display().to_string(),
        }),
    }
}

pub(crate) fn remove_dir_all(path: &Path) -> ContainerResult<()> {
    fs::remove_dir_all(path).context(IoSnafu {
        path: path.display().to_string(),
    })
}

/// Subdirectory names of `dir`, sorted.
pub(crate) fn child_dirs(dir: &Path) -> ContainerResult<Vec<String>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).context(IoSnafu {
        path: dir.display().to_string(),
    })?;
    for entry in entries {
        let entry = entry.context(IoSnafu {
            path: dir.display().to_string(),
        })?;
        let file_type = entry.file_type().context(IoSnafu {
            path: entry.path().display().to_string(),
        })?;
        if file_type.is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

/// True if `dir` does not exist or has no entries.
pub(crate) fn is_empty_dir(dir: &Path) -> ContainerResult<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e).context(IoSnafu {
            path: dir.display().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() -> TestResult {
        let tmp = TempDir::new()?;
        let target = tmp.path().join("nested").join("_node.json");

        write_atomic(&target, b"first")?;
        write_atomic(&target, b"second")?;

        assert_eq!(read_bytes(&target)?, b"second");
        assert!(!target.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn child_dirs_are_sorted_and_skip_files() -> TestResult {
        let tmp = TempDir::new()?;
        create_dir_all(&tmp.path().join("b"))?;
        create_dir_all(&tmp.path().join("a"))?;
        fs::write(tmp.path().join("c.txt"), b"x")?;

        assert_eq!(child_dirs(tmp.path())?, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn empty_dir_probe() -> TestResult {
        let tmp = TempDir::new()?;
        assert!(is_empty_dir(tmp.path())?);
        assert!(is_empty_dir(&tmp.path().join("missing"))?);
        fs::write(tmp.path().join("f"), b"x")?;
        assert!(!is_empty_dir(tmp.path())?);
        Ok(())
    }
}
