//! Site - Discover the files that make up a site payload

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Content type used when the extension says nothing
pub const FALLBACK_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Site path {0} does not exist")]
    NotFound(PathBuf),

    #[error("Site path {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One file to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    /// Path relative to the site root, `/`-separated
    pub path: String,
    pub source: PathBuf,
    pub content_type: String,
    /// SHA-256 of the contents, lowercase hex
    pub content_hash: String,
}

/// Collect every file under `root`, sorted by relative path
pub fn discover(root: &Path) -> Result<Vec<SiteFile>, SiteError> {
    if !root.exists() {
        return Err(SiteError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(SiteError::NotADirectory(root.to_path_buf()));
    }

    let mut sources = Vec::new();
    walk(root, &mut sources)?;

    let mut files = sources
        .into_iter()
        .map(|source| site_file(root, source))
        .collect::<Result<Vec<_>, _>>()?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Hidden entries (dotfiles and dot-directories) are left out, and
/// symlinked directories are not followed.
fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), SiteError> {
    let io_error = |source: std::io::Error| SiteError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| SiteError::Io {
            path: path.clone(),
            source,
        })?;
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if file_type.is_symlink() {
            if path.is_file() {
                out.push(path);
            } else {
                log::debug!("skipping {}", path.display());
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn site_file(root: &Path, source: PathBuf) -> Result<SiteFile, SiteError> {
    let contents = fs::read(&source).map_err(|e| SiteError::Io {
        path: source.clone(),
        source: e,
    })?;
    let relative = source.strip_prefix(root).unwrap_or(&source);
    let path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(SiteFile {
        content_type: content_type(&path),
        content_hash: content_hash(&contents),
        path,
        source,
    })
}

/// Content type from the file extension
pub fn content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

pub fn content_hash(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}
