//! Writing downloaded reports to disk.
//!
//! Files land in a single download directory. An existing file is never
//! overwritten: `report.csv` becomes `report (1).csv`, `report (2).csv`
//! and so on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from saving a download.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),
}

/// Upper bound on numbered variants tried for one name.
const MAX_SUFFIX: u32 = 10_000;

/// Target directory for downloaded reports.
#[derive(Debug, Clone)]
pub struct DownloadDir {
    root: PathBuf,
}

impl DownloadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Saves `data` under `file_name`, creating the directory if needed.
    ///
    /// Returns the path actually written.
    pub async fn save(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, SaveError> {
        validate_name(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        for n in 0..=MAX_SUFFIX {
            let candidate = self.root.join(numbered(file_name, n));
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await;
            match file {
                Ok(mut file) => {
                    file.write_all(data).await?;
                    file.flush().await?;
                    debug!(path = %candidate.display(), bytes = data.len(), "download saved");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(SaveError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("too many copies of {file_name}"),
        )))
    }
}

fn validate_name(name: &str) -> Result<(), SaveError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(SaveError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// `report.csv` with `n = 2` gives `report (2).csv`; `n = 0` is unchanged.
fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({n}){}", &name[..dot], &name[dot..]),
        _ => format!("{name} ({n})"),
    }
}
