//! Output artifacts: one local file per executed command.
//!
//! Files are named `cmd_output_<ts>.txt` for single commands and
//! `cmd_multi_output_<index>_<ts>.txt` for batches, where `<ts>` is a local
//! timestamp with nanoseconds. Files are created with `create_new`, so an
//! existing file is never overwritten; a clash gets a numeric suffix.

use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::{File, OpenOptions};

use crate::error::{NetsshError, Result};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%.9f";
const MAX_NAME_CLASHES: u32 = 1000;

/// Why capture of a command's output stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// The remote side closed the stream.
    EndOfStream,
    /// Output went quiet for the inactivity window.
    Idle,
    /// The command's sentinel was seen.
    Sentinel,
    /// Output went quiet before the sentinel arrived; may be truncated.
    IdleBeforeSentinel,
    /// The stream closed before the sentinel arrived.
    StreamClosed,
}

impl Completion {
    /// Whether the output is known to be whole.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::EndOfStream | Self::Idle | Self::Sentinel)
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EndOfStream => "end of stream",
            Self::Idle => "idle",
            Self::Sentinel => "sentinel",
            Self::IdleBeforeSentinel => "idle before sentinel",
            Self::StreamClosed => "stream closed",
        };
        f.write_str(text)
    }
}

/// A file holding one command's captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Location of the file.
    pub path: PathBuf,
    /// Position in the batch, for multi-command execution.
    pub index: Option<usize>,
    /// Number of bytes written.
    pub bytes: u64,
    /// Why capture stopped.
    pub completion: Completion,
}

impl OutputArtifact {
    /// Read the captured output.
    pub async fn read_to_string(&self) -> Result<String> {
        NetsshError::with_io_context(
            tokio::fs::read_to_string(&self.path).await,
            format!("reading {}", self.path.display()),
        )
    }
}

/// Creates artifact files in one directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Store rooted at `dir`. Nothing touches the disk until a file is created.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a fresh file for a single command.
    pub async fn create_single(&self) -> Result<(PathBuf, File)> {
        self.create("cmd_output_").await
    }

    /// Create a fresh file for command `index` of a batch.
    pub async fn create_indexed(&self, index: usize) -> Result<(PathBuf, File)> {
        self.create(&format!("cmd_multi_output_{index}_")).await
    }

    async fn create(&self, prefix: &str) -> Result<(PathBuf, File)> {
        NetsshError::with_io_context(
            tokio::fs::create_dir_all(&self.dir).await,
            format!("creating output directory {}", self.dir.display()),
        )?;

        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        for clash in 0..MAX_NAME_CLASHES {
            let name = if clash == 0 {
                format!("{prefix}{stamp}.txt")
            } else {
                format!("{prefix}{stamp}_{clash}.txt")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), "Created output file");
                    return Ok((path, file));
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(NetsshError::io_context(
                        format!("creating {}", path.display()),
                        e,
                    ));
                }
            }
        }

        Err(NetsshError::io_context(
            format!("creating output file in {}", self.dir.display()),
            std::io::Error::new(IoErrorKind::AlreadyExists, "too many name clashes"),
        ))
    }
}
