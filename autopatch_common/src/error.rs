use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of the three roots a [`AutoPatchError::MissingRoot`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSide {
    Left,
    Right,
    Output,
}

impl fmt::Display for RootSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootSide::Left => write!(f, "left"),
            RootSide::Right => write!(f, "right"),
            RootSide::Output => write!(f, "output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AutoPatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{side} root does not exist or is not a directory: {}", path.display())]
    MissingRoot { side: RootSide, path: PathBuf },

    #[error("Diff failed for {}: {reason}", path.display())]
    DiffInvocation { path: PathBuf, reason: String },

    #[error("Cannot write patch file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AutoPatchError {
    pub fn diff_invocation(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        AutoPatchError::DiffInvocation {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AutoPatchError>;
