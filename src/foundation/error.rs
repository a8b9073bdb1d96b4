use std::path::{Path, PathBuf};

pub type FlowResult<T> = Result<T, FlowError>;

#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    /// Raw buffer is malformed or inconsistent with the declared resolution.
    #[error("decode error: {0}")]
    Decode(String),

    /// Archive entry is missing, out of sequence or unreadable.
    #[error("archive error: {0}")]
    Archive(String),

    /// Usage problem: a pattern matched nothing or a required file is absent.
    #[error("input error: {0}")]
    Input(String),

    /// Invalid configuration values.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error at '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn image(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Prefix a decode message with the frame it came from.
    pub fn in_frame(self, frame: impl std::fmt::Display) -> Self {
        match self {
            Self::Decode(msg) => Self::Decode(format!("frame {frame}: {msg}")),
            other => other,
        }
    }
}

/// Attach a path to `std::io` failures.
pub(crate) trait IoContext<T> {
    fn at_path(self, path: impl AsRef<Path>) -> FlowResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> FlowResult<T> {
        self.map_err(|e| FlowError::io(path, e))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
