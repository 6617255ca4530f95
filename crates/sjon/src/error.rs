//! Error types.
//!
//! Load failures are never returned from the viewer's public methods directly:
//! they flow through the `on_error` callback, the error overlay, and the
//! failure path of the [`LoadHandle`](crate::viewer::LoadHandle). Only
//! construction against a missing container fails synchronously.

use thiserror::Error;

/// Why a model (or environment map) failed to load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// No decoder is registered for the URL's extension.
    #[error("Unsupported model format: {url}")]
    UnsupportedFormat { url: String },

    /// The payload was fetched but could not be decoded.
    #[error("Failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    /// The payload could not be fetched.
    #[error("Failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    /// The decoder could not be started, e.g. no thread could be spawned.
    #[error("Failed to start loading {url}: {message}")]
    Spawn { url: String, message: String },
}

impl LoadError {
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn spawn(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }
}

/// Errors raised synchronously by viewer construction.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("container element not found: {selector}")]
    ContainerNotFound { selector: String },
}

/// Registering a decoder failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("extension {extension} is already covered by a registered decoder")]
    DuplicateExtension { extension: String },

    #[error("decoder declares no extensions")]
    NoExtensions,

    #[error("{extension} is not a recognized model extension")]
    UnknownExtension { extension: String },
}

/// The backend refused or failed to read back the rendered frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Readback is blocked, e.g. by a cross-origin texture taint.
    #[error("frame capture blocked: {0}")]
    Blocked(String),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),
}
