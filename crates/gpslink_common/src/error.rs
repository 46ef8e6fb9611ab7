//! Error taxonomy for the gpslink lifecycle controller.
//!
//! Fatal conditions abort the current workflow step. Soft conditions
//! (a log rotator that cannot be found, a signal to a pid that already
//! exited) are never errors; they surface as warnings inside the
//! outcome structs of the installer and restart controller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("no release matches channel '{channel}': {reason}")]
    Resolution { channel: String, reason: String },

    #[error("download produced no usable archive: {0}")]
    Download(String),

    #[error("archive extraction failed: {0}")]
    Extraction(String),

    #[error("could not retire previous installation at {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not place new installation at {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not preserve configuration at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
