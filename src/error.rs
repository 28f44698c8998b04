//! Error taxonomy for the rehosting pipeline.
//!
//! One variant per §7 of the design: each carries enough context to explain
//! itself and is matched by the orchestrator to decide abort-this-image vs.
//! fatal-at-startup.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RehostError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("extractor failed for {input}: {reason}")]
    Extraction { input: PathBuf, reason: String },

    #[error("could not infer architecture or endianness for {image}")]
    Inference { image: PathBuf },

    #[error("incompatible target: {arch:?}/{endianness:?} is not a supported emulation target")]
    IncompatibleTarget {
        arch: crate::firmware_image::Architecture,
        endianness: crate::firmware_image::Endianness,
    },

    #[error("catalog operation failed: {0}")]
    Catalog(String),

    #[error("image build failed at {stage}: {reason}")]
    ImageBuild { stage: String, reason: String },

    #[error("rewrite step '{step}' failed: {reason}")]
    Rewrite { step: String, reason: String },

    #[error("path error: {0}")]
    Path(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RehostError>;
