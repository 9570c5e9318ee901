use std::path::PathBuf;

use thiserror::Error;

/// Fatal conversion errors. Only these surface as a nonzero exit: everything
/// per-frame or per-pipeline is recovered locally and reported via logging.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("cannot open input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to build pipeline for profile '{profile}': {source}")]
    PipelineBuild {
        profile: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no pipeline survived construction")]
    NoPipelines,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Per-frame, per-pipeline errors. The dispatcher logs these, skips the
/// frame for the affected pipeline only, and keeps going.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transform failed: {0}")]
    Transform(#[source] anyhow::Error),

    #[error("encode failed: {0}")]
    Encode(#[source] anyhow::Error),
}
