
pub mod error;
pub mod types;
pub mod config;
pub mod pronunciation;
mod client;
pub mod encoder;
pub mod timing;
pub mod manifest;
pub mod timeline;
pub mod resolver;
pub mod pipeline;

pub mod deps {
    pub use serde_json;
    pub use serde;
}

pub use client::*;
pub use config::{AudioConfig, AudioFormat, EngineConfig, PipelineConfig, RenderConfig};
pub use manifest::{Manifest, ManifestBuilder, ManifestEntry};
pub use pipeline::Pipeline;
pub use pronunciation::PronunciationMap;
pub use timeline::{Timeline, TimelineParams, TimelineSegment};

pub use error::{
    ErrorDescription,
    GenericError,
};

#[non_exhaustive]
#[derive(Debug)]
pub enum PipelineErrorDescription {
    /// The engine answered with a non-success status.
    Service {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    /// The request never got a response.
    Transport(reqwest::Error),
    /// The engine answered, but not with a payload of the expected shape.
    InvalidResponse(String),
    /// ffmpeg exited unsuccessfully or could not be started.
    Encoding {
        status: Option<i32>,
        stderr: String,
    },
    EmptyManifest,
    InvalidInput(String),
    Io(std::io::Error),
    /// Any of the above, attributed to one line of the script.
    Line {
        index: usize,
        text: String,
        cause: Box<PipelineErrorDescription>,
    },
}

impl PipelineErrorDescription {
    pub fn for_line(self, index: usize, text: &str) -> Self {
        Self::Line {
            index,
            text: text.to_owned(),
            cause: Box::new(self),
        }
    }

    /// The failure with any line attribution stripped.
    pub fn root(&self) -> &Self {
        match self {
            Self::Line { cause, .. } => cause.root(),
            other => other,
        }
    }
}

impl ErrorDescription for PipelineErrorDescription {
    #[allow(refining_impl_trait)]
    fn description(&self) -> String {
        match self {
            Self::Service { endpoint, status, body } if body.is_empty() => {
                format!("{} failed: {}", endpoint, status)
            },
            Self::Service { endpoint, status, body } => {
                format!("{} failed: {} ({})", endpoint, status, body)
            },
            Self::Transport(e) => format!("engine request failed: {}", e),
            Self::InvalidResponse(msg) => format!("invalid engine response: {}", msg),
            Self::Encoding { status: Some(code), stderr } => {
                format!("ffmpeg exited with status {}: {}", code, stderr)
            },
            Self::Encoding { status: None, stderr } => format!("ffmpeg failed: {}", stderr),
            Self::EmptyManifest => "manifest has no entries".to_string(),
            Self::InvalidInput(msg) => format!("invalid input: {}", msg),
            Self::Io(e) => format!("io error: {}", e),
            Self::Line { index, text, cause } => {
                format!("line {} ({:?}): {}", index, text, cause.description())
            },
        }
    }

    fn code(&self) -> Option<i32> {
        match self {
            Self::Service { status, .. } => Some(*status as i32),
            Self::Encoding { status, .. } => *status,
            Self::Line { cause, .. } => cause.code(),
            _ => None,
        }
    }

    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Line { cause, .. } => cause.source(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Service { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Line { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}

pub type PipelineError = GenericError<PipelineErrorDescription>;

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::new(PipelineErrorDescription::Io(err))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(PipelineErrorDescription::Transport(err))
    }
}
