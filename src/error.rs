use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// No API credential in the environment. Fatal at startup.
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    #[error("failed to read image {}: {source}", .path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a base64 data URI")]
    InvalidDataUri,

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("empty response")]
    EmptyResponse,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the conversation store refused a submit. State is untouched in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("nothing to send")]
    Empty,
    #[error("a request is already in flight")]
    Busy,
}
