use thiserror::Error;

pub type Result<T> = std::result::Result<T, CapabilitiesError>;

#[derive(Debug, Error)]
pub enum CapabilitiesError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status code {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Capabilities body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<CapabilitiesError>,
    },
}

impl From<reqwest::Error> for CapabilitiesError {
    fn from(err: reqwest::Error) -> Self {
        CapabilitiesError::Network(err.to_string())
    }
}
