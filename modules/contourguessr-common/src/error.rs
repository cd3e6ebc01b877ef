use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContourguessrError {
    #[error("Configuration error: {0}")]
    Config(String),
}
