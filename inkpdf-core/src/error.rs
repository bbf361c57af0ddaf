use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no document loaded")]
    NoDocument,
    #[error("no saved record named {0:?}")]
    NotFound(String),
    #[error("failed to load document: {0:#}")]
    Load(anyhow::Error),
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("failed to decode image: {0:#}")]
    Decode(anyhow::Error),
}

pub type EditorResult<T> = Result<T, EditorError>;
