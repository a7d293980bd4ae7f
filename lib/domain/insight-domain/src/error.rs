use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid quantity for {field}: {value:?}")]
    InvalidQuantity { field: &'static str, value: String },
    #[error("stack is missing {0}")]
    MissingIdentity(&'static str),
    #[error("invalid operator config: {0}")]
    InvalidConfig(String),
    #[error("failed to render {document}: {message}")]
    Render {
        document: &'static str,
        message: String,
    },
}
