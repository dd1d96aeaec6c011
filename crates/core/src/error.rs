use crate::telemetry::MalformedPayload;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed payload: {0}")]
    Malformed(#[from] MalformedPayload),
}
