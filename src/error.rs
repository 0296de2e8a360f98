use thiserror::Error;

/// Errors produced while building a recommendation.
///
/// Only `Connectivity` and `InvalidInput` ever reach the caller of a pipeline
/// entry point. The remaining variants describe single-instrument failures,
/// which the fetch loop logs and skips.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The brokerage session could not be established (instrument listing failed).
    #[error("Failed to fetch data from broker: {0}")]
    Connectivity(String),

    /// User-supplied input was rejected before any network activity.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The brokerage answered with a failure, or the request never got an answer.
    /// `status` is 0 for transport-level failures.
    #[error("Request failed [CODE: {status}]: {message}")]
    Request { status: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Could not decode broker response: {0}")]
    Decode(String),
}

impl PipelineError {
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        PipelineError::Request { status, message: message.into() }
    }

    /// True for the conditions that abort a pipeline invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Connectivity(_) | PipelineError::InvalidInput(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PipelineError::Timeout(e.to_string())
        } else if e.is_decode() {
            PipelineError::Decode(e.to_string())
        } else {
            let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
            PipelineError::request(status, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_and_input_errors_are_fatal() {
        assert!(PipelineError::Connectivity("down".into()).is_fatal());
        assert!(PipelineError::InvalidInput("abc".into()).is_fatal());
        assert!(!PipelineError::request(500, "boom").is_fatal());
        assert!(!PipelineError::Timeout("slow".into()).is_fatal());
        assert!(!PipelineError::Decode("junk".into()).is_fatal());
    }

    #[test]
    fn request_error_message_carries_status() {
        let e = PipelineError::request(404, "not found");
        assert_eq!(e.to_string(), "Request failed [CODE: 404]: not found");
    }
}
