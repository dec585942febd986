use event_bus::HandlerOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event can never be processed as sent
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("search backend error: {0}")]
    Search(String),

    #[error("media processing failed: {0}")]
    Media(String),
}

impl From<HandlerError> for HandlerOutcome {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidEvent(_) => HandlerOutcome::fatal(err),
            _ => HandlerOutcome::retryable(err),
        }
    }
}

/// Outcome of a handler body that reports errors as `HandlerError`.
pub fn outcome(result: Result<(), HandlerError>) -> HandlerOutcome {
    match result {
        Ok(()) => HandlerOutcome::Ok,
        Err(err) => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_event_is_fatal() {
        let outcome = outcome(Err(HandlerError::InvalidEvent("empty audio".into())));
        assert_eq!(
            outcome,
            HandlerOutcome::Fatal("invalid event: empty audio".to_string())
        );
    }

    #[test]
    fn test_backend_errors_are_retryable() {
        let outcome = outcome(Err(HandlerError::Search("timeout".into())));
        assert!(matches!(outcome, HandlerOutcome::Retryable(_)));
        assert!(super::outcome(Ok(())).is_ok());
    }
}
