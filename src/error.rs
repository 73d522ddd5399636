//! Error taxonomy for promoscrape.
//!
//! Validation errors are rejected synchronously at submission and never
//! become job failures; every other variant is captured into the failing
//! job's record by the scheduler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Malformed request, rejected before any job exists.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The target resolved to no real content.
    #[error("not found: {0}")]
    NotFound(String),

    /// Navigation, selector, or filter failure inside browser automation.
    #[error("automation failure: {0}")]
    Automation(String),

    /// A bounded wait or the aggregation deadline elapsed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The durable store or another backing service is unavailable.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl ScrapeError {
    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Automation(_) | Self::Timeout(_) | Self::Infrastructure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ScrapeError::Automation("x".into()).is_transient());
        assert!(ScrapeError::Timeout("x".into()).is_transient());
        assert!(ScrapeError::Infrastructure("x".into()).is_transient());
        assert!(!ScrapeError::Validation("x".into()).is_transient());
        assert!(!ScrapeError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn messages_carry_context() {
        let e = ScrapeError::NotFound("campaign x1 did not render a headline".into());
        assert!(e.to_string().contains("x1"));
    }
}
