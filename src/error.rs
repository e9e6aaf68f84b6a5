//! Error types shared by the ticket subsystem.

use thiserror::Error;

/// Failures reported by a [`crate::platform::ChatPlatform`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("platform error: {0}")]
    Other(String),
}

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ticket store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures surfaced by lifecycle, wizard and admin handlers.
#[derive(Debug, Error)]
pub enum TicketError {
    /// A referenced channel, role, panel or ticket no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requesting user already owns a live ticket.
    #[error("user already has an open ticket in channel {channel_id}")]
    AlreadyOpen { channel_id: u64 },

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A waiter's predicate never matched before its deadline.
    #[error("timed out waiting for a response")]
    TimedOut,

    #[error("unknown priority '{0}'")]
    InvalidPriority(String),

    #[error(transparent)]
    Io(#[from] StoreError),

    #[error("platform error: {0}")]
    Platform(String),
}

impl From<PlatformError> for TicketError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(what) => TicketError::NotFound(what),
            PlatformError::Forbidden(what) => TicketError::Forbidden(what),
            PlatformError::Other(what) => TicketError::Platform(what),
        }
    }
}

impl TicketError {
    /// Short message shown to the actor whose request failed.
    pub fn user_message(&self) -> String {
        match self {
            TicketError::NotFound(what) => format!("❌ {what} no longer exists."),
            TicketError::AlreadyOpen { channel_id } => {
                format!("❌ You already have an open ticket: <#{channel_id}>")
            }
            TicketError::Forbidden(_) => {
                "❌ You don't have permission to do that, or I am missing permissions.".to_string()
            }
            TicketError::TimedOut => "❌ Time's up, nothing was changed.".to_string(),
            TicketError::InvalidPriority(_) => format!(
                "❌ Please give a valid priority: {}",
                crate::catalog::Priority::ALL
                    .iter()
                    .map(|p| p.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TicketError::Io(_) | TicketError::Platform(_) => {
                "Sorry, I encountered an error processing your request. Please try again.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_errors_map_to_taxonomy() {
        assert!(matches!(
            TicketError::from(PlatformError::NotFound("channel 1".into())),
            TicketError::NotFound(_)
        ));
        assert!(matches!(
            TicketError::from(PlatformError::Forbidden("create channel".into())),
            TicketError::Forbidden(_)
        ));
        assert!(matches!(
            TicketError::from(PlatformError::Other("500".into())),
            TicketError::Platform(_)
        ));
    }

    #[test]
    fn test_already_open_message_links_channel() {
        let err = TicketError::AlreadyOpen { channel_id: 42 };
        assert!(err.user_message().contains("<#42>"));
    }

    #[test]
    fn test_invalid_priority_lists_choices() {
        let msg = TicketError::InvalidPriority("whenever".into()).user_message();
        assert!(msg.contains("low"));
        assert!(msg.contains("urgent"));
    }
}
