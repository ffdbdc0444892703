use std::fmt;

/// Queue API call that produced a [`ConnectorError::QueueTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    Receive,
    Delete,
    ChangeVisibility,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Receive => "receive",
            Self::Delete => "delete",
            Self::ChangeVisibility => "change visibility",
        };
        f.write_str(name)
    }
}

/// Errors raised while moving messages between the queue and the gateway.
///
/// None of these stop the poll loop except [`ConnectorError::InvariantViolation`],
/// which the daemon treats as fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("queue {operation} failed: {message}")]
    QueueTransport {
        operation: QueueOperation,
        message: String,
    },

    #[error("invocation failed for topic '{topic}': {message}")]
    Invocation { topic: String, message: String },

    /// No function subscribes to the topic. The message is left to its
    /// visibility timeout instead of being reset.
    #[error("no functions registered for topic '{topic}'")]
    Unrouted { topic: String },

    #[error("queue client returned a message without {field}")]
    MalformedMessage { field: &'static str },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ConnectorError {
    pub fn queue(operation: QueueOperation, message: impl Into<String>) -> Self {
        Self::QueueTransport {
            operation,
            message: message.into(),
        }
    }

    pub fn invocation(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invocation {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Whether the daemon must stop when this error surfaces.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_transport_message_names_operation() {
        let err = ConnectorError::queue(QueueOperation::ChangeVisibility, "throttled");
        assert_eq!(err.to_string(), "queue change visibility failed: throttled");
        assert!(!err.is_fatal());
    }

    #[test]
    fn malformed_message_blames_queue_client() {
        let err = ConnectorError::MalformedMessage {
            field: "a receipt handle",
        };
        assert!(err.to_string().starts_with("queue client returned"));
    }

    #[test]
    fn only_invariant_violation_is_fatal() {
        assert!(ConnectorError::InvariantViolation("lost context".into()).is_fatal());
        assert!(!ConnectorError::invocation("orders", "connection refused").is_fatal());
        assert!(!ConnectorError::Unrouted {
            topic: "orders".into()
        }
        .is_fatal());
    }

    #[test]
    fn unrouted_names_topic() {
        let err = ConnectorError::Unrouted {
            topic: "billing".into(),
        };
        assert_eq!(err.to_string(), "no functions registered for topic 'billing'");
    }
}
