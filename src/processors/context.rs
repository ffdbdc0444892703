use crate::error::ConnectorError;
use crate::queue::QueueMessage;
use tokio::sync::OwnedSemaphorePermit;
use tracing::Span;

/// Per-message metadata carried across the invocation boundary.
///
/// Built once by the dispatcher, moved into the invoker, handed back inside
/// the outcome and consumed by the response processor. Not `Clone`: the
/// in-flight permit it holds is released when it is dropped.
#[derive(Debug)]
pub struct CorrelationContext {
    span: Span,
    message_id: String,
    receipt_handle: String,
    in_flight: Option<OwnedSemaphorePermit>,
}

impl CorrelationContext {
    /// Attach the in-flight permit that must outlive the invocation.
    pub fn with_in_flight_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.in_flight = Some(permit);
        self
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }
}

/// Capture identifier and receipt handle of a received message and bind a
/// span carrying `message_id`.
pub fn build(message: &QueueMessage) -> Result<CorrelationContext, ConnectorError> {
    let message_id = message
        .message_id
        .clone()
        .ok_or(ConnectorError::MalformedMessage {
            field: "a message id",
        })?;
    let receipt_handle =
        message
            .receipt_handle
            .clone()
            .ok_or(ConnectorError::MalformedMessage {
                field: "a receipt handle",
            })?;

    Ok(CorrelationContext {
        span: tracing::info_span!("sqs_message", message_id = %message_id),
        message_id,
        receipt_handle,
        in_flight: None,
    })
}

/// Recover span, message id and receipt handle from an outcome's context.
///
/// An outcome without a context means the invoker broke its contract; there is
/// no receipt handle left to act on.
pub fn unpack(
    context: Option<&CorrelationContext>,
) -> Result<(&Span, &str, &str), ConnectorError> {
    let context = context.ok_or_else(|| {
        ConnectorError::InvariantViolation(
            "invocation outcome carries no correlation context".into(),
        )
    })?;
    Ok((&context.span, &context.message_id, &context.receipt_handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    fn message(id: Option<&str>, receipt: Option<&str>) -> QueueMessage {
        QueueMessage {
            message_id: id.map(str::to_string),
            receipt_handle: receipt.map(str::to_string),
            ..QueueMessage::default()
        }
    }

    #[test]
    fn build_captures_id_and_receipt_handle() {
        let ctx = build(&message(Some("m-1"), Some("AQEB+rh/1=="))).unwrap();
        assert_eq!(ctx.message_id(), "m-1");
        assert_eq!(ctx.receipt_handle(), "AQEB+rh/1==");
    }

    #[test]
    fn build_rejects_missing_message_id() {
        let err = build(&message(None, Some("rh"))).unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::MalformedMessage {
                field: "a message id"
            }
        ));
    }

    #[test]
    fn build_rejects_missing_receipt_handle() {
        let err = build(&message(Some("m-1"), None)).unwrap_err();
        assert!(err.to_string().contains("receipt handle"));
    }

    #[test]
    fn unpack_returns_original_receipt_handle() {
        let ctx = build(&message(Some("m-2"), Some("rh-2"))).unwrap();
        let (_, id, receipt) = unpack(Some(&ctx)).unwrap();
        assert_eq!(id, "m-2");
        assert_eq!(receipt, "rh-2");
    }

    #[test]
    fn unpack_without_context_is_invariant_violation() {
        let err = unpack(None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn dropping_context_releases_in_flight_permit() {
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = Arc::clone(&semaphore).try_acquire_owned().unwrap();
        let ctx = build(&message(Some("m-3"), Some("rh-3")))
            .unwrap()
            .with_in_flight_permit(permit);
        assert_eq!(semaphore.available_permits(), 0);

        drop(ctx);
        assert_eq!(semaphore.available_permits(), 1);
    }
}
