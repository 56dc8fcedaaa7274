use crate::models::DeliveryMethod;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Outcome of one delivery attempt. Failure never rolls back the record the
/// notification was about; the record stays resendable.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub error: Option<String>,
}

/// Outbound notification message: a recipient, a named template, and the
/// template data. Rendering and transport are the sender's business.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub method: DeliveryMethod,
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

/// Black-box notification delivery (email/SMS providers live behind this).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: NotificationMessage) -> DeliveryOutcome;
}

/// Sender that only logs; the development and test default.
#[derive(Default)]
pub struct LoggingSender;

#[async_trait]
impl NotificationSender for LoggingSender {
    async fn send(&self, message: NotificationMessage) -> DeliveryOutcome {
        info!(
            method = ?message.method,
            recipient = %message.recipient,
            template = %message.template,
            "notification delivery (logging sender)"
        );
        DeliveryOutcome {
            success: true,
            error: None,
        }
    }
}
