//! # Driving Ports (Inbound API)
//!
//! Interfaces application code implements to receive messages, and the
//! publish primitive it is given in return.

use async_trait::async_trait;
use rs_01_p2p_schema::{Message, P2PMessage};

use crate::domain::{HandlerError, MessagingError, ValidationError, ValidationResult};

/// Validates messages of one type before they are delivered or forwarded.
///
/// An `Err` is logged once and counts as [`ValidationResult::Reject`].
#[async_trait]
pub trait MessageValidator<M: Message>: Send + Sync {
    async fn validate(&self, message: &M) -> Result<ValidationResult, ValidationError>;
}

/// Handles messages of one type after every validator on the topic accepted.
///
/// Returned messages are published by the messaging layer.
#[async_trait]
pub trait MessageHandler<M: Message>: MessageValidator<M> {
    async fn handle(&self, message: &M) -> Result<Vec<P2PMessage>, HandlerError>;
}

/// Typed publish primitive.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, message: P2PMessage) -> Result<(), MessagingError>;
}
