//! Delivery channel.
//!
//! The messaging platform sits behind [`DeliveryChannel`]. From the core's
//! point of view a delivery is fire-and-forget: a failure is logged and
//! counted, never retried and never fatal to the cycle.

use std::sync::Arc;

use crate::error::DeliveryError;
use crate::event::CanonicalEvent;
use crate::subscription::SubscriberId;

/// Payload handed to the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Shared between every subscriber notified about the same event.
    pub event: Arc<CanonicalEvent>,
    /// True when the event was seen before and its fingerprint changed.
    pub is_update: bool,
}

impl Notification {
    /// Wrap a dispatchable event.
    #[must_use]
    pub fn new(event: Arc<CanonicalEvent>, is_update: bool) -> Self {
        Self { event, is_update }
    }
}

/// Outbound messaging collaborator.
///
/// Implementations must be safe to call from several delivery workers at once.
pub trait DeliveryChannel: Send + Sync {
    /// Deliver one notification to one subscriber.
    fn deliver(&self, subscriber: &SubscriberId, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Channel that only writes each notification to the log.
///
/// Used by the one-shot runner and handy for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl DeliveryChannel for LogDelivery {
    fn deliver(&self, subscriber: &SubscriberId, notification: &Notification) -> Result<(), DeliveryError> {
        let event = &notification.event;
        tracing::info!(
            subscriber = %subscriber,
            event_id = %event.id,
            kind = %event.kind,
            status = %event.status,
            impact = %event.impact,
            title = %event.title,
            is_update = notification.is_update,
            "notification delivered"
        );
        Ok(())
    }
}
