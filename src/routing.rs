//! Maps a notification's type and priority onto its durable queue.
//!
//! Urgent traffic gets its own queue per channel. Every other priority shares
//! the channel's base queue and is consumed in arrival order.

use crate::models::notification::{NotificationType, Priority};

pub const EMAIL_QUEUE: &str = "notifications.email";
pub const EMAIL_URGENT_QUEUE: &str = "notifications.email.urgent";
pub const SMS_QUEUE: &str = "notifications.sms";
pub const SMS_URGENT_QUEUE: &str = "notifications.sms.urgent";
pub const PUSH_QUEUE: &str = "notifications.push";
pub const PUSH_URGENT_QUEUE: &str = "notifications.push.urgent";

/// Every queue the pipeline publishes to, declared durable at startup.
pub const ALL_QUEUES: [&str; 6] = [
    EMAIL_QUEUE,
    EMAIL_URGENT_QUEUE,
    SMS_QUEUE,
    SMS_URGENT_QUEUE,
    PUSH_QUEUE,
    PUSH_URGENT_QUEUE,
];

pub fn route(notification_type: NotificationType, priority: Priority) -> &'static str {
    let (base, urgent) = queues_for(notification_type);
    if priority == Priority::Urgent {
        urgent
    } else {
        base
    }
}

/// `(base, urgent)` queue pair a channel consumer binds to.
pub fn queues_for(notification_type: NotificationType) -> (&'static str, &'static str) {
    match notification_type {
        NotificationType::Email => (EMAIL_QUEUE, EMAIL_URGENT_QUEUE),
        NotificationType::Sms => (SMS_QUEUE, SMS_URGENT_QUEUE),
        NotificationType::Push => (PUSH_QUEUE, PUSH_URGENT_QUEUE),
    }
}
