//! Threshold evaluation and alert delivery
//!
//! [`AlertEvaluator`] turns a summary into triggered alerts; [`NotificationDispatcher`]
//! fans each alert out to the channels it names. Channel senders implement [`Notifier`]
//! and are looked up by name, so adding a channel never changes dispatch control flow.

mod dispatcher;
mod email;
mod evaluator;
mod slack;

pub use dispatcher::{DeliveryOutcome, DeliveryStatus, NotificationDispatcher, Notifier};
pub use email::EmailNotifier;
pub use evaluator::{evaluate, AlertEvaluator};
pub use slack::SlackNotifier;

/// Channel name of the chat webhook sender
pub const SLACK_CHANNEL: &str = "slack";
/// Channel name of the SMTP sender
pub const EMAIL_CHANNEL: &str = "email";
