//! Channel senders for the notification dispatcher.
//!
//! Every sender reports a structured [`SendOutcome`] instead of an error, so
//! the caller can record a failure and move on to the next recipient.
//! Gateways are the external collaborators (push service, SMS carrier) the
//! senders talk to.

pub mod composite;
pub mod outcome;
pub mod phone;
pub mod push;
pub mod router;
pub mod sms;
pub mod system;
pub mod timeout;

use async_trait::async_trait;

use civic_common::types::{Channel, Recipient};

pub use outcome::{SendOutcome, any_succeeded};
pub use router::ChannelRouter;

/// A delivery channel: takes a recipient plus message and reports the outcome.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender delivers on.
    fn channel(&self) -> Channel;

    /// Deliver `message` to `recipient`. Never fails hard.
    async fn send(&self, recipient: &Recipient, subject: Option<&str>, message: &str)
    -> SendOutcome;
}
