use std::sync::Arc;

use async_trait::async_trait;

use civic_common::types::{Channel, Recipient};

use crate::ChannelSender;
use crate::outcome::{SendOutcome, any_succeeded};

/// The `All` channel: Push and SMS attempted independently, success if either
/// one delivers.
pub struct AllChannelsSender {
    push: Arc<dyn ChannelSender>,
    sms: Arc<dyn ChannelSender>,
}

impl AllChannelsSender {
    pub fn new(push: Arc<dyn ChannelSender>, sms: Arc<dyn ChannelSender>) -> Self {
        Self { push, sms }
    }
}

#[async_trait]
impl ChannelSender for AllChannelsSender {
    fn channel(&self) -> Channel {
        Channel::All
    }

    async fn send(
        &self,
        recipient: &Recipient,
        subject: Option<&str>,
        message: &str,
    ) -> SendOutcome {
        let (push, sms) = tokio::join!(
            self.push.send(recipient, subject, message),
            self.sms.send(recipient, subject, message),
        );

        any_succeeded([push.labelled("push"), sms.labelled("sms")])
    }
}
