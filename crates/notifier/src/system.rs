use async_trait::async_trait;

use civic_common::types::{Channel, Recipient};

use crate::ChannelSender;
use crate::outcome::SendOutcome;

/// In-app channel. The ledger row itself is the delivery, so sending always
/// succeeds once the row exists.
pub struct SystemSender;

#[async_trait]
impl ChannelSender for SystemSender {
    fn channel(&self) -> Channel {
        Channel::System
    }

    async fn send(
        &self,
        recipient: &Recipient,
        _subject: Option<&str>,
        _message: &str,
    ) -> SendOutcome {
        tracing::debug!(
            recipient_type = %recipient.recipient_type,
            recipient_id = recipient.id,
            "System notification recorded"
        );
        SendOutcome::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_common::types::RecipientType;

    #[tokio::test]
    async fn test_system_always_succeeds() {
        let recipient = Recipient {
            id: 1,
            recipient_type: RecipientType::Business,
            display_name: "Osu Market Stall 4".to_string(),
            phone: None,
        };
        let outcome = SystemSender.send(&recipient, None, "Test").await;
        assert!(outcome.success);
        assert_eq!(SystemSender.channel(), Channel::System);
    }
}
