use std::sync::Arc;
use std::time::Duration;

use civic_common::config::AppConfig;
use civic_common::types::Channel;

use crate::ChannelSender;
use crate::composite::AllChannelsSender;
use crate::push::{DisabledPushGateway, HttpPushGateway, PushGateway, PushSender};
use crate::sms::{HttpSmsGateway, SimulatedSmsGateway, SmsGateway, SmsSender};
use crate::system::SystemSender;
use crate::timeout::TimedSender;

/// One sender per channel, selected by exhaustive match.
#[derive(Clone)]
pub struct ChannelRouter {
    push: Arc<dyn ChannelSender>,
    sms: Arc<dyn ChannelSender>,
    system: Arc<dyn ChannelSender>,
    all: Arc<dyn ChannelSender>,
}

impl ChannelRouter {
    /// Build a router from the two gateway-backed senders. `System` and the
    /// `All` composite are derived from them.
    pub fn new(push: Arc<dyn ChannelSender>, sms: Arc<dyn ChannelSender>) -> Self {
        let all: Arc<dyn ChannelSender> =
            Arc::new(AllChannelsSender::new(push.clone(), sms.clone()));
        Self {
            push,
            sms,
            system: Arc::new(SystemSender),
            all,
        }
    }

    /// Bound each gateway-backed sender by `timeout`. The `All` composite is
    /// rebuilt from the bounded legs, so one stalled leg cannot discard the
    /// other's result.
    pub fn with_send_timeout(&self, timeout: Duration) -> Self {
        Self::new(
            Arc::new(TimedSender::new(self.push.clone(), timeout)),
            Arc::new(TimedSender::new(self.sms.clone(), timeout)),
        )
    }

    pub fn from_gateways(
        push_gateway: Arc<dyn PushGateway>,
        sms_gateway: Arc<dyn SmsGateway>,
        country_code: &str,
    ) -> Self {
        Self::new(
            Arc::new(PushSender::new(push_gateway)),
            Arc::new(SmsSender::new(sms_gateway, country_code)),
        )
    }

    /// Wire up gateways from configuration.
    ///
    /// Without `PUSH_GATEWAY_URL` push sends fail as not configured; without
    /// `SMS_GATEWAY_URL` SMS is simulated.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.dispatch_send_timeout_secs);

        let push_gateway: Arc<dyn PushGateway> = match &config.push_gateway_url {
            Some(url) => Arc::new(HttpPushGateway::new(
                url.clone(),
                config.push_gateway_key.clone(),
                timeout,
            )?),
            None => {
                tracing::warn!("PUSH_GATEWAY_URL not set, push delivery disabled");
                Arc::new(DisabledPushGateway)
            }
        };

        let sms_gateway: Arc<dyn SmsGateway> = match &config.sms_gateway_url {
            Some(url) => Arc::new(HttpSmsGateway::new(
                url.clone(),
                config.sms_api_key.clone(),
                config.sms_sender_id.clone(),
                timeout,
            )?),
            None => {
                tracing::warn!("SMS_GATEWAY_URL not set, SMS delivery is simulated");
                Arc::new(SimulatedSmsGateway)
            }
        };

        Ok(Self::from_gateways(
            push_gateway,
            sms_gateway,
            &config.sms_country_code,
        ))
    }

    pub fn sender_for(&self, channel: Channel) -> &dyn ChannelSender {
        match channel {
            Channel::Push => self.push.as_ref(),
            Channel::Sms => self.sms.as_ref(),
            Channel::System => self.system.as_ref(),
            Channel::All => self.all.as_ref(),
        }
    }
}
