use crate::error::{check_status, ServiceError};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Outbound text messages to a phone. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> Result<(), ServiceError>;
}

pub struct TwilioSms {
    http_client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    timeout: Duration,
}

impl TwilioSms {
    pub fn new(
        http_client: reqwest::Client,
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            account_sid,
            auth_token,
            from_number,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for TwilioSms {
    async fn send_message(&self, to: &str, body: &str) -> Result<(), ServiceError> {
        const SERVICE: &str = "twilio-sms";
        let account_sid = &self.account_sid;
        let url =
            format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json");
        let mut form = HashMap::new();
        form.insert("From", self.from_number.as_str());
        form.insert("To", to);
        form.insert("Body", body);
        let resp = self
            .http_client
            .post(url)
            .basic_auth(account_sid, Some(&self.auth_token))
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        debug!(twilio_resp=?resp.status(), to, "sent sms");
        Ok(())
    }
}
