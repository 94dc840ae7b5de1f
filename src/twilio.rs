// src/twilio.rs
use crate::dispatch::SmsTransport;
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    /// Account SID (from env var if not provided)
    pub account_sid: Option<String>,
    /// Auth token (from env var if not provided)
    pub auth_token: Option<String>,
    /// From phone number (E.164 format)
    pub from_number: String,
    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Twilio API response for messages
#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    status: String,
    #[serde(default)]
    #[allow(dead_code)]
    error_code: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    error_message: Option<String>,
}

/// SMS transport backed by the Twilio REST API.
pub struct TwilioSms {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSms {
    pub fn new(config: TwilioConfig) -> Result<Self> {
        // Get credentials from config or environment
        let account_sid = config
            .account_sid
            .clone()
            .or_else(|| std::env::var("TWILIO_ACCOUNT_SID").ok())
            .ok_or_else(|| MonitorError::Config("TWILIO_ACCOUNT_SID not provided".into()))?;

        let auth_token = config
            .auth_token
            .clone()
            .or_else(|| std::env::var("TWILIO_AUTH_TOKEN").ok())
            .ok_or_else(|| MonitorError::Config("TWILIO_AUTH_TOKEN not provided".into()))?;

        if config.from_number.is_empty() {
            return Err(MonitorError::Config("Twilio from_number is required".into()));
        }

        // Validate phone number format
        if !config.from_number.starts_with('+') {
            return Err(MonitorError::Config(
                "Phone numbers must be in E.164 format (e.g., +1234567890)".into(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MonitorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            from_number: config.from_number,
        })
    }
}

#[async_trait]
impl SmsTransport for TwilioSms {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let mut params = HashMap::new();
        params.insert("To", phone_number);
        params.insert("From", self.from_number.as_str());
        params.insert("Body", message);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| MonitorError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::Transport(format!("Failed to read response: {}", e)))?;

        if status.is_success() {
            let msg: MessageResponse = serde_json::from_str(&body)
                .map_err(|e| MonitorError::Transport(format!("Invalid response: {}", e)))?;
            info!("SMS sent: SID={}, Status={}", msg.sid, msg.status);
            Ok(())
        } else {
            error!("SMS send failed: Status={}, Body={}", status, body);
            Err(MonitorError::Transport(format!("SMS send failed: {}", status)))
        }
    }
}

/// Transport used when `routing.send_sms` is disabled: matched alarms are
/// logged instead of sent, so routing can be exercised end to end without a
/// gateway account.
pub struct LogOnlySms;

#[async_trait]
impl SmsTransport for LogOnlySms {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
        info!(to = %phone_number, %message, "send_sms disabled, notification logged only");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_number_must_be_e164() {
        let config = TwilioConfig {
            account_sid: Some("ACxxx".into()),
            auth_token: Some("token".into()),
            from_number: "0701234567".into(),
            timeout_secs: 30,
        };
        assert!(TwilioSms::new(config).is_err());
    }

    #[test]
    fn from_number_is_required() {
        let config = TwilioConfig {
            account_sid: Some("ACxxx".into()),
            auth_token: Some("token".into()),
            from_number: String::new(),
            timeout_secs: 30,
        };
        assert!(TwilioSms::new(config).is_err());
    }
}
