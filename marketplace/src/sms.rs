//! Outbound SMS for phone verification codes.
//!
//! [`ConsoleSmsSender`] logs messages instead of sending them (local runs);
//! [`TwilioSmsSender`] posts to the Twilio Messages API.

use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`SmsSender::send`].
pub type SmsFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SmsError>> + Send + 'a>>;

/// Errors that can occur when sending an SMS.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// HTTP request failed
    #[error("SMS request failed: {0}")]
    RequestFailed(String),

    /// Provider refused the message
    #[error("SMS provider error (status {status}): {message}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Error body from the provider
        message: String,
    },
}

/// Sends text messages.
pub trait SmsSender: Send + Sync {
    /// Send `body` to the E.164 number `to`.
    fn send(&self, to: String, body: String) -> SmsFuture<'_>;
}

/// Writes messages to the log. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSmsSender;

impl SmsSender for ConsoleSmsSender {
    fn send(&self, to: String, body: String) -> SmsFuture<'_> {
        Box::pin(async move {
            tracing::info!(%to, %body, "SMS (console sender)");
            Ok(())
        })
    }
}

/// Twilio account settings.
#[derive(Debug, Clone)]
pub struct TwilioOptions {
    /// Account SID
    pub account_sid: String,
    /// Auth token
    pub auth_token: String,
    /// Sending number
    pub from: String,
}

/// Sends through the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioSmsSender {
    client: Client,
    options: TwilioOptions,
    api_url: String,
}

impl TwilioSmsSender {
    /// Sender against the public Twilio API.
    #[must_use]
    pub fn new(options: TwilioOptions) -> Self {
        Self::with_api_url(options, "https://api.twilio.com")
    }

    /// Sender against another base URL (tests, proxies).
    #[must_use]
    pub fn with_api_url(options: TwilioOptions, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            options,
            api_url: api_url.into(),
        }
    }
}

impl SmsSender for TwilioSmsSender {
    fn send(&self, to: String, body: String) -> SmsFuture<'_> {
        Box::pin(async move {
            let url = format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.api_url, self.options.account_sid
            );
            let form = [("To", to.as_str()), ("From", self.options.from.as_str()), ("Body", body.as_str())];

            let response = self
                .client
                .post(url)
                .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
                .form(&form)
                .send()
                .await
                .map_err(|e| SmsError::RequestFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                tracing::error!(status = status.as_u16(), %message, "Twilio refused the message");
                return Err(SmsError::Provider {
                    status: status.as_u16(),
                    message,
                });
            }

            tracing::debug!("SMS accepted by Twilio");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> TwilioOptions {
        TwilioOptions {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from: "+15005550006".to_string(),
        }
    }

    #[tokio::test]
    async fn console_sender_always_succeeds() {
        assert!(ConsoleSmsSender.send("+50937001234".to_string(), "hi".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn twilio_posts_the_message_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B50937001234"))
            .and(body_string_contains("Body=code+123456"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let sender = TwilioSmsSender::with_api_url(options(), server.uri());
        sender
            .send("+50937001234".to_string(), "code 123456".to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn twilio_errors_carry_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid To number"))
            .mount(&server)
            .await;

        let sender = TwilioSmsSender::with_api_url(options(), server.uri());
        let err = sender.send("x".to_string(), "y".to_string()).await.unwrap_err();
        assert_eq!(
            err,
            SmsError::Provider {
                status: 400,
                message: "invalid To number".to_string()
            }
        );
    }
}
