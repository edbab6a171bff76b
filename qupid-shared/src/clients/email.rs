use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

const DEFAULT_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    text: String,
}

#[derive(Debug)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailClient {
    pub fn new(api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub async fn send_email(&self, email: &Email) -> Result<(), String> {
        let request = SendEmailRequest {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: vec![email.to.clone()],
            subject: email.subject.clone(),
            html: email.html.clone(),
            text: email.text.clone(),
        };

        let response = self.client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(10))
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("email send failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email API error ({status}): {body}"));
        }

        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    /// Retries with exponential backoff (1s, 2s, 4s...) before giving up.
    pub async fn send_with_retry(&self, email: &Email, max_attempts: u32) -> Result<(), String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_email(email).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(to = %email.to, attempts = attempt, error = %e, "email delivery failed");
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        to = %email.to,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "email send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

fn code_block(code: &str) -> String {
    format!(
        r#"<div style="background: #fdf2f8; color: #db2777; font-size: 32px; font-weight: bold; text-align: center; padding: 20px; border-radius: 8px; letter-spacing: 8px;">{code}</div>"#
    )
}

pub fn verification_email(to: &str, code: &str, app_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("{app_name} - Your verification code"),
        html: format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
            <h2 style="color: #db2777;">{app_name} - Email Verification</h2>
            <p>Your verification code is:</p>
            {block}
            <p style="color: #666; margin-top: 20px;">This code expires in 10 minutes.</p>
            </div>"#,
            block = code_block(code)
        ),
        text: format!("Your {app_name} verification code is {code}. It expires in 10 minutes."),
    }
}

pub fn password_reset_email(to: &str, code: &str, app_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("{app_name} - Reset your password"),
        html: format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
            <h2 style="color: #db2777;">{app_name} - Password Reset</h2>
            <p>Your password reset code is:</p>
            {block}
            <p style="color: #666; margin-top: 20px;">This code expires in 10 minutes. If you did not request this, please ignore this email.</p>
            </div>"#,
            block = code_block(code)
        ),
        text: format!("Your {app_name} password reset code is {code}. It expires in 10 minutes."),
    }
}

pub fn welcome_email(to: &str, display_name: &str, app_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Welcome to {app_name}"),
        html: format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
            <h2 style="color: #db2777;">Welcome to {app_name}, {display_name}!</h2>
            <p>Your account is ready. Complete your profile and add a few tags to get better suggestions.</p>
            </div>"#
        ),
        text: format!("Welcome to {app_name}, {display_name}! Your account is ready."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn verification_email_contains_code() {
        let email = verification_email("a@kyushu-u.ac.jp", "042917", "Qupid");
        assert!(email.html.contains("042917"));
        assert!(email.text.contains("042917"));
        assert_eq!(email.to, "a@kyushu-u.ac.jp");
    }

    #[tokio::test]
    async fn unreachable_api_fails_after_retries() {
        let client = EmailClient::new("key", "noreply@qupid.test", "Qupid")
            .with_api_url("http://127.0.0.1:9/emails");
        let email = welcome_email("a@kyushu-u.ac.jp", "Aki", "Qupid");
        assert!(client.send_with_retry(&email, 1).await.is_err());
    }
}
