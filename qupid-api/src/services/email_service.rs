use qupid_shared::clients::email::{
    password_reset_email, verification_email, welcome_email, Email, EmailClient,
};

const MAX_SEND_ATTEMPTS: u32 = 3;

/// Email kinds sent by the auth flows.
#[derive(Debug)]
pub enum Outgoing<'a> {
    VerificationCode { to: &'a str, code: &'a str },
    PasswordReset { to: &'a str, code: &'a str },
    Welcome { to: &'a str, display_name: &'a str },
}

impl Outgoing<'_> {
    pub fn render(&self, app_name: &str) -> Email {
        match self {
            Outgoing::VerificationCode { to, code } => verification_email(to, code, app_name),
            Outgoing::PasswordReset { to, code } => password_reset_email(to, code, app_name),
            Outgoing::Welcome { to, display_name } => welcome_email(to, display_name, app_name),
        }
    }
}

/// Sends in the background with retries. The caller never waits on or fails
/// because of delivery; without a client the message is logged instead.
pub fn dispatch(client: Option<&EmailClient>, app_name: &str, outgoing: Outgoing<'_>) {
    let email = outgoing.render(app_name);
    match client {
        Some(client) => {
            let client = client.clone();
            tokio::spawn(async move {
                if client.send_with_retry(&email, MAX_SEND_ATTEMPTS).await.is_ok() {
                    metrics::counter!("emails_sent_total").increment(1);
                } else {
                    metrics::counter!("emails_failed_total").increment(1);
                }
            });
        }
        None => {
            tracing::info!(
                to = %email.to,
                subject = %email.subject,
                body = %email.text,
                "email delivery disabled, message logged"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_kind() {
        let code = Outgoing::VerificationCode { to: "a@kyushu-u.ac.jp", code: "123456" }.render("Qupid");
        assert!(code.text.contains("123456"));

        let reset = Outgoing::PasswordReset { to: "a@kyushu-u.ac.jp", code: "654321" }.render("Qupid");
        assert!(reset.subject.contains("Reset"));

        let welcome = Outgoing::Welcome { to: "a@kyushu-u.ac.jp", display_name: "Aki" }.render("Qupid");
        assert!(welcome.html.contains("Aki"));
    }

    #[tokio::test]
    async fn disabled_delivery_does_not_panic() {
        dispatch(None, "Qupid", Outgoing::VerificationCode { to: "a@kyushu-u.ac.jp", code: "000001" });
    }
}
