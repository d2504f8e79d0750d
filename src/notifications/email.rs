//! Outbound email for the OTP verification flow.
//!
//! Uses the SMTP configuration from the main config file. When SMTP is not
//! configured (local development, tests) dispatch is skipped with a warning;
//! when it is configured, a transport failure is a hard error for the request
//! that triggered it, so a registration does not silently succeed without its
//! verification email.
//!
//! The plaintext code passes through this module on its way to the recipient
//! and is never logged.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// What the verification code is for; selects subject and copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Registration,
    Vendor,
}

/// Service for sending verification code emails
#[derive(Debug, Clone)]
pub struct OtpMailer {
    config: EmailConfig,
}

impl OtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send a verification code to `to_email`.
    pub async fn send_otp_email(
        &self,
        to_email: &str,
        name: &str,
        otp: &str,
        purpose: OtpPurpose,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping verification email to {}",
                to_email
            );
            return Ok(());
        }

        let subject = match purpose {
            OtpPurpose::Registration => &self.config.registration_subject,
            OtpPurpose::Vendor => &self.config.vendor_subject,
        };

        let html_body = render_otp_html(name, otp, purpose);
        let text_body = render_otp_text(name, otp, purpose);

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");

        Ok(())
    }
}

fn intro_copy(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Registration => {
            "Thank you for registering with Cartr. Please use the following code to verify your email address:"
        }
        OtpPurpose::Vendor => {
            "You have been invited to become a vendor on Cartr. Please use the following code to verify your email address:"
        }
    }
}

fn heading(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Registration => "Email Verification",
        OtpPurpose::Vendor => "Vendor Verification",
    }
}

/// Render the HTML version of the verification email
fn render_otp_html(name: &str, otp: &str, purpose: OtpPurpose) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{heading}</title>
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; margin: 0; padding: 0; background-color: #f5f5f5;">
    <div style="max-width: 560px; margin: 0 auto; padding: 40px 20px;">
        <div style="background-color: #ffffff; border-radius: 8px; padding: 32px 24px;">
            <h1 style="color: #111827; font-size: 22px; margin: 0 0 16px;">{heading}</h1>
            <p style="color: #374151; line-height: 1.6;">Hello {name},</p>
            <p style="color: #374151; line-height: 1.6;">{intro}</p>
            <h2 style="background: #f3f4f6; padding: 12px; font-size: 28px; letter-spacing: 6px; text-align: center; margin: 24px 0; border-radius: 6px;">{otp}</h2>
            <p style="color: #374151; line-height: 1.6;">This code is valid for 5 minutes.</p>
            <p style="color: #6b7280; font-size: 13px;">If you did not request this, you can safely ignore this email.</p>
            <p style="color: #374151;">Thank you,<br>The Cartr Team</p>
        </div>
    </div>
</body>
</html>"#,
        heading = heading(purpose),
        name = html_escape(name),
        intro = intro_copy(purpose),
        otp = html_escape(otp),
    )
}

/// Render the plain text version of the verification email
fn render_otp_text(name: &str, otp: &str, purpose: OtpPurpose) -> String {
    format!(
        r#"{heading}

Hello {name},

{intro}

    {otp}

This code is valid for 5 minutes.

If you did not request this, you can safely ignore this email.

Thank you,
The Cartr Team"#,
        heading = heading(purpose),
        name = name,
        intro = intro_copy(purpose),
        otp = otp,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
