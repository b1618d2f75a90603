//! Email service for visitor notifications.

use askama::Template;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{
    config::{EmailConfig, EmailTransportConfig},
    db::models::visitors::VisitorDBResponse,
    notifications::NotificationError,
};

pub const VISIT_REQUEST_SUBJECT: &str = "New Visitor Request";
pub const APPROVAL_SUBJECT: &str = "Visit Approved - Verification Code";

/// Asks the resident to approve or reject a visit. Visitor text is HTML-escaped on render.
#[derive(Template)]
#[template(path = "emails/visit_request.html")]
struct VisitRequestEmail<'a> {
    subject: &'a str,
    resident_name: &'a str,
    visitor_name: &'a str,
    visitor_email: &'a str,
    visit_reason: &'a str,
    car_number: &'a str,
    approve_link: String,
    reject_link: String,
}

#[derive(Template)]
#[template(path = "emails/approval.html")]
struct ApprovalEmail<'a> {
    subject: &'a str,
    visitor_name: &'a str,
    resident_name: &'a str,
    code: &'a str,
}

pub struct EmailService {
    transport: EmailTransport,
    from: Mailbox,
    reply_to: Option<Mailbox>,
    frontend_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    /// `frontend_url` is the link base without a trailing slash, see [`Config::frontend_base`].
    ///
    /// [`Config::frontend_base`]: crate::config::Config::frontend_base
    pub fn new(email_config: &EmailConfig, frontend_url: &str) -> Result<Self, NotificationError> {
        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| NotificationError::Setup(format!("create SMTP transport: {e}")))?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir)
                        .map_err(|e| NotificationError::Setup(format!("create emails directory: {e}")))?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let from = parse_mailbox(&format!("{} <{}>", email_config.from_name, email_config.from_email))?;
        let reply_to = email_config.reply_to.as_deref().map(parse_mailbox).transpose()?;

        Ok(Self {
            transport,
            from,
            reply_to,
            frontend_url: frontend_url.to_string(),
        })
    }

    /// Ask the resident to approve or reject a new visit request.
    pub async fn send_visit_request_email(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        let body = self.create_visit_request_body(visitor)?;
        self.send_email(&visitor.resident_email, Some(&visitor.resident_name), VISIT_REQUEST_SUBJECT, &body)
            .await
    }

    /// Give the visitor the code to show the guard on arrival.
    pub async fn send_approval_email(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        let body = self.create_approval_body(visitor)?;
        self.send_email(&visitor.visitor_email, Some(&visitor.visitor_name), APPROVAL_SUBJECT, &body)
            .await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), NotificationError> {
        let to = match to_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Mailbox::new(Some(name.to_string()), parse_address(to_email)?),
            None => Mailbox::new(None, parse_address(to_email)?),
        };

        let mut builder = Message::builder().from(self.from.clone()).to(to).subject(subject);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        let message = builder.header(ContentType::TEXT_HTML).body(body.to_string())?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| NotificationError::Transport(format!("send SMTP email: {e}")))?;
            }
            EmailTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| NotificationError::Transport(format!("send file email: {e}")))?;
            }
        }

        Ok(())
    }

    fn create_visit_request_body(&self, visitor: &VisitorDBResponse) -> Result<String, NotificationError> {
        let template = VisitRequestEmail {
            subject: VISIT_REQUEST_SUBJECT,
            resident_name: &visitor.resident_name,
            visitor_name: &visitor.visitor_name,
            visitor_email: &visitor.visitor_email,
            visit_reason: &visitor.visit_reason,
            car_number: visitor.car_number.as_deref().unwrap_or("Not provided"),
            approve_link: format!("{}/approve/{}", self.frontend_url, visitor.id),
            reject_link: format!("{}/reject/{}", self.frontend_url, visitor.id),
        };
        Ok(template.render()?)
    }

    fn create_approval_body(&self, visitor: &VisitorDBResponse) -> Result<String, NotificationError> {
        let template = ApprovalEmail {
            subject: APPROVAL_SUBJECT,
            visitor_name: &visitor.visitor_name,
            resident_name: &visitor.resident_name,
            code: &visitor.verification_code,
        };
        Ok(template.render()?)
    }
}

fn parse_mailbox(value: &str) -> Result<Mailbox, NotificationError> {
    value.parse::<Mailbox>().map_err(|source| NotificationError::Address {
        address: value.to_string(),
        source,
    })
}

fn parse_address(value: &str) -> Result<lettre::Address, NotificationError> {
    value.parse::<lettre::Address>().map_err(|source| NotificationError::Address {
        address: value.to_string(),
        source,
    })
}
