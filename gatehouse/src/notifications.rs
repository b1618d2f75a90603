//! Best-effort visitor notifications.
//!
//! Two lifecycle events send mail: a new request (to the resident, with approve/reject links)
//! and an approval (to the visitor, with the verification code). Delivery runs on a detached
//! task, so a slow or failing mail server never delays or fails the HTTP request that triggered
//! it. Failures are logged and dropped; there are no retries.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::Config;
use crate::db::models::visitors::VisitorDBResponse;
use crate::email::EmailService;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("failed to render email: {0}")]
    Render(#[from] askama::Error),

    #[error("failed to {0}")]
    Transport(String),

    #[error("failed to {0}")]
    Setup(String),
}

/// Delivers lifecycle notifications
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// A visitor asked to see a resident
    async fn request_created(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError>;

    /// A resident approved a visit; the visitor needs their code
    async fn approved(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError>;
}

#[async_trait::async_trait]
impl Notifier for EmailService {
    async fn request_created(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        self.send_visit_request_email(visitor).await
    }

    async fn approved(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        self.send_approval_email(visitor).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    RequestCreated,
    Approved,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationEvent::RequestCreated => write!(f, "request_created"),
            NotificationEvent::Approved => write!(f, "approved"),
        }
    }
}

/// Fans lifecycle events out to the configured [`Notifier`] on background tasks.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier: Some(notifier) }
    }

    /// A dispatcher that drops every event
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    /// Email delivery when `email` is configured, otherwise disabled.
    pub fn from_config(config: &Config) -> Result<Self, NotificationError> {
        match &config.email {
            Some(email_config) => {
                let service = EmailService::new(email_config, config.frontend_base())?;
                tracing::info!(from = %email_config.from_email, "Email notifications enabled");
                Ok(Self::new(Arc::new(service)))
            }
            None => {
                tracing::info!("No email transport configured, notifications are disabled");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn request_created(&self, visitor: &VisitorDBResponse) -> Option<JoinHandle<()>> {
        self.dispatch(NotificationEvent::RequestCreated, visitor)
    }

    pub fn approved(&self, visitor: &VisitorDBResponse) -> Option<JoinHandle<()>> {
        self.dispatch(NotificationEvent::Approved, visitor)
    }

    /// Spawn delivery of `event`. The returned handle is only useful to tests; callers drop it.
    fn dispatch(&self, event: NotificationEvent, visitor: &VisitorDBResponse) -> Option<JoinHandle<()>> {
        let Some(notifier) = self.notifier.clone() else {
            tracing::debug!(%event, visitor_id = visitor.id, "Notifications disabled, skipping");
            return None;
        };

        let visitor = visitor.clone();
        let span = tracing::info_span!("notify", %event, visitor_id = visitor.id);

        Some(tokio::spawn(
            async move {
                let outcome = match event {
                    NotificationEvent::RequestCreated => notifier.request_created(&visitor).await,
                    NotificationEvent::Approved => notifier.approved(&visitor).await,
                };
                match outcome {
                    Ok(()) => tracing::info!("Notification sent"),
                    Err(e) => tracing::warn!(error = %e, "Failed to send notification"),
                }
            }
            .instrument(span),
        ))
    }
}
