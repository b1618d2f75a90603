//! Test utilities for integration testing (available with `test-utils` feature).

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::api::models::visitors::VisitorStatus;
use crate::config::{Config, PoolSettings};
use crate::db::models::visitors::VisitorDBResponse;
use crate::notifications::{NotificationDispatcher, NotificationError, NotificationEvent, Notifier};

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: crate::config::DatabaseConfig {
            // Tests hand the application a pool directly
            url: "postgres://localhost/gatehouse_test".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

/// Build a test server over `pool` whose notifications are captured instead of sent
pub async fn create_test_app(pool: PgPool, config: Config) -> (TestServer, UnboundedReceiver<RecordedNotification>) {
    let (notifier, events) = RecordingNotifier::new();
    let app = crate::Application::new_with_pool(config, pool, NotificationDispatcher::new(Arc::new(notifier)))
        .await
        .expect("Failed to create application");
    (app.into_test_server(), events)
}

/// One captured call to a [`Notifier`]
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub event: NotificationEvent,
    pub visitor_id: i64,
    pub recipient: String,
    pub verification_code: String,
}

/// A [`Notifier`] that forwards every event to a channel, optionally failing afterwards
pub struct RecordingNotifier {
    events: UnboundedSender<RecordedNotification>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> (Self, UnboundedReceiver<RecordedNotification>) {
        let (events, rx) = unbounded_channel();
        (Self { events, fail: false }, rx)
    }

    /// Records events, then reports every delivery as failed
    pub fn failing() -> (Self, UnboundedReceiver<RecordedNotification>) {
        let (events, rx) = unbounded_channel();
        (Self { events, fail: true }, rx)
    }

    fn record(&self, event: NotificationEvent, visitor: &VisitorDBResponse, recipient: &str) -> Result<(), NotificationError> {
        let _ = self.events.send(RecordedNotification {
            event,
            visitor_id: visitor.id,
            recipient: recipient.to_string(),
            verification_code: visitor.verification_code.clone(),
        });
        if self.fail {
            return Err(NotificationError::Transport("deliver test notification".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn request_created(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        self.record(NotificationEvent::RequestCreated, visitor, &visitor.resident_email)
    }

    async fn approved(&self, visitor: &VisitorDBResponse) -> Result<(), NotificationError> {
        self.record(NotificationEvent::Approved, visitor, &visitor.visitor_email)
    }
}

/// Wait for the next captured notification, failing the test after five seconds
pub async fn next_notification(events: &mut UnboundedReceiver<RecordedNotification>) -> RecordedNotification {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

pub fn sample_visitor() -> VisitorDBResponse {
    VisitorDBResponse {
        id: 7,
        visitor_name: "Alice".to_string(),
        visitor_email: "a@x.com".to_string(),
        resident_name: "Bob".to_string(),
        resident_email: "b@x.com".to_string(),
        visit_reason: "delivery".to_string(),
        car_number: None,
        verification_code: "4821".to_string(),
        status: VisitorStatus::Pending,
        in_date: None,
        in_time: None,
        out_date: None,
        out_time: None,
        created_at: Utc::now(),
        resident: None,
    }
}
