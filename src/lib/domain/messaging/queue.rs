//! Email queue service

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
use mockall::mock;

use crate::domain::messaging::{
    dispatcher::{DispatchReport, QueuedEmailDispatcher},
    errors::{DispatchError, RepositoryError},
    queued_email::QueuedEmail,
    repository::MessagingRepository,
    transport::MailTransport,
};

/// Maximum number of pending emails loaded per run
pub const DEFAULT_BATCH_LIMIT: i64 = 500;

/// Email queue service
#[async_trait]
pub trait QueueService: Clone + Send + Sync + 'static {
    /// Persists an email for later dispatch.
    ///
    /// # Returns
    /// The ID of the queued email.
    async fn enqueue(&self, email: &QueuedEmail) -> Result<i64, RepositoryError>;

    /// Sends pending emails: unsent, not manual, with fewer attempts than
    /// the configured maximum. Highest priority and oldest first.
    async fn send_pending(&self, cancel: &CancellationToken)
        -> Result<DispatchReport, DispatchError>;

    /// Sends the given emails immediately, including manual ones.
    ///
    /// Emails that were already sent are left alone.
    async fn send_now(
        &self,
        ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError>;
}

#[cfg(test)]
mock! {
    pub QueueService {}

    impl Clone for QueueService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl QueueService for QueueService {
        async fn enqueue(&self, email: &QueuedEmail) -> Result<i64, RepositoryError>;
        async fn send_pending(&self, cancel: &CancellationToken) -> Result<DispatchReport, DispatchError>;
        async fn send_now(&self, ids: &[i64], cancel: &CancellationToken) -> Result<DispatchReport, DispatchError>;
    }
}

/// Email queue backed by the messaging repository
#[derive(Debug, Clone)]
pub struct EmailQueue<R, T>
where
    R: MessagingRepository,
    T: MailTransport,
{
    repository: Arc<R>,
    dispatcher: Arc<QueuedEmailDispatcher<R, T>>,
    max_send_tries: i32,
    batch_limit: i64,
}

impl<R, T> EmailQueue<R, T>
where
    R: MessagingRepository,
    T: MailTransport,
{
    /// Creates a queue
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<QueuedEmailDispatcher<R, T>>,
        max_send_tries: i32,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            max_send_tries,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Sets the number of pending emails loaded per run
    pub fn with_batch_limit(mut self, batch_limit: i64) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }
}

#[async_trait]
impl<R, T> QueueService for EmailQueue<R, T>
where
    R: MessagingRepository,
    T: MailTransport,
{
    async fn enqueue(&self, email: &QueuedEmail) -> Result<i64, RepositoryError> {
        let id = self.repository.insert_queued_email(email).await?;

        debug!(id, priority = email.priority, "email queued");

        Ok(id)
    }

    async fn send_pending(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let mut emails = self
            .repository
            .get_pending_queued_emails(self.max_send_tries, self.batch_limit)
            .await?;

        if emails.is_empty() {
            debug!("no pending emails");
            return Ok(DispatchReport::default());
        }

        info!(count = emails.len(), "sending pending emails");

        self.dispatcher.send(&mut emails, cancel).await
    }

    async fn send_now(
        &self,
        ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let mut emails: Vec<QueuedEmail> = self
            .repository
            .get_queued_emails(ids)
            .await?
            .into_iter()
            .filter(|email| !email.is_sent())
            .collect();

        if emails.is_empty() {
            return Ok(DispatchReport::default());
        }

        self.dispatcher.send(&mut emails, cancel).await
    }
}
