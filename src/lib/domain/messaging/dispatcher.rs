//! Queued email dispatcher
//!
//! Emails are grouped by account. Each group is sent over one connection in
//! fixed-size slices, and every slice is persisted before the next one
//! starts, so an interrupted run keeps the progress it made.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::anyhow;
use chrono::Utc;
use indexmap::IndexMap;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::messaging::{
    errors::{DispatchError, TransportError},
    queued_email::{parse_mailboxes, AttachmentStorage, QueuedEmail, QueuedEmailAttachment},
    repository::MessagingRepository,
    transport::{MailConnection, MailTransport, PickupDirectory},
};

/// Number of emails sent per slice
pub const DEFAULT_SLICE_SIZE: usize = 100;

/// Dispatcher configuration, resolved once at construction
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    slice_size: usize,
    send_delay: Option<Duration>,
    pickup_directory: Option<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            slice_size: DEFAULT_SLICE_SIZE,
            send_delay: None,
            pickup_directory: None,
        }
    }
}

impl DispatchConfig {
    /// Creates a configuration.
    ///
    /// A pickup directory that does not exist is ignored and messages are
    /// sent live.
    pub fn new(
        slice_size: usize,
        send_delay: Option<Duration>,
        pickup_directory: Option<PathBuf>,
    ) -> Self {
        let pickup_directory = pickup_directory.filter(|path| {
            let exists = path.is_dir();

            if !exists {
                warn!(path = %path.display(), "pickup directory does not exist, sending live");
            }

            exists
        });

        Self {
            slice_size: slice_size.max(1),
            send_delay: send_delay.filter(|delay| !delay.is_zero()),
            pickup_directory,
        }
    }

    /// Emails per slice
    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    /// Pause after each live send
    pub fn send_delay(&self) -> Option<Duration> {
        self.send_delay
    }

    /// Directory messages are written to instead of being sent
    pub fn pickup_directory(&self) -> Option<&Path> {
        self.pickup_directory.as_deref()
    }
}

/// Outcome of a dispatch run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages handed to the transport
    pub sent: usize,

    /// Messages whose send attempt failed
    pub failed: usize,

    /// Slices processed
    pub slices: usize,

    /// Whether the run stopped because it was cancelled
    pub cancelled: bool,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.slices += other.slices;
        self.cancelled |= other.cancelled;
    }
}

/// Sends queued emails
#[derive(Debug)]
pub struct QueuedEmailDispatcher<R, T>
where
    R: MessagingRepository,
    T: MailTransport,
{
    repository: Arc<R>,
    transport: Arc<T>,
    config: DispatchConfig,
    pickup: Option<PickupDirectory>,
}

impl<R, T> QueuedEmailDispatcher<R, T>
where
    R: MessagingRepository,
    T: MailTransport,
{
    /// Creates a dispatcher
    pub fn new(repository: Arc<R>, transport: Arc<T>, config: DispatchConfig) -> Self {
        let pickup = config.pickup_directory().map(PickupDirectory::new);

        Self {
            repository,
            transport,
            config,
            pickup,
        }
    }

    /// Sends the given emails, updating their send state in place.
    ///
    /// Every attempt increments `sent_tries`; successful attempts stamp
    /// `sent_on_utc`. Transport failures are logged and do not abort the run.
    pub async fn send(
        &self,
        emails: &mut [QueuedEmail],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let mut groups: IndexMap<i64, Vec<&mut QueuedEmail>> = IndexMap::new();

        for email in emails.iter_mut() {
            groups.entry(email.email_account_id).or_default().push(email);
        }

        let mut report = DispatchReport::default();

        for (account_id, mut group) in groups {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            report.merge(self.send_group(account_id, &mut group, cancel).await?);
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            slices = report.slices,
            cancelled = report.cancelled,
            "dispatch finished"
        );

        Ok(report)
    }

    async fn send_group(
        &self,
        account_id: i64,
        group: &mut [&mut QueuedEmail],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let live;

        let connection: &dyn MailConnection = match &self.pickup {
            Some(pickup) => pickup,
            None => match self.connect(account_id).await {
                Ok(connection) => {
                    live = connection;
                    live.as_ref()
                }
                Err(err) => {
                    error!(account = account_id, "could not open connection: {err}");

                    return self.fail_group(group).await;
                }
            },
        };

        let mut report = DispatchReport::default();

        for slice in group.chunks_mut(self.config.slice_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let mut processed = 0;

            for email in slice.iter_mut() {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }

                let succeeded = match self.send_one(connection, email).await {
                    Ok(()) => {
                        debug!(id = email.id, "email sent");
                        true
                    }
                    Err(err) => {
                        warn!(id = email.id, tries = email.sent_tries + 1, "failed to send email: {err}");
                        false
                    }
                };

                email.record_attempt(succeeded, Utc::now());
                processed += 1;

                if succeeded {
                    report.sent += 1;

                    if let (None, Some(delay)) = (&self.pickup, self.config.send_delay) {
                        tokio::time::sleep(delay).await;
                    }
                } else {
                    report.failed += 1;
                }
            }

            if processed > 0 {
                let done: Vec<QueuedEmail> = slice[..processed]
                    .iter()
                    .map(|email| (**email).clone())
                    .collect();

                self.repository.update_queued_emails(&done).await?;
                report.slices += 1;
            }

            if report.cancelled {
                break;
            }
        }

        Ok(report)
    }

    async fn connect(&self, account_id: i64) -> Result<Box<dyn MailConnection>, TransportError> {
        let account = self
            .repository
            .get_email_account(account_id)
            .await
            .map_err(|err| TransportError::UnknownError(err.into()))?
            .ok_or_else(|| TransportError::UnknownError(anyhow!("email account {account_id} not found")))?;

        self.transport.connect(&account).await
    }

    async fn fail_group(&self, group: &mut [&mut QueuedEmail]) -> Result<DispatchReport, DispatchError> {
        let now = Utc::now();

        for email in group.iter_mut() {
            email.record_attempt(false, now);
        }

        let failed: Vec<QueuedEmail> = group.iter().map(|email| (**email).clone()).collect();

        self.repository.update_queued_emails(&failed).await?;

        Ok(DispatchReport {
            failed: failed.len(),
            ..Default::default()
        })
    }

    async fn send_one(
        &self,
        connection: &dyn MailConnection,
        email: &QueuedEmail,
    ) -> Result<(), TransportError> {
        let message = self.to_message(email).await?;

        connection.send(message).await
    }

    /// Converts a queued email into a transport message
    pub async fn to_message(&self, email: &QueuedEmail) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(mailbox(&email.from)?)
            .subject(email.subject.as_str());

        for to in mailboxes(&email.to)? {
            builder = builder.to(to);
        }

        if let Some(reply_to) = email.reply_to.as_deref().filter(|s| !s.trim().is_empty()) {
            builder = builder.reply_to(mailbox(reply_to)?);
        }

        if let Some(cc) = email.cc.as_deref() {
            for cc in mailboxes(cc)? {
                builder = builder.cc(cc);
            }
        }

        if let Some(bcc) = email.bcc.as_deref() {
            for bcc in mailboxes(bcc)? {
                builder = builder.bcc(bcc);
            }
        }

        let html = SinglePart::html(email.body.clone());

        if email.attachments.is_empty() {
            return Ok(builder.singlepart(html)?);
        }

        let mut body = MultiPart::mixed().singlepart(html);

        for attachment in &email.attachments {
            body = body.singlepart(self.attachment(attachment).await?);
        }

        Ok(builder.multipart(body)?)
    }

    async fn attachment(&self, attachment: &QueuedEmailAttachment) -> Result<SinglePart, TransportError> {
        let missing = || TransportError::MissingAttachment(attachment.name.clone());

        let bytes = match &attachment.storage {
            AttachmentStorage::Blob(bytes) => bytes.clone(),
            AttachmentStorage::Path(path) => tokio::fs::read(path).await.map_err(|err| {
                warn!(path = %path.display(), "could not read attachment: {err}");
                missing()
            })?,
            AttachmentStorage::FileReference(file_id) => self
                .repository
                .load_media_file(*file_id)
                .await
                .map_err(|err| TransportError::UnknownError(err.into()))?
                .ok_or_else(missing)?,
        };

        let content_type = ContentType::parse(&attachment.mime_type)
            .map_err(|err| TransportError::InvalidMessage(err.to_string()))?;

        Ok(Attachment::new(attachment.name.clone()).body(bytes, content_type))
    }
}

fn mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidAddress(address.to_string()))
}

fn mailboxes(list: &str) -> Result<Vec<Mailbox>, TransportError> {
    parse_mailboxes(list).map_err(|_| TransportError::InvalidAddress(list.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use testresult::TestResult;

    use super::*;
    use crate::domain::messaging::{
        fixtures,
        repository::MockMessagingRepository,
        templates::EmailAccount,
        transport::{MockMailConnection, MockMailTransport},
    };

    fn repository(updates: Arc<parking_lot::Mutex<Vec<usize>>>) -> MockMessagingRepository {
        let mut repository = MockMessagingRepository::new();

        repository
            .expect_get_email_account()
            .returning(|id| Ok(Some(EmailAccount { id, ..fixtures::account() })));
        repository.expect_update_queued_emails().returning(move |emails| {
            updates.lock().push(emails.len());
            Ok(())
        });

        repository
    }

    fn transport(sends: Arc<AtomicUsize>, succeed: bool, connections: usize) -> MockMailTransport {
        let mut transport = MockMailTransport::new();

        transport.expect_connect().times(connections).returning(move |_| {
            let sends = sends.clone();
            let mut connection = MockMailConnection::new();

            connection.expect_send().returning(move |_| {
                sends.fetch_add(1, Ordering::SeqCst);

                if succeed {
                    Ok(())
                } else {
                    Err(TransportError::Send("550 mailbox unavailable".to_string()))
                }
            });

            Ok(Box::new(connection) as Box<dyn MailConnection>)
        });

        transport
    }

    fn emails(count: i64, account_id: i64) -> Vec<QueuedEmail> {
        (1..=count)
            .map(|id| fixtures::queued_email(id, account_id))
            .collect()
    }

    #[tokio::test]
    async fn test_sends_in_slices_over_one_connection() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sends = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates.clone())),
            Arc::new(transport(sends.clone(), true, 1)),
            DispatchConfig::default(),
        );
        let mut emails = emails(250, 1);

        let report = dispatcher.send(&mut emails, &CancellationToken::new()).await?;

        assert_eq!(sends.load(Ordering::SeqCst), 250);
        assert_eq!(report.slices, 3);
        assert_eq!(report.sent, 250);
        assert_eq!(*updates.lock(), vec![100, 100, 50]);
        assert!(emails.iter().all(|email| email.is_sent() && email.sent_tries == 1));

        Ok(())
    }

    #[tokio::test]
    async fn test_opens_one_connection_per_account() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sends = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates.clone())),
            Arc::new(transport(sends.clone(), true, 2)),
            DispatchConfig::default(),
        );
        let mut mixed = emails(3, 1);
        mixed.extend(emails(2, 2));
        mixed.push(fixtures::queued_email(9, 1));

        let report = dispatcher.send(&mut mixed, &CancellationToken::new()).await?;

        assert_eq!(report.sent, 6);
        assert_eq!(*updates.lock(), vec![4, 2]);

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_sends_only_count_tries() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sends = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates)),
            Arc::new(transport(sends, false, 3)),
            DispatchConfig::default(),
        );
        let mut emails = emails(2, 1);

        for _ in 0..3 {
            let report = dispatcher.send(&mut emails, &CancellationToken::new()).await?;
            assert_eq!(report.failed, 2);
        }

        for email in &emails {
            assert_eq!(email.sent_tries, 3);
            assert_eq!(email.sent_on_utc, None);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_connection_failure_fails_the_group() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut transport = MockMailTransport::new();
        transport.expect_connect().times(1).returning(|account| {
            Err(TransportError::Connect {
                host: account.host.clone(),
                message: "connection refused".to_string(),
            })
        });

        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates.clone())),
            Arc::new(transport),
            DispatchConfig::default(),
        );
        let mut emails = emails(3, 1);

        let report = dispatcher.send(&mut emails, &CancellationToken::new()).await?;

        assert_eq!(report.failed, 3);
        assert_eq!(*updates.lock(), vec![3]);
        assert!(emails.iter().all(|email| email.sent_tries == 1 && !email.is_sent()));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_runs_send_nothing() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sends = Arc::new(AtomicUsize::new(0));
        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates.clone())),
            Arc::new(transport(sends.clone(), true, 0)),
            DispatchConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut emails = emails(5, 1);

        let report = dispatcher.send(&mut emails, &cancel).await?;

        assert!(report.cancelled);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
        assert!(updates.lock().is_empty());
        assert!(emails.iter().all(|email| email.sent_tries == 0));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancelling_mid_slice_keeps_the_processed_prefix() -> TestResult {
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sends = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let mut transport = MockMailTransport::new();
        let (counter, token) = (sends.clone(), cancel.clone());
        transport.expect_connect().times(1).returning(move |_| {
            let (counter, token) = (counter.clone(), token.clone());
            let mut connection = MockMailConnection::new();

            connection.expect_send().returning(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    token.cancel();
                }

                Ok(())
            });

            Ok(Box::new(connection) as Box<dyn MailConnection>)
        });

        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates.clone())),
            Arc::new(transport),
            DispatchConfig::new(2, None, None),
        );
        let mut emails = emails(6, 1);

        let report = dispatcher.send(&mut emails, &cancel).await?;

        assert!(report.cancelled);
        assert_eq!(report.sent, 3);
        assert_eq!(sends.load(Ordering::SeqCst), 3);
        assert_eq!(*updates.lock(), vec![2, 1]);
        assert!(emails[..3].iter().all(|email| email.is_sent() && email.sent_tries == 1));
        assert!(emails[3..].iter().all(|email| email.sent_tries == 0 && !email.is_sent()));

        Ok(())
    }

    #[tokio::test]
    async fn test_display_names_with_separators_reach_the_envelope() -> TestResult {
        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(MockMessagingRepository::new()),
            Arc::new(MockMailTransport::new()),
            DispatchConfig::default(),
        );

        let mut email = fixtures::queued_email(1, 1);
        email.from = "\"Smith, Jones Ltd\" <shop@example.com>".to_string();
        email.to = "\"Doe, John\" <john@example.com>; jane@example.com".to_string();

        let message = dispatcher.to_message(&email).await?;
        let envelope = message.envelope();

        let recipients: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();

        assert_eq!(recipients, vec!["john@example.com", "jane@example.com"]);
        assert_eq!(
            envelope.from().map(ToString::to_string).as_deref(),
            Some("shop@example.com")
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_pickup_directory_replaces_live_sending() -> TestResult {
        let dir = tempfile::tempdir()?;
        let updates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut transport = MockMailTransport::new();
        transport.expect_connect().never();

        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository(updates)),
            Arc::new(transport),
            DispatchConfig::new(DEFAULT_SLICE_SIZE, None, Some(dir.path().to_path_buf())),
        );
        let mut emails = emails(2, 1);

        let report = dispatcher.send(&mut emails, &CancellationToken::new()).await?;

        assert_eq!(report.sent, 2);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);

        Ok(())
    }

    #[test]
    fn test_missing_pickup_directory_is_ignored() {
        let config = DispatchConfig::new(0, Some(Duration::ZERO), Some(PathBuf::from("/nonexistent/pickup")));

        assert_eq!(config.pickup_directory(), None);
        assert_eq!(config.send_delay(), None);
        assert_eq!(config.slice_size(), 1);
    }

    #[tokio::test]
    async fn test_attachments_are_resolved_from_every_storage() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("terms.txt");
        std::fs::write(&path, b"terms")?;

        let mut repository = MockMessagingRepository::new();
        repository
            .expect_load_media_file()
            .returning(|id| Ok((id == 5).then(|| b"invoice".to_vec())));

        let dispatcher = QueuedEmailDispatcher::new(
            Arc::new(repository),
            Arc::new(MockMailTransport::new()),
            DispatchConfig::default(),
        );

        let attachment = |name: &str, storage| QueuedEmailAttachment {
            id: 0,
            name: name.to_string(),
            mime_type: "text/plain".to_string(),
            storage,
        };

        let mut email = fixtures::queued_email(1, 1);
        email.cc = Some("cc@example.com".to_string());
        email.attachments = vec![
            attachment("blob.txt", AttachmentStorage::Blob(b"blob".to_vec())),
            attachment("terms.txt", AttachmentStorage::Path(path)),
            attachment("invoice.txt", AttachmentStorage::FileReference(5)),
        ];

        let formatted = String::from_utf8(dispatcher.to_message(&email).await?.formatted())?;

        assert!(formatted.contains("blob.txt"));
        assert!(formatted.contains("terms.txt"));
        assert!(formatted.contains("invoice.txt"));
        assert!(formatted.contains("Cc: cc@example.com"));

        email.attachments = vec![attachment("gone.txt", AttachmentStorage::FileReference(6))];

        let result = dispatcher.to_message(&email).await;
        assert!(matches!(result, Err(TransportError::MissingAttachment(ref name)) if name == "gone.txt"));

        Ok(())
    }
}
