//! Postgres implementation of the MessagingRepository trait

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};

use crate::{
    domain::{
        commerce::{Currency, Customer, Language, NewsletterSubscriber, Store},
        messaging::{
            errors::RepositoryError,
            model::ModelSource,
            queued_email::{AttachmentStorage, QueuedEmail, QueuedEmailAttachment},
            repository::{MessagingRepository, SampleKind},
            templates::{EmailAccount, LocalizedTemplateFields, MessageTemplate},
        },
    },
    infrastructure::db::postgres::{
        commerce::{CurrencyRecord, LanguageRecord, SubscriberRecord},
        PostgresDatabase,
    },
};

#[derive(FromRow)]
struct TemplateRecord {
    id: i64,
    name: String,
    to_address: String,
    reply_to: Option<String>,
    bcc: Option<String>,
    subject: String,
    body: String,
    is_active: bool,
    email_account_id: Option<i64>,
    model_types: Option<String>,
    last_model_tree: Option<String>,
    order_status_sensitive: bool,
    send_manually: bool,
    attachment_file_ids: Vec<i64>,
}

#[derive(FromRow)]
struct TemplateLocaleRecord {
    language_id: i64,
    subject: Option<String>,
    body: Option<String>,
    email_account_id: Option<i64>,
}

#[derive(FromRow)]
struct EmailAccountRecord {
    id: i64,
    email: String,
    display_name: Option<String>,
    host: String,
    port: i32,
    username: Option<String>,
    password: Option<String>,
    enable_ssl: bool,
}

impl TryFrom<EmailAccountRecord> for EmailAccount {
    type Error = RepositoryError;

    fn try_from(record: EmailAccountRecord) -> Result<Self, Self::Error> {
        let port = u16::try_from(record.port).map_err(|_| {
            RepositoryError::UnknownError(anyhow!(
                "email account {} has invalid port {}",
                record.id,
                record.port
            ))
        })?;

        Ok(EmailAccount {
            id: record.id,
            email: record.email,
            display_name: record.display_name,
            host: record.host,
            port,
            username: record.username,
            password: record.password,
            enable_ssl: record.enable_ssl,
        })
    }
}

#[derive(FromRow)]
struct QueuedEmailRecord {
    id: i64,
    priority: i32,
    from_address: String,
    to_address: String,
    reply_to: Option<String>,
    cc: Option<String>,
    bcc: Option<String>,
    subject: String,
    body: String,
    created_on_utc: DateTime<Utc>,
    sent_on_utc: Option<DateTime<Utc>>,
    sent_tries: i32,
    email_account_id: i64,
    send_manually: bool,
}

impl From<QueuedEmailRecord> for QueuedEmail {
    fn from(record: QueuedEmailRecord) -> Self {
        QueuedEmail {
            id: record.id,
            priority: record.priority,
            from: record.from_address,
            to: record.to_address,
            reply_to: record.reply_to,
            cc: record.cc,
            bcc: record.bcc,
            subject: record.subject,
            body: record.body,
            created_on_utc: record.created_on_utc,
            sent_on_utc: record.sent_on_utc,
            sent_tries: record.sent_tries,
            email_account_id: record.email_account_id,
            send_manually: record.send_manually,
            attachments: Vec::new(),
        }
    }
}

#[derive(FromRow)]
struct AttachmentRecord {
    id: i64,
    queued_email_id: i64,
    name: String,
    mime_type: String,
    data: Option<Vec<u8>>,
    path: Option<String>,
    media_file_id: Option<i64>,
}

impl TryFrom<AttachmentRecord> for QueuedEmailAttachment {
    type Error = RepositoryError;

    fn try_from(record: AttachmentRecord) -> Result<Self, Self::Error> {
        let storage = match (record.data, record.path, record.media_file_id) {
            (Some(data), _, _) => AttachmentStorage::Blob(data),
            (None, Some(path), _) => AttachmentStorage::Path(PathBuf::from(path)),
            (None, None, Some(file_id)) => AttachmentStorage::FileReference(file_id),
            (None, None, None) => {
                return Err(RepositoryError::UnknownError(anyhow!(
                    "attachment {} has no storage",
                    record.id
                )))
            }
        };

        Ok(QueuedEmailAttachment {
            id: record.id,
            name: record.name,
            mime_type: record.mime_type,
            storage,
        })
    }
}

const QUEUED_EMAIL_COLUMNS: &str = r#"
    id, priority, from_address, to_address, reply_to, cc, bcc, subject, body,
    created_on_utc, sent_on_utc, sent_tries, email_account_id, send_manually
"#;

/// Source and filter of the entities a preview may sample
fn sample_query(kind: SampleKind) -> &'static str {
    match kind {
        SampleKind::Order => "FROM orders WHERE NOT deleted",
        SampleKind::Customer => {
            "FROM customers WHERE active AND NOT deleted AND NOT is_system_account"
        }
        SampleKind::Product => "FROM products WHERE published AND NOT deleted",
        SampleKind::Campaign => "FROM campaigns",
        SampleKind::Subscription => "FROM newsletter_subscriptions WHERE active",
        SampleKind::Store => "FROM stores",
    }
}

impl PostgresDatabase {
    #[mutants::skip]
    async fn attach(&self, emails: &mut [QueuedEmail]) -> Result<(), RepositoryError> {
        if emails.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = emails.iter().map(|email| email.id).collect();

        let records = query_as::<_, AttachmentRecord>(
            r#"
            SELECT id, queued_email_id, name, mime_type, data, path, media_file_id
            FROM queued_email_attachments
            WHERE queued_email_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_email: HashMap<i64, Vec<QueuedEmailAttachment>> = HashMap::new();

        for record in records {
            let email_id = record.queued_email_id;
            by_email
                .entry(email_id)
                .or_default()
                .push(record.try_into()?);
        }

        for email in emails.iter_mut() {
            email.attachments = by_email.remove(&email.id).unwrap_or_default();
        }

        Ok(())
    }
}

#[async_trait]
impl MessagingRepository for PostgresDatabase {
    #[mutants::skip]
    async fn get_message_template_by_name(
        &self,
        name: &str,
        store_id: i64,
    ) -> Result<Option<MessageTemplate>, RepositoryError> {
        let record = query_as::<_, TemplateRecord>(
            r#"
            SELECT
                id, name, to_address, reply_to, bcc, subject, body, is_active,
                email_account_id, model_types, last_model_tree, order_status_sensitive,
                send_manually, attachment_file_ids
            FROM message_templates
            WHERE name = $1 AND (store_id IS NULL OR store_id = $2)
            ORDER BY store_id IS NULL
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let locales = query_as::<_, TemplateLocaleRecord>(
            r#"
            SELECT language_id, subject, body, email_account_id
            FROM message_template_locales
            WHERE template_id = $1
            "#,
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|locale| {
            (
                locale.language_id,
                LocalizedTemplateFields {
                    subject: locale.subject,
                    body: locale.body,
                    email_account_id: locale.email_account_id,
                },
            )
        })
        .collect();

        Ok(Some(MessageTemplate {
            id: record.id,
            name: record.name,
            to: record.to_address,
            reply_to: record.reply_to,
            bcc: record.bcc,
            subject: record.subject,
            body: record.body,
            is_active: record.is_active,
            email_account_id: record.email_account_id,
            model_types: record.model_types,
            last_model_tree: record.last_model_tree,
            order_status_sensitive: record.order_status_sensitive,
            send_manually: record.send_manually,
            attachment_file_ids: record.attachment_file_ids,
            locales,
        }))
    }

    #[mutants::skip]
    async fn update_model_tree(&self, template_id: i64, tree: &str) -> Result<(), RepositoryError> {
        query("UPDATE message_templates SET last_model_tree = $1 WHERE id = $2")
            .bind(tree)
            .bind(template_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[mutants::skip]
    async fn get_store(&self, id: i64) -> Result<Option<Store>, RepositoryError> {
        self.find_store(id).await
    }

    #[mutants::skip]
    async fn get_language(&self, id: i64) -> Result<Option<Language>, RepositoryError> {
        Ok(query_as::<_, LanguageRecord>(
            "SELECT id, name, culture, published, display_order FROM languages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Language::from))
    }

    #[mutants::skip]
    async fn get_published_languages(&self) -> Result<Vec<Language>, RepositoryError> {
        Ok(query_as::<_, LanguageRecord>(
            r#"
            SELECT id, name, culture, published, display_order
            FROM languages
            WHERE published
            ORDER BY display_order, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Language::from)
        .collect())
    }

    #[mutants::skip]
    async fn get_currencies(&self) -> Result<Vec<Currency>, RepositoryError> {
        Ok(query_as::<_, CurrencyRecord>(
            r#"
            SELECT id, code, name, symbol, custom_formatting, rounding_decimals, rate
            FROM currencies
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Currency::from)
        .collect())
    }

    #[mutants::skip]
    async fn get_email_account(&self, id: i64) -> Result<Option<EmailAccount>, RepositoryError> {
        query_as::<_, EmailAccountRecord>(
            r#"
            SELECT id, email, display_name, host, port, username, password, enable_ssl
            FROM email_accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(EmailAccount::try_from)
        .transpose()
    }

    #[mutants::skip]
    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, RepositoryError> {
        self.find_customer(id).await
    }

    #[mutants::skip]
    async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<i64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = query_scalar(
            r#"
            INSERT INTO queued_emails (
                priority, from_address, to_address, reply_to, cc, bcc, subject, body,
                created_on_utc, sent_on_utc, sent_tries, email_account_id, send_manually
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(email.priority)
        .bind(&email.from)
        .bind(&email.to)
        .bind(&email.reply_to)
        .bind(&email.cc)
        .bind(&email.bcc)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.created_on_utc)
        .bind(email.sent_on_utc)
        .bind(email.sent_tries)
        .bind(email.email_account_id)
        .bind(email.send_manually)
        .fetch_one(&mut *tx)
        .await?;

        for attachment in &email.attachments {
            let (data, path, media_file_id) = match &attachment.storage {
                AttachmentStorage::Blob(bytes) => (Some(bytes.as_slice()), None, None),
                AttachmentStorage::Path(path) => (None, Some(path.to_string_lossy()), None),
                AttachmentStorage::FileReference(file_id) => (None, None, Some(*file_id)),
            };

            query(
                r#"
                INSERT INTO queued_email_attachments (
                    queued_email_id, name, mime_type, data, path, media_file_id
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(&attachment.name)
            .bind(&attachment.mime_type)
            .bind(data)
            .bind(path.as_deref())
            .bind(media_file_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(id)
    }

    #[mutants::skip]
    async fn get_queued_emails(&self, ids: &[i64]) -> Result<Vec<QueuedEmail>, RepositoryError> {
        let sql = format!(
            "SELECT {QUEUED_EMAIL_COLUMNS} FROM queued_emails WHERE id = ANY($1) ORDER BY id"
        );

        let mut emails: Vec<QueuedEmail> = query_as::<_, QueuedEmailRecord>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(QueuedEmail::from)
            .collect();

        self.attach(&mut emails).await?;

        Ok(emails)
    }

    #[mutants::skip]
    async fn get_pending_queued_emails(
        &self,
        max_tries: i32,
        limit: i64,
    ) -> Result<Vec<QueuedEmail>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {QUEUED_EMAIL_COLUMNS}
            FROM queued_emails
            WHERE sent_on_utc IS NULL AND sent_tries < $1 AND NOT send_manually
            ORDER BY priority DESC, created_on_utc
            LIMIT $2
            "#
        );

        let mut emails: Vec<QueuedEmail> = query_as::<_, QueuedEmailRecord>(&sql)
            .bind(max_tries)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(QueuedEmail::from)
            .collect();

        self.attach(&mut emails).await?;

        Ok(emails)
    }

    #[mutants::skip]
    async fn update_queued_emails(&self, emails: &[QueuedEmail]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for email in emails {
            query("UPDATE queued_emails SET sent_on_utc = $1, sent_tries = $2 WHERE id = $3")
                .bind(email.sent_on_utc)
                .bind(email.sent_tries)
                .bind(email.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    #[mutants::skip]
    async fn load_media_file(&self, id: i64) -> Result<Option<Vec<u8>>, RepositoryError> {
        Ok(query_scalar::<_, Vec<u8>>("SELECT data FROM media_files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    #[mutants::skip]
    async fn get_subscribers_page(
        &self,
        store_id: i64,
        page_index: i64,
        page_size: i64,
    ) -> Result<Vec<NewsletterSubscriber>, RepositoryError> {
        Ok(query_as::<_, SubscriberRecord>(
            r#"
            SELECT
                id, subscription_guid, email, active, store_id, customer_id, language_id,
                created_on_utc
            FROM newsletter_subscriptions
            WHERE store_id = $1 AND active
            ORDER BY id
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(store_id)
        .bind(page_index * page_size)
        .bind(page_size)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(NewsletterSubscriber::from)
        .collect())
    }

    #[mutants::skip]
    async fn count_samples(&self, kind: SampleKind) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) {}", sample_query(kind));

        Ok(query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await?)
    }

    #[mutants::skip]
    async fn fetch_sample(
        &self,
        kind: SampleKind,
        skip: i64,
    ) -> Result<Option<Arc<dyn ModelSource>>, RepositoryError> {
        let sql = format!("SELECT id {} ORDER BY id OFFSET $1 LIMIT 1", sample_query(kind));

        let id = query_scalar::<_, i64>(&sql)
            .bind(skip)
            .fetch_optional(&self.pool)
            .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        fn shared<T: ModelSource>(entity: Option<T>) -> Option<Arc<dyn ModelSource>> {
            entity.map(|entity| Arc::new(entity) as Arc<dyn ModelSource>)
        }

        Ok(match kind {
            SampleKind::Order => shared(self.find_order(id).await?),
            SampleKind::Customer => shared(self.find_customer(id).await?),
            SampleKind::Product => shared(self.find_product(id).await?),
            SampleKind::Campaign => shared(self.find_campaign(id).await?),
            SampleKind::Subscription => shared(self.find_subscriber(id).await?),
            SampleKind::Store => shared(self.find_store(id).await?),
        })
    }
}
