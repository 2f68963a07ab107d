//! Messaging repository module

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    commerce::{
        Campaign, Currency, Customer, Language, NewsletterSubscriber, Order, Product, Store,
    },
    messaging::{
        errors::RepositoryError,
        model::ModelSource,
        queued_email::QueuedEmail,
        templates::{EmailAccount, MessageTemplate},
    },
};

/// Entity kinds the preview resolver can sample from storage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// Non-deleted orders
    Order,

    /// Active, non-deleted, non-system customers
    Customer,

    /// Published, non-deleted products
    Product,

    /// Campaigns
    Campaign,

    /// Active newsletter subscriptions
    Subscription,

    /// Stores
    Store,
}

impl SampleKind {
    /// Resolves a bare model name
    pub fn from_model_name(name: &str) -> Option<Self> {
        match name {
            "Order" => Some(Self::Order),
            "Customer" => Some(Self::Customer),
            "Product" => Some(Self::Product),
            "Campaign" => Some(Self::Campaign),
            "Subscription" | "NewsletterSubscriber" => Some(Self::Subscription),
            "Store" => Some(Self::Store),
            _ => None,
        }
    }

    /// Synthetic instance used when storage holds no matching entity
    pub fn placeholder(self) -> Arc<dyn ModelSource> {
        match self {
            Self::Order => Arc::new(Order::placeholder()),
            Self::Customer => Arc::new(Customer::placeholder()),
            Self::Product => Arc::new(Product::placeholder()),
            Self::Campaign => Arc::new(Campaign::placeholder()),
            Self::Subscription => Arc::new(NewsletterSubscriber::placeholder()),
            Self::Store => Arc::new(Store::placeholder()),
        }
    }
}

/// Persistence collaborator of the messaging pipeline
#[async_trait]
pub trait MessagingRepository: Clone + Send + Sync + 'static {
    /// Get a template by its system name
    async fn get_message_template_by_name(
        &self,
        name: &str,
        store_id: i64,
    ) -> Result<Option<MessageTemplate>, RepositoryError>;

    /// Store the JSON of the last model tree built for a template
    async fn update_model_tree(&self, template_id: i64, tree: &str)
        -> Result<(), RepositoryError>;

    /// Get a store by ID
    async fn get_store(&self, id: i64) -> Result<Option<Store>, RepositoryError>;

    /// Get a language by ID
    async fn get_language(&self, id: i64) -> Result<Option<Language>, RepositoryError>;

    /// Get the published languages ordered by display order
    async fn get_published_languages(&self) -> Result<Vec<Language>, RepositoryError>;

    /// Get all currencies
    async fn get_currencies(&self) -> Result<Vec<Currency>, RepositoryError>;

    /// Get an email account by ID
    async fn get_email_account(&self, id: i64) -> Result<Option<EmailAccount>, RepositoryError>;

    /// Get a customer by ID
    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, RepositoryError>;

    /// Persist a new queued email and its attachments, returning its ID
    async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<i64, RepositoryError>;

    /// Get queued emails by ID
    async fn get_queued_emails(&self, ids: &[i64]) -> Result<Vec<QueuedEmail>, RepositoryError>;

    /// Get unsent, automatically sent emails with fewer than `max_tries`
    /// attempts, highest priority and oldest first
    async fn get_pending_queued_emails(
        &self,
        max_tries: i32,
        limit: i64,
    ) -> Result<Vec<QueuedEmail>, RepositoryError>;

    /// Save the send state of queued emails
    async fn update_queued_emails(&self, emails: &[QueuedEmail]) -> Result<(), RepositoryError>;

    /// Load the bytes of a media file
    async fn load_media_file(&self, id: i64) -> Result<Option<Vec<u8>>, RepositoryError>;

    /// Get one page of active subscriptions ordered by ID
    async fn get_subscribers_page(
        &self,
        store_id: i64,
        page_index: i64,
        page_size: i64,
    ) -> Result<Vec<NewsletterSubscriber>, RepositoryError>;

    /// Count the entities of a kind that may be sampled
    async fn count_samples(&self, kind: SampleKind) -> Result<i64, RepositoryError>;

    /// Fetch the entity at `skip` from the sampleable entities ordered by ID
    async fn fetch_sample(
        &self,
        kind: SampleKind,
        skip: i64,
    ) -> Result<Option<Arc<dyn ModelSource>>, RepositoryError>;
}

#[cfg(test)]
mock! {
    pub MessagingRepository {}

    impl Clone for MessagingRepository {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MessagingRepository for MessagingRepository {
        async fn get_message_template_by_name(&self, name: &str, store_id: i64) -> Result<Option<MessageTemplate>, RepositoryError>;
        async fn update_model_tree(&self, template_id: i64, tree: &str) -> Result<(), RepositoryError>;
        async fn get_store(&self, id: i64) -> Result<Option<Store>, RepositoryError>;
        async fn get_language(&self, id: i64) -> Result<Option<Language>, RepositoryError>;
        async fn get_published_languages(&self) -> Result<Vec<Language>, RepositoryError>;
        async fn get_currencies(&self) -> Result<Vec<Currency>, RepositoryError>;
        async fn get_email_account(&self, id: i64) -> Result<Option<EmailAccount>, RepositoryError>;
        async fn get_customer(&self, id: i64) -> Result<Option<Customer>, RepositoryError>;
        async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<i64, RepositoryError>;
        async fn get_queued_emails(&self, ids: &[i64]) -> Result<Vec<QueuedEmail>, RepositoryError>;
        async fn get_pending_queued_emails(&self, max_tries: i32, limit: i64) -> Result<Vec<QueuedEmail>, RepositoryError>;
        async fn update_queued_emails(&self, emails: &[QueuedEmail]) -> Result<(), RepositoryError>;
        async fn load_media_file(&self, id: i64) -> Result<Option<Vec<u8>>, RepositoryError>;
        async fn get_subscribers_page(&self, store_id: i64, page_index: i64, page_size: i64) -> Result<Vec<NewsletterSubscriber>, RepositoryError>;
        async fn count_samples(&self, kind: SampleKind) -> Result<i64, RepositoryError>;
        async fn fetch_sample(&self, kind: SampleKind, skip: i64) -> Result<Option<Arc<dyn ModelSource>>, RepositoryError>;
    }
}
