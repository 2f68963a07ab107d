//! Message context and its validation
//!
//! A [`MessageContext`] carries whatever the caller knows about a send
//! request. [`MessageContextValidator::validate`] resolves the rest and either
//! returns a fully resolved [`ResolvedContext`] or a reason to skip the
//! message.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{
    commerce::{Customer, Language, Order, Store},
    messaging::{
        errors::ComposeError,
        model::{ModelPart, TemplateModel},
        repository::MessagingRepository,
        settings::MessagingSettings,
        templates::{EmailAccount, MessageTemplate},
    },
};

/// What the caller knows about a send request
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    /// Already loaded template
    pub template: Option<MessageTemplate>,

    /// System name of the template to load
    pub template_name: Option<String>,

    /// Store to compose for
    pub store_id: Option<i64>,

    /// Already loaded store
    pub store: Option<Store>,

    /// Language to compose in
    pub language_id: Option<i64>,

    /// Already loaded language
    pub language: Option<Language>,

    /// Recipient customer
    pub customer: Option<Customer>,

    /// Base URI links are resolved against. Defaults to the store URL.
    pub base_uri: Option<String>,

    /// Culture used for formatting. Defaults to the language culture.
    pub culture: Option<String>,

    /// Compose a preview instead of a real message
    pub test_mode: bool,

    /// Already resolved sender account
    pub email_account: Option<EmailAccount>,

    /// Parts added before composition
    pub model: TemplateModel,
}

impl MessageContext {
    /// Creates a context for the named template
    pub fn new(template_name: impl Into<String>) -> Self {
        Self {
            template_name: Some(template_name.into()),
            ..Default::default()
        }
    }

    /// Creates a context for an already loaded template
    pub fn for_template(template: MessageTemplate) -> Self {
        Self {
            template_name: Some(template.name.clone()),
            template: Some(template),
            ..Default::default()
        }
    }

    /// Sets the store
    pub fn with_store_id(mut self, store_id: i64) -> Self {
        self.store_id = Some(store_id);
        self
    }

    /// Sets the language
    pub fn with_language_id(mut self, language_id: i64) -> Self {
        self.language_id = Some(language_id);
        self
    }

    /// Sets the recipient customer
    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    /// Marks the context as a preview
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }
}

/// Ambient request state the validator falls back to
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
    /// Store of the current request
    pub store_id: i64,

    /// Language of the current request
    pub working_language_id: Option<i64>,

    /// Customer of the current request
    pub current_customer: Option<Customer>,
}

/// A context with every required collaborator resolved
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    /// The template
    pub template: MessageTemplate,

    /// The store
    pub store: Store,

    /// The language
    pub language: Language,

    /// The recipient customer, if any
    pub customer: Option<Customer>,

    /// The sender account
    pub email_account: EmailAccount,

    /// Base URL without a trailing slash
    pub base_url: String,

    /// Culture used for formatting
    pub culture: String,

    /// Whether this is a preview
    pub test_mode: bool,

    /// Parts added before composition
    pub model: TemplateModel,
}

/// Why no message is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The template is inactive
    TemplateInactive(String),

    /// The referenced order was completed too long ago
    OrderTooOld {
        /// Order ID
        order_id: i64,

        /// Configured maximum age
        max_age_days: u32,
    },
}

/// Outcome of a validation
#[derive(Debug, Clone)]
pub enum Validation {
    /// Composition proceeds with the resolved context
    Proceed(Box<ResolvedContext>),

    /// Composition is skipped
    Skip(SkipReason),
}

/// Resolves and checks message contexts
#[derive(Debug, Clone)]
pub struct MessageContextValidator<R>
where
    R: MessagingRepository,
{
    repository: Arc<R>,
    settings: MessagingSettings,
}

impl<R> MessageContextValidator<R>
where
    R: MessagingRepository,
{
    /// Creates a validator
    pub fn new(repository: Arc<R>, settings: MessagingSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Resolves the context.
    ///
    /// A customer passed positionally in `parts` becomes the recipient when
    /// the context has none and is removed from `parts`.
    pub async fn validate(
        &self,
        ctx: MessageContext,
        parts: &mut Vec<ModelPart>,
        work: &WorkContext,
    ) -> Result<Validation, ComposeError> {
        let store = self.resolve_store(&ctx, work).await?;
        let template = self.resolve_template(&ctx, store.id).await?;

        validate_template_fields(&template)?;

        if !template.is_active && !ctx.test_mode {
            info!(template = %template.name, "template is inactive, no message produced");

            return Ok(Validation::Skip(SkipReason::TemplateInactive(template.name)));
        }

        let language = self.resolve_language(&ctx, &store, work).await?;
        let customer = resolve_customer(&ctx, parts, work);

        if let Some(customer) = customer.as_ref().filter(|c| c.is_system_account) {
            let name = customer
                .system_name
                .clone()
                .unwrap_or_else(|| customer.id.to_string());

            return Err(ComposeError::SystemAccount(name));
        }

        if let Some(reason) = self.order_age_skip(&template, parts, ctx.test_mode) {
            info!(template = %template.name, ?reason, "order is too old, no message produced");

            return Ok(Validation::Skip(reason));
        }

        let email_account = match ctx.email_account {
            Some(account) => account,
            None => self.resolve_account(&template, language.id).await?,
        };

        debug!(
            template = %template.name,
            store = store.id,
            language = %language.culture,
            account = email_account.id,
            "message context resolved"
        );

        Ok(Validation::Proceed(Box::new(ResolvedContext {
            base_url: ctx
                .base_uri
                .map(|uri| uri.trim_end_matches('/').to_string())
                .unwrap_or_else(|| store.base_url().to_string()),
            culture: ctx.culture.unwrap_or_else(|| language.culture.clone()),
            template,
            store,
            language,
            customer,
            email_account,
            test_mode: ctx.test_mode,
            model: ctx.model,
        })))
    }

    async fn resolve_store(
        &self,
        ctx: &MessageContext,
        work: &WorkContext,
    ) -> Result<Store, ComposeError> {
        if let Some(store) = &ctx.store {
            return Ok(store.clone());
        }

        let store_id = ctx.store_id.unwrap_or(work.store_id);

        self.repository
            .get_store(store_id)
            .await?
            .ok_or(ComposeError::StoreNotFound(store_id))
    }

    async fn resolve_template(
        &self,
        ctx: &MessageContext,
        store_id: i64,
    ) -> Result<MessageTemplate, ComposeError> {
        if let Some(template) = &ctx.template {
            return Ok(template.clone());
        }

        let name = ctx
            .template_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(ComposeError::TemplateNameMissing)?;

        self.repository
            .get_message_template_by_name(name, store_id)
            .await?
            .ok_or_else(|| ComposeError::TemplateNotFound(name.to_string()))
    }

    async fn resolve_language(
        &self,
        ctx: &MessageContext,
        store: &Store,
        work: &WorkContext,
    ) -> Result<Language, ComposeError> {
        if let Some(language) = &ctx.language {
            return Ok(language.clone());
        }

        let candidates = [
            ctx.language_id,
            work.working_language_id,
            store.default_language_id,
        ];

        for id in candidates.into_iter().flatten() {
            if let Some(language) = self.repository.get_language(id).await? {
                return Ok(language);
            }

            debug!(language = id, "language not found, trying the next candidate");
        }

        self.repository
            .get_published_languages()
            .await?
            .into_iter()
            .next()
            .ok_or(ComposeError::NoActiveLanguage)
    }

    async fn resolve_account(
        &self,
        template: &MessageTemplate,
        language_id: i64,
    ) -> Result<EmailAccount, ComposeError> {
        let candidates = [
            template.email_account_id_for(language_id),
            self.settings.default_email_account_id,
        ];

        for id in candidates.into_iter().flatten() {
            if let Some(account) = self.repository.get_email_account(id).await? {
                return Ok(account);
            }
        }

        Err(ComposeError::NoEmailAccount)
    }

    fn order_age_skip(
        &self,
        template: &MessageTemplate,
        parts: &[ModelPart],
        test_mode: bool,
    ) -> Option<SkipReason> {
        if test_mode || !template.is_order_status_sensitive() {
            return None;
        }

        let max_age_days = self.settings.max_message_order_age_days?;
        let order = parts.iter().find_map(ModelPart::downcast_ref::<Order>)?;

        order
            .is_completed_before(max_age_days, Utc::now())
            .then_some(SkipReason::OrderTooOld {
                order_id: order.id,
                max_age_days,
            })
    }
}

fn validate_template_fields(template: &MessageTemplate) -> Result<(), ComposeError> {
    let blank = [
        ("name", template.name.as_str()),
        ("recipient", template.to.as_str()),
        ("subject", template.subject.as_str()),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());

    match blank {
        Some((field, _)) => Err(ComposeError::InvalidTemplate {
            name: template.name.clone(),
            field,
        }),
        None => Ok(()),
    }
}

fn resolve_customer(
    ctx: &MessageContext,
    parts: &mut Vec<ModelPart>,
    work: &WorkContext,
) -> Option<Customer> {
    if ctx.customer.is_some() {
        return ctx.customer.clone();
    }

    let position = parts.iter().position(|part| {
        matches!(part, ModelPart::Anonymous(_)) && part.downcast_ref::<Customer>().is_some()
    });

    if let Some(position) = position {
        let part = parts.remove(position);
        return part.downcast_ref::<Customer>().cloned();
    }

    work.current_customer.clone()
}
