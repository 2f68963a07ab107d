//! Message composer
//!
//! Ties the context validator, the model part factory, the tree builder and
//! the renderer together and turns a send request into a [`QueuedEmail`].

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::Mailbox;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    commerce::Currency,
    messaging::{
        context::{MessageContext, MessageContextValidator, ResolvedContext, Validation, WorkContext},
        errors::ComposeError,
        factory::{ModelPartFactory, PartContext},
        hooks::{LogNotifier, OperatorNotifier, TestModelProvider},
        model::{ModelMap, ModelPart, ModelValue, TemplateModel},
        queued_email::{
            format_mailboxes, parse_mailboxes, AttachmentStorage, QueuedEmail,
            QueuedEmailAttachment,
        },
        renderer::{RenderRequest, TemplateRenderer},
        repository::MessagingRepository,
        settings::{MessagingSettings, ThemeSettings},
        test_models::TestModelResolver,
        tree::ModelTreeBuilder,
    },
};

/// Address substituted for unparsable addresses in previews
pub const PLACEHOLDER_ADDRESS: &str = "test@example.com";

/// Priority of composed messages
pub const DEFAULT_PRIORITY: i32 = 5;

/// A composed message
#[derive(Debug, Clone)]
pub struct CreatedMessage {
    /// The rendered message. Its ID is set when it was queued.
    pub email: QueuedEmail,

    /// The model the message was rendered from
    pub model: TemplateModel,

    /// Whether the message was persisted to the queue
    pub queued: bool,
}

/// Composes messages from templates
#[async_trait]
pub trait MessageFactory: Clone + Send + Sync + 'static {
    /// Composes a message and optionally queues it.
    ///
    /// Returns `None` when a policy prevents the message.
    async fn create_message(
        &self,
        ctx: MessageContext,
        queue: bool,
        parts: Vec<ModelPart>,
    ) -> Result<Option<CreatedMessage>, ComposeError>;

    /// Composes a preview of a template; never queued
    async fn preview(
        &self,
        ctx: MessageContext,
        parts: Vec<ModelPart>,
    ) -> Result<Option<CreatedMessage>, ComposeError> {
        self.create_message(ctx.with_test_mode(true), false, parts)
            .await
    }
}

#[cfg(test)]
mock! {
    pub MessageFactory {}

    impl Clone for MessageFactory {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MessageFactory for MessageFactory {
        async fn create_message(&self, ctx: MessageContext, queue: bool, parts: Vec<ModelPart>) -> Result<Option<CreatedMessage>, ComposeError>;
        async fn preview(&self, ctx: MessageContext, parts: Vec<ModelPart>) -> Result<Option<CreatedMessage>, ComposeError>;
    }
}

/// The message composer
#[derive(Clone)]
pub struct MessageComposer<R>
where
    R: MessagingRepository,
{
    repository: Arc<R>,
    validator: MessageContextValidator<R>,
    resolver: TestModelResolver<R>,
    factory: Arc<ModelPartFactory>,
    renderer: TemplateRenderer,
    tree_builder: ModelTreeBuilder,
    theme: ThemeSettings,
    work: WorkContext,
    notifier: Arc<dyn OperatorNotifier>,
}

impl<R> fmt::Debug for MessageComposer<R>
where
    R: MessagingRepository,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageComposer")
            .field("factory", &self.factory)
            .field("renderer", &self.renderer)
            .field("work", &self.work)
            .finish_non_exhaustive()
    }
}

impl<R> MessageComposer<R>
where
    R: MessagingRepository,
{
    /// Creates a composer
    pub fn new(
        repository: Arc<R>,
        factory: Arc<ModelPartFactory>,
        renderer: TemplateRenderer,
        settings: MessagingSettings,
        theme: ThemeSettings,
    ) -> Self {
        Self {
            validator: MessageContextValidator::new(repository.clone(), settings),
            resolver: TestModelResolver::new(repository.clone()),
            repository,
            factory,
            renderer,
            tree_builder: ModelTreeBuilder,
            theme,
            work: WorkContext::default(),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Sets the ambient request state
    pub fn with_work_context(mut self, work: WorkContext) -> Self {
        self.work = work;
        self
    }

    /// Sets the operator notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Adds a provider for preview models without a sample kind
    pub fn with_test_model_provider(mut self, provider: Arc<dyn TestModelProvider>) -> Self {
        self.resolver.add_provider(provider);
        self
    }

    fn global_parts(
        &self,
        model: &mut TemplateModel,
        resolved: &ResolvedContext,
        cx: &PartContext<'_>,
    ) -> Result<(), ComposeError> {
        let context = ModelMap::from([
            ("TemplateName".to_string(), resolved.template.name.as_str().into()),
            ("LanguageId".to_string(), resolved.language.id.into()),
            ("LanguageCulture".to_string(), resolved.language.culture.as_str().into()),
            ("BaseUrl".to_string(), resolved.base_url.as_str().into()),
            ("TestMode".to_string(), resolved.test_mode.into()),
            ("Now".to_string(), Utc::now().into()),
        ]);

        model.add("Context", ModelValue::Bag(context));
        model.add("Store", self.factory.create_part(&resolved.store, cx)?);

        if let Some(customer) = &resolved.customer {
            model.add("Customer", self.factory.create_part(customer, cx)?);
        }

        model.add("Theme", theme_part(&self.theme));
        model.add("Email", self.factory.create_part(&resolved.email_account, cx)?);

        Ok(())
    }

    async fn persist_model_tree(
        &self,
        resolved: &ResolvedContext,
        model: &TemplateModel,
    ) -> Result<(), ComposeError> {
        let template = &resolved.template;

        if template.is_transient() {
            return Ok(());
        }

        let changed = self
            .tree_builder
            .changed_tree(model, template.last_model_tree.as_deref())
            .map_err(|err| ComposeError::UnknownError(err.into()))?;

        if let Some(tree) = changed {
            debug!(template = %template.name, "model tree changed");

            self.repository.update_model_tree(template.id, &tree).await?;
        }

        Ok(())
    }

    fn checked_addresses(&self, list: &str, test_mode: bool) -> Result<String, ComposeError> {
        match parse_mailboxes(list) {
            Ok(mailboxes) if !mailboxes.is_empty() => Ok(format_mailboxes(mailboxes)),
            Ok(_) => self.invalid_address(list, "no recipients", test_mode),
            Err(err) => self.invalid_address(list, &err.to_string(), test_mode),
        }
    }

    fn checked_address(&self, address: &str, test_mode: bool) -> Result<String, ComposeError> {
        match address.trim().parse::<Mailbox>() {
            Ok(mailbox) => Ok(mailbox.to_string()),
            Err(err) => self.invalid_address(address, &err.to_string(), test_mode),
        }
    }

    fn invalid_address(
        &self,
        address: &str,
        reason: &str,
        test_mode: bool,
    ) -> Result<String, ComposeError> {
        if test_mode {
            debug!(address, "invalid preview address replaced: {reason}");

            return Ok(PLACEHOLDER_ADDRESS.to_string());
        }

        self.notifier
            .notify(&format!("Invalid email address \"{address}\": {reason}"));

        Err(ComposeError::InvalidAddress(address.to_string()))
    }
}

fn theme_part(theme: &ThemeSettings) -> ModelValue {
    ModelValue::Map(ModelMap::from([
        ("BodyBackground".to_string(), theme.body_background.as_str().into()),
        ("BrandPrimary".to_string(), theme.brand_primary.as_str().into()),
        ("BrandSecondary".to_string(), theme.brand_secondary.as_str().into()),
        ("TextColor".to_string(), theme.text_color.as_str().into()),
        ("LinkColor".to_string(), theme.link_color.as_str().into()),
    ]))
}

fn attachments(file_ids: &[i64]) -> Vec<QueuedEmailAttachment> {
    file_ids
        .iter()
        .map(|&file_id| QueuedEmailAttachment {
            id: 0,
            name: format!("attachment-{file_id}"),
            mime_type: "application/octet-stream".to_string(),
            storage: AttachmentStorage::FileReference(file_id),
        })
        .collect()
}

#[async_trait]
impl<R> MessageFactory for MessageComposer<R>
where
    R: MessagingRepository,
{
    async fn create_message(
        &self,
        ctx: MessageContext,
        queue: bool,
        mut parts: Vec<ModelPart>,
    ) -> Result<Option<CreatedMessage>, ComposeError> {
        let mut resolved = match self.validator.validate(ctx, &mut parts, &self.work).await? {
            Validation::Proceed(resolved) => resolved,
            Validation::Skip(_) => return Ok(None),
        };

        if resolved.test_mode && parts.is_empty() {
            if let Some(model_types) = resolved.template.model_types.as_deref() {
                parts = self.resolver.resolve(model_types).await?;
            }
        }

        let working_currency = self
            .factory
            .currency(&resolved.store.primary_currency_code)
            .cloned()
            .unwrap_or_else(Currency::placeholder);

        let mut model = std::mem::take(&mut resolved.model);

        {
            let cx = PartContext {
                store: &resolved.store,
                language: &resolved.language,
                customer: resolved.customer.as_ref(),
                base_url: &resolved.base_url,
                working_currency: &working_currency,
                test_mode: resolved.test_mode,
            };

            self.global_parts(&mut model, &resolved, &cx)?;

            for part in &parts {
                self.factory.add_part(&mut model, part, &cx)?;
            }
        }

        self.persist_model_tree(&resolved, &model).await?;

        let rendered = self.renderer.render(&RenderRequest {
            template: &resolved.template,
            language_id: resolved.language.id,
            culture: &resolved.culture,
            base_url: &resolved.base_url,
            model: &model,
        })?;

        let from = resolved
            .email_account
            .mailbox()
            .map_err(|_| ComposeError::InvalidAddress(resolved.email_account.email.clone()))?
            .to_string();
        let to = self.checked_addresses(&rendered.to, resolved.test_mode)?;
        let reply_to = match rendered.reply_to.as_deref() {
            Some(reply_to) => Some(self.checked_address(reply_to, resolved.test_mode)?),
            None => None,
        };

        let mut email = QueuedEmail {
            id: 0,
            priority: DEFAULT_PRIORITY,
            from,
            to,
            reply_to,
            cc: None,
            bcc: rendered.bcc,
            subject: rendered.subject,
            body: rendered.body,
            created_on_utc: Utc::now(),
            sent_on_utc: None,
            sent_tries: 0,
            email_account_id: resolved.email_account.id,
            send_manually: resolved.template.send_manually,
            attachments: attachments(&resolved.template.attachment_file_ids),
        };

        let queued = queue && !resolved.test_mode;

        if queued {
            email.id = self.repository.insert_queued_email(&email).await?;

            info!(
                id = email.id,
                template = %resolved.template.name,
                "message queued"
            );
        } else if queue {
            warn!(template = %resolved.template.name, "preview messages are never queued");
        }

        Ok(Some(CreatedMessage {
            email,
            model,
            queued,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use parking_lot::Mutex;
    use testresult::TestResult;

    use super::*;
    use crate::domain::{
        commerce::{Order, OrderStatus},
        messaging::{
            fixtures,
            repository::{MockMessagingRepository, SampleKind},
            settings::TaxSettings,
            templates::MessageTemplate,
        },
    };

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    impl OperatorNotifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    fn repository(template: MessageTemplate) -> MockMessagingRepository {
        let mut repository = MockMessagingRepository::new();

        repository
            .expect_get_store()
            .returning(|_| Ok(Some(fixtures::store())));
        repository
            .expect_get_message_template_by_name()
            .returning(move |_, _| Ok(Some(template.clone())));
        repository
            .expect_get_language()
            .returning(|_| Ok(Some(fixtures::language())));
        repository
            .expect_get_email_account()
            .returning(|_| Ok(Some(fixtures::account())));

        repository
    }

    fn composer(repository: MockMessagingRepository) -> MessageComposer<MockMessagingRepository> {
        MessageComposer::new(
            Arc::new(repository),
            Arc::new(fixtures::factory(TaxSettings::default())),
            fixtures::renderer(),
            MessagingSettings {
                max_message_order_age_days: Some(90),
                ..Default::default()
            },
            ThemeSettings::default(),
        )
        .with_work_context(WorkContext {
            store_id: 1,
            ..Default::default()
        })
    }

    fn order_context() -> MessageContext {
        MessageContext::new("OrderPlaced.CustomerNotification")
    }

    fn order_parts() -> Vec<ModelPart> {
        vec![
            ModelPart::anonymous(fixtures::order()),
            ModelPart::anonymous(fixtures::customer()),
        ]
    }

    #[tokio::test]
    async fn test_create_message_renders_and_queues() -> TestResult {
        let mut repository = repository(fixtures::template());
        repository
            .expect_update_model_tree()
            .times(1)
            .returning(|_, _| Ok(()));
        repository
            .expect_insert_queued_email()
            .withf(|email| email.to == "Jane Roe <jane@example.com>" && email.sent_tries == 0)
            .times(1)
            .returning(|_| Ok(77));

        let created = composer(repository)
            .create_message(order_context(), true, order_parts())
            .await?
            .expect("message");

        let email = &created.email;

        assert!(created.queued);
        assert_eq!(email.id, 77);
        assert_eq!(email.from, "Demo Store <shop@example.com>");
        assert_eq!(email.subject, "Order 1001 at Demo Store");
        assert!(email.body.contains("Hello Jane"));
        assert!(email.body.contains(r#"style="color: red;""#));
        assert_eq!(email.email_account_id, 1);

        for part in ["Context", "Store", "Customer", "Theme", "Email", "Order"] {
            assert!(created.model.contains(part), "missing part {part}");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_model_tree_is_persisted_once_for_identical_models() -> TestResult {
        let stored: Arc<Mutex<Option<String>>> = Arc::default();

        let mut repository = MockMessagingRepository::new();
        repository
            .expect_get_store()
            .returning(|_| Ok(Some(fixtures::store())));
        repository.expect_get_message_template_by_name().returning({
            let stored = stored.clone();
            move |_, _| {
                Ok(Some(MessageTemplate {
                    last_model_tree: stored.lock().clone(),
                    ..fixtures::template()
                }))
            }
        });
        repository
            .expect_get_language()
            .returning(|_| Ok(Some(fixtures::language())));
        repository
            .expect_get_email_account()
            .returning(|_| Ok(Some(fixtures::account())));
        repository.expect_update_model_tree().times(1).returning({
            let stored = stored.clone();
            move |_, tree| {
                *stored.lock() = Some(tree.to_string());
                Ok(())
            }
        });
        repository.expect_insert_queued_email().returning(|_| Ok(1));

        let composer = composer(repository);

        composer
            .create_message(order_context(), true, order_parts())
            .await?;
        composer
            .create_message(order_context(), true, order_parts())
            .await?;

        assert!(stored.lock().is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_old_completed_order_produces_no_message() -> TestResult {
        let mut repository = repository(MessageTemplate {
            name: "OrderCompleted".to_string(),
            ..fixtures::template()
        });
        repository.expect_insert_queued_email().never();
        repository.expect_update_model_tree().never();

        let order = Order {
            order_status: OrderStatus::Complete,
            created_on_utc: Utc::now() - Duration::days(120),
            ..fixtures::order()
        };

        let created = composer(repository)
            .create_message(
                MessageContext::new("OrderCompleted"),
                true,
                vec![ModelPart::anonymous(order)],
            )
            .await?;

        assert!(created.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_address_is_reported_in_live_mode() -> TestResult {
        let mut repository = repository(MessageTemplate {
            to: "{{ Customer.Username }}".to_string(),
            ..fixtures::template()
        });
        repository.expect_update_model_tree().returning(|_, _| Ok(()));
        repository.expect_insert_queued_email().never();

        let notifier = Arc::new(RecordingNotifier::default());
        let composer = composer(repository).with_notifier(notifier.clone());

        let result = composer
            .create_message(order_context(), true, order_parts())
            .await;

        assert!(matches!(result, Err(ComposeError::InvalidAddress(ref address)) if address == "jane"));
        assert_eq!(notifier.0.lock().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_quoted_recipient_names_may_contain_commas() -> TestResult {
        let mut repository = repository(MessageTemplate {
            to: "\"Roe, Jane\" <{{ Customer.Email }}>; shop@example.com".to_string(),
            ..fixtures::template()
        });
        repository.expect_update_model_tree().returning(|_, _| Ok(()));
        repository
            .expect_insert_queued_email()
            .times(1)
            .returning(|_| Ok(99));

        let created = composer(repository)
            .create_message(order_context(), true, order_parts())
            .await?
            .expect("message");

        assert_eq!(
            created.email.to,
            "\"Roe, Jane\" <jane@example.com>, shop@example.com"
        );
        assert!(created.queued);

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_address_is_replaced_in_previews() -> TestResult {
        let mut repository = repository(MessageTemplate {
            to: "{{ Customer.Username }}".to_string(),
            ..fixtures::template()
        });
        repository.expect_update_model_tree().returning(|_, _| Ok(()));
        repository.expect_insert_queued_email().never();

        let created = composer(repository)
            .preview(order_context(), order_parts())
            .await?
            .expect("preview");

        assert_eq!(created.email.to, PLACEHOLDER_ADDRESS);
        assert!(!created.queued);

        Ok(())
    }

    #[tokio::test]
    async fn test_preview_resolves_declared_models() -> TestResult {
        let mut repository = repository(MessageTemplate {
            model_types: Some("Order".to_string()),
            ..fixtures::template()
        });
        repository
            .expect_count_samples()
            .withf(|kind| *kind == SampleKind::Order)
            .returning(|_| Ok(0));
        repository.expect_update_model_tree().returning(|_, _| Ok(()));
        repository.expect_insert_queued_email().never();

        let created = composer(repository)
            .preview(order_context(), Vec::new())
            .await?
            .expect("preview");

        assert_eq!(
            created.model.get("Order").and_then(|order| order.get("OrderNumber")),
            Some(&"1001".into())
        );
        assert_eq!(created.email.subject, "Order 1001 at Demo Store");

        Ok(())
    }

    #[tokio::test]
    async fn test_unnamed_parts_are_rejected() -> TestResult {
        let mut repository = repository(fixtures::template());
        repository.expect_insert_queued_email().never();

        let result = composer(repository)
            .create_message(order_context(), true, vec![ModelPart::anonymous(ModelValue::map())])
            .await;

        assert!(matches!(result, Err(ComposeError::UnresolvablePartName(_))));

        Ok(())
    }
}
