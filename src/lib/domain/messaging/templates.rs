//! Message templates and email accounts

use std::{any::Any, collections::HashMap};

use lettre::{address::AddressError, message::Mailbox};
use serde::Serialize;

use crate::domain::messaging::model::{ModelMap, ModelSource, ModelValue};

/// Template names whose messages refer to an order's status
pub const ORDER_STATUS_TEMPLATES: &[&str] = &[
    "OrderCompleted.CustomerNotification",
    "OrderCompleted",
    "OrderShipped.CustomerNotification",
    "OrderDelivered.CustomerNotification",
];

/// Per-language overrides of a template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalizedTemplateFields {
    /// Localized subject template
    pub subject: Option<String>,

    /// Localized body template
    pub body: Option<String>,

    /// Account used for this language
    pub email_account_id: Option<i64>,
}

/// A message template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageTemplate {
    /// Template ID. `0` marks a transient template that was never saved.
    pub id: i64,

    /// Unique system name, e.g. `OrderPlaced.CustomerNotification`
    pub name: String,

    /// Recipient template
    pub to: String,

    /// Reply-to template
    pub reply_to: Option<String>,

    /// Comma separated BCC addresses
    pub bcc: Option<String>,

    /// Subject template
    pub subject: String,

    /// Body template
    pub body: String,

    /// Inactive templates produce no messages outside test mode
    pub is_active: bool,

    /// Account messages are sent from
    pub email_account_id: Option<i64>,

    /// Comma separated dot paths of the models a preview needs,
    /// e.g. `Order,Order.Customer`
    pub model_types: Option<String>,

    /// JSON of the last model tree built for this template
    pub last_model_tree: Option<String>,

    /// Skip messages for orders completed long ago
    pub order_status_sensitive: bool,

    /// Queued messages wait for a manual send
    pub send_manually: bool,

    /// Media files attached to every message
    pub attachment_file_ids: Vec<i64>,

    /// Overrides keyed by language ID
    pub locales: HashMap<i64, LocalizedTemplateFields>,
}

impl MessageTemplate {
    /// Whether the template was never persisted
    pub fn is_transient(&self) -> bool {
        self.id == 0
    }

    /// Whether messages depend on the referenced order's status
    pub fn is_order_status_sensitive(&self) -> bool {
        self.order_status_sensitive || ORDER_STATUS_TEMPLATES.contains(&self.name.as_str())
    }

    /// The subject for a language, falling back to the default subject
    pub fn subject_for(&self, language_id: i64) -> &str {
        self.locales
            .get(&language_id)
            .and_then(|fields| fields.subject.as_deref())
            .filter(|subject| !subject.trim().is_empty())
            .unwrap_or(&self.subject)
    }

    /// The body for a language, falling back to the default body
    pub fn body_for(&self, language_id: i64) -> &str {
        self.locales
            .get(&language_id)
            .and_then(|fields| fields.body.as_deref())
            .filter(|body| !body.trim().is_empty())
            .unwrap_or(&self.body)
    }

    /// The account for a language, falling back to the default account
    pub fn email_account_id_for(&self, language_id: i64) -> Option<i64> {
        self.locales
            .get(&language_id)
            .and_then(|fields| fields.email_account_id)
            .or(self.email_account_id)
    }
}

/// An SMTP account messages are sent from
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmailAccount {
    /// Account ID
    pub id: i64,

    /// Sender address
    pub email: String,

    /// Sender display name
    pub display_name: Option<String>,

    /// SMTP host
    #[serde(skip)]
    pub host: String,

    /// SMTP port
    #[serde(skip)]
    pub port: u16,

    /// SMTP username
    #[serde(skip)]
    pub username: Option<String>,

    /// SMTP password
    #[serde(skip)]
    pub password: Option<String>,

    /// Use implicit TLS instead of STARTTLS
    #[serde(skip)]
    pub enable_ssl: bool,
}

impl EmailAccount {
    /// The sender mailbox. Its `Display` quotes the name where needed,
    /// e.g. `"Smith, Jones Ltd" <shop@example.com>`.
    pub fn mailbox(&self) -> Result<Mailbox, AddressError> {
        let name = self
            .display_name
            .as_deref()
            .map(|name| name.replace(['\r', '\n'], " ").trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Mailbox::new(name, self.email.trim().parse()?))
    }
}

impl ModelSource for EmailAccount {
    fn model_name(&self) -> Option<String> {
        Some("Email".to_string())
    }

    fn to_value(&self) -> ModelValue {
        let mut part = ModelMap::new();

        part.insert("Id".into(), self.id.into());
        part.insert("Email".into(), self.email.as_str().into());
        part.insert("DisplayName".into(), self.display_name.clone().into());

        ModelValue::Map(part)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
