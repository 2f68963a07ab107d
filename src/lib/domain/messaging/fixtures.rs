//! Shared test fixtures

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rust_decimal::Decimal;

use crate::domain::{
    commerce::{Currency, Customer, Language, Order, Store},
    messaging::{
        errors::RenderError,
        factory::{ModelPartFactory, PartContext},
        model::{ModelValue, TemplateModel},
        queued_email::QueuedEmail,
        renderer::{CompiledTemplate, TemplateCache, TemplateEngine, TemplateRenderer},
        settings::TaxSettings,
        templates::{EmailAccount, MessageTemplate},
    },
};

pub fn store() -> Store {
    Store {
        id: 1,
        name: "Demo Store".to_string(),
        url: "https://shop.example.com/".to_string(),
        company_name: Some("Demo Ltd.".to_string()),
        logo_url: None,
        primary_currency_code: "USD".to_string(),
        default_language_id: Some(1),
    }
}

pub fn language() -> Language {
    Language {
        id: 1,
        name: "English".to_string(),
        culture: "en-US".to_string(),
        published: true,
        display_order: 1,
    }
}

pub fn usd() -> Currency {
    Currency {
        id: 1,
        ..Currency::placeholder()
    }
}

pub fn eur() -> Currency {
    Currency {
        id: 2,
        code: "EUR".to_string(),
        name: "Euro".to_string(),
        symbol: None,
        custom_formatting: Some("{0} €".to_string()),
        rounding_decimals: 2,
        rate: Decimal::new(9, 1),
    }
}

pub fn customer() -> Customer {
    Customer {
        id: 7,
        first_name: Some("Jane".to_string()),
        last_name: Some("Roe".to_string()),
        email: Some("jane@example.com".to_string()),
        username: Some("jane".to_string()),
        ..Customer::placeholder()
    }
}

pub fn order() -> Order {
    Order {
        id: 42,
        customer: customer(),
        created_on_utc: Utc::now(),
        ..Order::placeholder()
    }
}

pub fn account() -> EmailAccount {
    EmailAccount {
        id: 1,
        email: "shop@example.com".to_string(),
        display_name: Some("Demo Store".to_string()),
        host: "smtp.example.com".to_string(),
        port: 587,
        ..Default::default()
    }
}

pub fn template() -> MessageTemplate {
    MessageTemplate {
        id: 10,
        name: "OrderPlaced.CustomerNotification".to_string(),
        to: "{{ Customer.FullName }} <{{ Customer.Email }}>".to_string(),
        subject: "Order {{ Order.OrderNumber }} at {{ Store.Name }}".to_string(),
        body: "<html><head><style>p { color: red; }</style></head><body><p>Hello {{ Customer.FirstName }}</p></body></html>".to_string(),
        is_active: true,
        email_account_id: Some(1),
        ..Default::default()
    }
}

pub fn queued_email(id: i64, account_id: i64) -> QueuedEmail {
    QueuedEmail {
        id,
        priority: 5,
        from: "Demo Store <shop@example.com>".to_string(),
        to: format!("customer{id}@example.com"),
        reply_to: None,
        cc: None,
        bcc: None,
        subject: "Hello".to_string(),
        body: "<p>Hello</p>".to_string(),
        created_on_utc: Utc::now(),
        sent_on_utc: None,
        sent_tries: 0,
        email_account_id: account_id,
        send_manually: false,
        attachments: Vec::new(),
    }
}

pub fn factory(tax: TaxSettings) -> ModelPartFactory {
    ModelPartFactory::with_defaults(tax, vec![usd(), eur()])
}

pub struct PartFixture {
    pub store: Store,
    pub language: Language,
    pub customer: Customer,
    pub currency: Currency,
}

impl PartFixture {
    pub fn new() -> Self {
        Self {
            store: store(),
            language: language(),
            customer: customer(),
            currency: usd(),
        }
    }

    pub fn context(&self) -> PartContext<'_> {
        PartContext {
            store: &self.store,
            language: &self.language,
            customer: Some(&self.customer),
            base_url: self.store.base_url(),
            working_currency: &self.currency,
            test_mode: false,
        }
    }
}

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([\w.]+)\s*\}\}").unwrap();
}

/// Engine replacing `{{ Part.Member }}` placeholders with model values
#[derive(Debug, Default)]
pub struct PathEngine {
    pub compiled: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct PathTemplate(String);

fn lookup(model: &TemplateModel, path: &str) -> String {
    let mut segments = path.split('.');
    let root = segments.next().and_then(|name| model.get(name));

    let value = segments.fold(root, |value, segment| value.and_then(|value| value.get(segment)));

    match value {
        Some(ModelValue::Text(text)) => text.clone(),
        Some(ModelValue::Int(int)) => int.to_string(),
        Some(ModelValue::Decimal(decimal)) => decimal.to_string(),
        Some(ModelValue::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn substitute(source: &str, model: &TemplateModel) -> String {
    PLACEHOLDER
        .replace_all(source, |captures: &Captures<'_>| lookup(model, &captures[1]))
        .into_owned()
}

impl CompiledTemplate for PathTemplate {
    fn source(&self) -> &str {
        &self.0
    }

    fn render(&self, model: &TemplateModel, _culture: &str) -> Result<String, RenderError> {
        Ok(substitute(&self.0, model))
    }
}

impl TemplateEngine for PathEngine {
    fn compile(&self, _name: &str, source: &str) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(PathTemplate(source.to_string())))
    }

    fn render_str(
        &self,
        source: &str,
        model: &TemplateModel,
        _culture: &str,
    ) -> Result<String, RenderError> {
        Ok(substitute(source, model))
    }
}

pub fn renderer() -> TemplateRenderer {
    TemplateRenderer::new(Arc::new(PathEngine::default()), Arc::new(TemplateCache::new()))
}
