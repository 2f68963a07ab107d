//! Stores, languages and currencies

use std::any::Any;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::messaging::model::{ModelSource, ModelValue};

/// A storefront
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Store {
    /// Store ID
    pub id: i64,

    /// Display name
    pub name: String,

    /// Public base URL, e.g. `https://shop.example.com/`
    pub url: String,

    /// Legal company name
    pub company_name: Option<String>,

    /// Absolute URL of the store logo
    pub logo_url: Option<String>,

    /// ISO code of the primary store currency
    pub primary_currency_code: String,

    /// The store's master language
    pub default_language_id: Option<i64>,
}

impl Store {
    /// The store URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Synthetic store used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            name: "Sample Store".to_string(),
            url: "https://store.example.com/".to_string(),
            company_name: Some("Sample Company Ltd.".to_string()),
            logo_url: None,
            primary_currency_code: "USD".to_string(),
            default_language_id: None,
        }
    }
}

impl ModelSource for Store {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A language messages can be composed in
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Language {
    /// Language ID
    pub id: i64,

    /// Display name
    pub name: String,

    /// Culture code, e.g. `en-US`
    pub culture: String,

    /// Whether the language is available to customers
    pub published: bool,

    /// Sort order
    pub display_order: i32,
}

/// A currency prices can be expressed in
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Currency {
    /// Currency ID
    pub id: i64,

    /// ISO code, e.g. `EUR`
    pub code: String,

    /// Display name
    pub name: String,

    /// Symbol placed before the amount, e.g. `$`
    pub symbol: Option<String>,

    /// Custom pattern where `{0}` is replaced by the amount
    pub custom_formatting: Option<String>,

    /// Number of decimals amounts are rounded to
    pub rounding_decimals: u32,

    /// Exchange rate relative to the primary currency
    pub rate: Decimal,
}

impl Currency {
    /// Formats an amount in this currency
    pub fn format(&self, amount: Decimal) -> String {
        let rounded = format!(
            "{:.*}",
            self.rounding_decimals as usize,
            amount.round_dp(self.rounding_decimals)
        );

        match (&self.custom_formatting, &self.symbol) {
            (Some(pattern), _) if pattern.contains("{0}") => pattern.replace("{0}", &rounded),
            (_, Some(symbol)) => format!("{symbol}{rounded}"),
            _ => format!("{rounded} {}", self.code),
        }
    }

    /// Synthetic primary currency
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            code: "USD".to_string(),
            name: "US Dollar".to_string(),
            symbol: Some("$".to_string()),
            custom_formatting: None,
            rounding_decimals: 2,
            rate: Decimal::ONE,
        }
    }
}
