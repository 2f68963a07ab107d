//! Customers and addresses

use std::{any::Any, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::messaging::model::{ModelSource, ModelValue};

/// How prices are displayed to a customer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TaxDisplayType {
    /// Prices include tax
    #[default]
    IncludingTax,

    /// Prices exclude tax
    ExcludingTax,
}

impl TaxDisplayType {
    /// Database representation
    pub fn id(self) -> i32 {
        match self {
            Self::IncludingTax => 0,
            Self::ExcludingTax => 10,
        }
    }

    /// Parses the database representation, defaulting to tax inclusive
    pub fn from_id(id: i32) -> Self {
        match id {
            10 => Self::ExcludingTax,
            _ => Self::IncludingTax,
        }
    }
}

/// A postal address
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Address {
    /// Address ID
    pub id: i64,

    /// First name
    pub first_name: String,

    /// Last name
    pub last_name: String,

    /// Contact email
    pub email: Option<String>,

    /// Company name
    pub company: Option<String>,

    /// Street line 1
    pub address1: String,

    /// Street line 2
    pub address2: Option<String>,

    /// City
    pub city: String,

    /// ZIP / postal code
    pub zip_postal_code: String,

    /// State or province name
    pub state_province: Option<String>,

    /// Country name
    pub country: Option<String>,

    /// Phone number
    pub phone_number: Option<String>,
}

impl Address {
    /// First and last name joined by a space
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Synthetic address used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: Some("john.doe@example.com".to_string()),
            company: Some("Doe Inc.".to_string()),
            address1: "1 Main Street".to_string(),
            address2: None,
            city: "Springfield".to_string(),
            zip_postal_code: "12345".to_string(),
            state_province: Some("Illinois".to_string()),
            country: Some("United States".to_string()),
            phone_number: Some("+1 555 0100".to_string()),
        }
    }
}

impl ModelSource for Address {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A customer account
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Customer {
    /// Customer ID
    pub id: i64,

    /// Public identifier
    pub customer_guid: Uuid,

    /// Email address
    pub email: Option<String>,

    /// Username
    pub username: Option<String>,

    /// First name
    pub first_name: Option<String>,

    /// Last name
    pub last_name: Option<String>,

    /// Whether the account is active
    pub active: bool,

    /// Soft-delete flag
    pub deleted: bool,

    /// Built-in accounts such as the background task or search engine user
    pub is_system_account: bool,

    /// System name of a built-in account
    pub system_name: Option<String>,

    /// Tax display preference
    pub tax_display_type: TaxDisplayType,

    /// Default billing address
    pub billing_address: Option<Address>,

    /// Default shipping address
    pub shipping_address: Option<Address>,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,
}

impl Customer {
    /// Full name, falling back to the username and then the email
    pub fn full_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        if !name.is_empty() {
            return name;
        }

        self.username
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_default()
    }

    /// Synthetic customer used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            customer_guid: Uuid::nil(),
            email: Some("john.doe@example.com".to_string()),
            username: Some("johndoe".to_string()),
            first_name: Some("John".to_string()),
            last_name: Some("Doe".to_string()),
            active: true,
            deleted: false,
            is_system_account: false,
            system_name: None,
            tax_display_type: TaxDisplayType::IncludingTax,
            billing_address: Some(Address::placeholder()),
            shipping_address: Some(Address::placeholder()),
            created_on_utc: Utc::now(),
        }
    }
}

impl ModelSource for Customer {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn property(&self, name: &str) -> Option<Arc<dyn ModelSource>> {
        let address = match name {
            "BillingAddress" => self.billing_address.clone(),
            "ShippingAddress" => self.shipping_address.clone(),
            _ => None,
        }?;

        Some(Arc::new(address))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
