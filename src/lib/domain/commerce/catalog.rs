//! Catalog products

use std::any::Any;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::messaging::model::{ModelSource, ModelValue};

/// Kind of product
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ProductType {
    /// Regular product
    #[default]
    Simple,

    /// Product composed of other products
    Bundle,
}

impl ProductType {
    /// Database representation
    pub fn id(self) -> i32 {
        match self {
            Self::Simple => 5,
            Self::Bundle => 15,
        }
    }

    /// Parses the database representation, defaulting to simple
    pub fn from_id(id: i32) -> Self {
        match id {
            15 => Self::Bundle,
            _ => Self::Simple,
        }
    }
}

/// A catalog product
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Product {
    /// Product ID
    pub id: i64,

    /// Display name
    pub name: String,

    /// Stock keeping unit
    pub sku: Option<String>,

    /// Short description
    pub short_description: Option<String>,

    /// Price in the primary store currency
    pub price: Decimal,

    /// URL slug
    pub slug: String,

    /// Product kind
    pub product_type: ProductType,

    /// Visible in the storefront
    pub published: bool,

    /// Soft-delete flag
    pub deleted: bool,
}

impl Product {
    /// Synthetic product used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            name: "Sample Product".to_string(),
            sku: Some("SAMPLE-001".to_string()),
            short_description: Some("A product used for previews.".to_string()),
            price: Decimal::new(4999, 2),
            slug: "sample-product".to_string(),
            product_type: ProductType::Simple,
            published: true,
            deleted: false,
        }
    }
}

impl ModelSource for Product {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
