//! Newsletter campaigns and subscriptions

use std::any::Any;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::messaging::model::{ModelSource, ModelValue};

/// A newsletter campaign
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Campaign {
    /// Campaign ID
    pub id: i64,

    /// Internal name
    pub name: String,

    /// Email subject
    pub subject: String,

    /// Email body
    pub body: String,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,
}

impl Campaign {
    /// Synthetic campaign used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            name: "Sample Campaign".to_string(),
            subject: "Our latest offers".to_string(),
            body: "<p>Check out what's new this week.</p>".to_string(),
            created_on_utc: Utc::now(),
        }
    }
}

impl ModelSource for Campaign {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A newsletter subscription
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewsletterSubscriber {
    /// Subscription ID
    pub id: i64,

    /// Public identifier used in (de)activation links
    pub subscription_guid: Uuid,

    /// Subscribed address
    pub email: String,

    /// Whether the subscription is confirmed
    pub active: bool,

    /// Store the subscription belongs to
    pub store_id: i64,

    /// Backing customer account, if any
    pub customer_id: Option<i64>,

    /// Preferred language
    pub language_id: Option<i64>,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,
}

impl NewsletterSubscriber {
    /// Synthetic subscription used for previews
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            subscription_guid: Uuid::nil(),
            email: "john.doe@example.com".to_string(),
            active: true,
            store_id: 0,
            customer_id: None,
            language_id: None,
            created_on_utc: Utc::now(),
        }
    }
}

impl ModelSource for NewsletterSubscriber {
    fn model_name(&self) -> Option<String> {
        Some("Subscription".to_string())
    }

    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
