//! Orders

use std::{any::Any, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    commerce::{Address, Customer, Product, TaxDisplayType},
    messaging::model::{ModelSource, ModelValue},
};

/// Order processing status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    /// Placed, not processed yet
    #[default]
    Pending,

    /// Being processed
    Processing,

    /// Completed
    Complete,

    /// Cancelled
    Cancelled,
}

impl OrderStatus {
    /// Database representation
    pub fn id(self) -> i32 {
        match self {
            Self::Pending => 10,
            Self::Processing => 20,
            Self::Complete => 30,
            Self::Cancelled => 40,
        }
    }

    /// Parses the database representation
    pub fn from_id(id: i32) -> Self {
        match id {
            20 => Self::Processing,
            30 => Self::Complete,
            40 => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// Payment status of an order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    /// Not paid yet
    #[default]
    Pending,

    /// Authorized, not captured
    Authorized,

    /// Paid
    Paid,

    /// Refunded
    Refunded,

    /// Voided
    Voided,
}

impl PaymentStatus {
    /// Database representation
    pub fn id(self) -> i32 {
        match self {
            Self::Pending => 10,
            Self::Authorized => 20,
            Self::Paid => 30,
            Self::Refunded => 40,
            Self::Voided => 50,
        }
    }

    /// Parses the database representation
    pub fn from_id(id: i32) -> Self {
        match id {
            20 => Self::Authorized,
            30 => Self::Paid,
            40 => Self::Refunded,
            50 => Self::Voided,
            _ => Self::Pending,
        }
    }
}

/// Shipping status of an order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ShippingStatus {
    /// Nothing to ship
    ShippingNotRequired,

    /// Waiting for shipment
    #[default]
    NotYetShipped,

    /// Handed to the carrier
    Shipped,

    /// Delivered
    Delivered,
}

impl ShippingStatus {
    /// Database representation
    pub fn id(self) -> i32 {
        match self {
            Self::ShippingNotRequired => 10,
            Self::NotYetShipped => 20,
            Self::Shipped => 30,
            Self::Delivered => 40,
        }
    }

    /// Parses the database representation
    pub fn from_id(id: i32) -> Self {
        match id {
            10 => Self::ShippingNotRequired,
            30 => Self::Shipped,
            40 => Self::Delivered,
            _ => Self::NotYetShipped,
        }
    }
}

/// Tax amount charged at one rate
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaxRate {
    /// Rate in percent
    pub rate: Decimal,

    /// Amount charged at this rate
    pub amount: Decimal,
}

/// A child item of a bundle order line
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BundleItem {
    /// Name of the bundled product
    pub product_name: String,

    /// Quantity per bundle
    pub quantity: i32,

    /// Price of the bundled item
    pub price: Decimal,
}

/// An order line
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItem {
    /// Order item ID
    pub id: i64,

    /// Ordered product
    pub product: Product,

    /// Ordered quantity
    pub quantity: i32,

    /// Price per unit
    pub unit_price: Decimal,

    /// Price of the whole line
    pub line_total: Decimal,

    /// Formatted description of the selected attributes
    pub attribute_description: Option<String>,

    /// Items of a bundle product
    pub bundle_items: Vec<BundleItem>,
}

impl OrderItem {
    /// Synthetic order line used for previews
    pub fn placeholder() -> Self {
        let product = Product::placeholder();

        Self {
            id: 0,
            unit_price: product.price,
            line_total: product.price * Decimal::TWO,
            product,
            quantity: 2,
            attribute_description: Some("Color: Blue".to_string()),
            bundle_items: Vec::new(),
        }
    }
}

impl ModelSource for OrderItem {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn property(&self, name: &str) -> Option<Arc<dyn ModelSource>> {
        match name {
            "Product" => Some(Arc::new(self.product.clone())),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A placed order
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    /// Order ID
    pub id: i64,

    /// Human readable order number
    pub order_number: String,

    /// Public identifier
    pub order_guid: Uuid,

    /// Store the order was placed in
    pub store_id: i64,

    /// Ordering customer
    pub customer: Customer,

    /// Currency the customer paid in
    pub customer_currency_code: String,

    /// Exchange rate from the primary currency at order time
    pub currency_rate: Decimal,

    /// Tax display preference at order time
    pub customer_tax_display_type: TaxDisplayType,

    /// Processing status
    pub order_status: OrderStatus,

    /// Payment status
    pub payment_status: PaymentStatus,

    /// Shipping status
    pub shipping_status: ShippingStatus,

    /// Billing address
    pub billing_address: Address,

    /// Shipping address, absent when nothing is shipped
    pub shipping_address: Option<Address>,

    /// Order lines
    pub items: Vec<OrderItem>,

    /// Subtotal
    pub subtotal: Decimal,

    /// Shipping fee
    pub shipping: Decimal,

    /// Payment method fee
    pub payment_fee: Decimal,

    /// Total discount
    pub discount: Decimal,

    /// Total tax
    pub tax: Decimal,

    /// Tax broken down by rate
    pub tax_rates: Vec<TaxRate>,

    /// Grand total
    pub total: Decimal,

    /// Comment left by the customer
    pub customer_comment: Option<String>,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,

    /// Soft-delete flag
    pub deleted: bool,
}

impl Order {
    /// Returns `true` if the order is complete and was created more than
    /// `max_age_days` before `now`
    pub fn is_completed_before(&self, max_age_days: u32, now: DateTime<Utc>) -> bool {
        self.order_status == OrderStatus::Complete
            && self.created_on_utc < now - Duration::days(max_age_days.into())
    }

    /// Synthetic order used for previews
    pub fn placeholder() -> Self {
        let item = OrderItem::placeholder();
        let subtotal = item.line_total;
        let tax = Decimal::new(1596, 2);

        Self {
            id: 0,
            order_number: "1001".to_string(),
            order_guid: Uuid::nil(),
            store_id: 0,
            customer: Customer::placeholder(),
            customer_currency_code: "USD".to_string(),
            currency_rate: Decimal::ONE,
            customer_tax_display_type: TaxDisplayType::IncludingTax,
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            shipping_status: ShippingStatus::NotYetShipped,
            billing_address: Address::placeholder(),
            shipping_address: Some(Address::placeholder()),
            items: vec![item],
            subtotal,
            shipping: Decimal::new(500, 2),
            payment_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            tax,
            tax_rates: vec![TaxRate {
                rate: Decimal::new(19, 0),
                amount: tax,
            }],
            total: subtotal + Decimal::new(500, 2),
            customer_comment: None,
            created_on_utc: Utc::now(),
            deleted: false,
        }
    }
}

impl ModelSource for Order {
    fn to_value(&self) -> ModelValue {
        ModelValue::from_serialize(self)
    }

    fn property(&self, name: &str) -> Option<Arc<dyn ModelSource>> {
        match name {
            "Customer" => Some(Arc::new(self.customer.clone())),
            "BillingAddress" => Some(Arc::new(self.billing_address.clone())),
            "ShippingAddress" => self
                .shipping_address
                .clone()
                .map(|address| Arc::new(address) as Arc<dyn ModelSource>),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
