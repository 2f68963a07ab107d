//! Commerce entities that messages are composed from

mod catalog;
mod customers;
mod marketing;
mod orders;
mod stores;

pub use catalog::{Product, ProductType};
pub use customers::{Address, Customer, TaxDisplayType};
pub use marketing::{Campaign, NewsletterSubscriber};
pub use orders::{BundleItem, Order, OrderItem, OrderStatus, PaymentStatus, ShippingStatus, TaxRate};
pub use stores::{Currency, Language, Store};
