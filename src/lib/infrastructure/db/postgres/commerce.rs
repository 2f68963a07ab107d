//! Postgres loaders for the commerce entities messages are composed from

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query_as, FromRow};
use tracing::warn;
use uuid::Uuid;

use crate::{
    domain::{
        commerce::{
            Address, BundleItem, Campaign, Currency, Customer, Language, NewsletterSubscriber,
            Order, OrderItem, OrderStatus, PaymentStatus, Product, ProductType, ShippingStatus,
            Store, TaxDisplayType, TaxRate,
        },
        messaging::errors::RepositoryError,
    },
    infrastructure::db::postgres::PostgresDatabase,
};

#[derive(FromRow)]
pub(super) struct StoreRecord {
    id: i64,
    name: String,
    url: String,
    company_name: Option<String>,
    logo_url: Option<String>,
    primary_currency_code: String,
    default_language_id: Option<i64>,
}

impl From<StoreRecord> for Store {
    fn from(record: StoreRecord) -> Self {
        Store {
            id: record.id,
            name: record.name,
            url: record.url,
            company_name: record.company_name,
            logo_url: record.logo_url,
            primary_currency_code: record.primary_currency_code,
            default_language_id: record.default_language_id,
        }
    }
}

#[derive(FromRow)]
pub(super) struct LanguageRecord {
    id: i64,
    name: String,
    culture: String,
    published: bool,
    display_order: i32,
}

impl From<LanguageRecord> for Language {
    fn from(record: LanguageRecord) -> Self {
        Language {
            id: record.id,
            name: record.name,
            culture: record.culture,
            published: record.published,
            display_order: record.display_order,
        }
    }
}

#[derive(FromRow)]
pub(super) struct CurrencyRecord {
    id: i64,
    code: String,
    name: String,
    symbol: Option<String>,
    custom_formatting: Option<String>,
    rounding_decimals: i32,
    rate: Decimal,
}

impl From<CurrencyRecord> for Currency {
    fn from(record: CurrencyRecord) -> Self {
        Currency {
            id: record.id,
            code: record.code,
            name: record.name,
            symbol: record.symbol,
            custom_formatting: record.custom_formatting,
            rounding_decimals: u32::try_from(record.rounding_decimals).unwrap_or(2),
            rate: record.rate,
        }
    }
}

#[derive(FromRow)]
struct AddressRecord {
    id: i64,
    first_name: String,
    last_name: String,
    email: Option<String>,
    company: Option<String>,
    address1: String,
    address2: Option<String>,
    city: String,
    zip_postal_code: String,
    state_province: Option<String>,
    country: Option<String>,
    phone_number: Option<String>,
}

impl From<AddressRecord> for Address {
    fn from(record: AddressRecord) -> Self {
        Address {
            id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            company: record.company,
            address1: record.address1,
            address2: record.address2,
            city: record.city,
            zip_postal_code: record.zip_postal_code,
            state_province: record.state_province,
            country: record.country,
            phone_number: record.phone_number,
        }
    }
}

#[derive(FromRow)]
struct CustomerRecord {
    id: i64,
    customer_guid: Uuid,
    email: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    active: bool,
    deleted: bool,
    is_system_account: bool,
    system_name: Option<String>,
    tax_display_type: i32,
    billing_address_id: Option<i64>,
    shipping_address_id: Option<i64>,
    created_on_utc: DateTime<Utc>,
}

#[derive(FromRow)]
struct ProductRecord {
    id: i64,
    name: String,
    sku: Option<String>,
    short_description: Option<String>,
    price: Decimal,
    slug: String,
    product_type: i32,
    published: bool,
    deleted: bool,
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        Product {
            id: record.id,
            name: record.name,
            sku: record.sku,
            short_description: record.short_description,
            price: record.price,
            slug: record.slug,
            product_type: ProductType::from_id(record.product_type),
            published: record.published,
            deleted: record.deleted,
        }
    }
}

#[derive(FromRow)]
struct OrderRecord {
    id: i64,
    order_number: String,
    order_guid: Uuid,
    store_id: i64,
    customer_id: i64,
    customer_currency_code: String,
    currency_rate: Decimal,
    customer_tax_display_type: i32,
    order_status: i32,
    payment_status: i32,
    shipping_status: i32,
    billing_address_id: i64,
    shipping_address_id: Option<i64>,
    subtotal: Decimal,
    shipping: Decimal,
    payment_fee: Decimal,
    discount: Decimal,
    tax: Decimal,
    tax_rates: String,
    total: Decimal,
    customer_comment: Option<String>,
    created_on_utc: DateTime<Utc>,
    deleted: bool,
}

#[derive(FromRow)]
struct OrderItemRecord {
    id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
    attribute_description: Option<String>,
}

#[derive(FromRow)]
struct BundleItemRecord {
    product_name: String,
    quantity: i32,
    price: Decimal,
}

#[derive(FromRow)]
pub(super) struct CampaignRecord {
    id: i64,
    name: String,
    subject: String,
    body: String,
    created_on_utc: DateTime<Utc>,
}

impl From<CampaignRecord> for Campaign {
    fn from(record: CampaignRecord) -> Self {
        Campaign {
            id: record.id,
            name: record.name,
            subject: record.subject,
            body: record.body,
            created_on_utc: record.created_on_utc,
        }
    }
}

#[derive(FromRow)]
pub(super) struct SubscriberRecord {
    id: i64,
    subscription_guid: Uuid,
    email: String,
    active: bool,
    store_id: i64,
    customer_id: Option<i64>,
    language_id: Option<i64>,
    created_on_utc: DateTime<Utc>,
}

impl From<SubscriberRecord> for NewsletterSubscriber {
    fn from(record: SubscriberRecord) -> Self {
        NewsletterSubscriber {
            id: record.id,
            subscription_guid: record.subscription_guid,
            email: record.email,
            active: record.active,
            store_id: record.store_id,
            customer_id: record.customer_id,
            language_id: record.language_id,
            created_on_utc: record.created_on_utc,
        }
    }
}

/// Parses `rate:amount` pairs separated by `;`. Malformed pairs are skipped.
pub(super) fn parse_tax_rates(value: &str) -> Vec<TaxRate> {
    value
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let parsed = pair.split_once(':').and_then(|(rate, amount)| {
                Some(TaxRate {
                    rate: Decimal::from_str(rate.trim()).ok()?,
                    amount: Decimal::from_str(amount.trim()).ok()?,
                })
            });

            if parsed.is_none() {
                warn!(pair, "skipping malformed tax rate");
            }

            parsed
        })
        .collect()
}

impl PostgresDatabase {
    #[mutants::skip]
    pub(super) async fn find_store(&self, id: i64) -> Result<Option<Store>, RepositoryError> {
        Ok(query_as::<_, StoreRecord>(
            r#"
            SELECT id, name, url, company_name, logo_url, primary_currency_code, default_language_id
            FROM stores
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Store::from))
    }

    #[mutants::skip]
    async fn find_address(&self, id: Option<i64>) -> Result<Option<Address>, RepositoryError> {
        let Some(id) = id else {
            return Ok(None);
        };

        Ok(query_as::<_, AddressRecord>(
            r#"
            SELECT
                id, first_name, last_name, email, company, address1, address2,
                city, zip_postal_code, state_province, country, phone_number
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Address::from))
    }

    #[mutants::skip]
    pub(super) async fn find_customer(&self, id: i64) -> Result<Option<Customer>, RepositoryError> {
        let record = query_as::<_, CustomerRecord>(
            r#"
            SELECT
                id, customer_guid, email, username, first_name, last_name, active, deleted,
                is_system_account, system_name, tax_display_type, billing_address_id,
                shipping_address_id, created_on_utc
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        Ok(Some(Customer {
            id: record.id,
            customer_guid: record.customer_guid,
            email: record.email,
            username: record.username,
            first_name: record.first_name,
            last_name: record.last_name,
            active: record.active,
            deleted: record.deleted,
            is_system_account: record.is_system_account,
            system_name: record.system_name,
            tax_display_type: TaxDisplayType::from_id(record.tax_display_type),
            billing_address: self.find_address(record.billing_address_id).await?,
            shipping_address: self.find_address(record.shipping_address_id).await?,
            created_on_utc: record.created_on_utc,
        }))
    }

    #[mutants::skip]
    pub(super) async fn find_product(&self, id: i64) -> Result<Option<Product>, RepositoryError> {
        Ok(query_as::<_, ProductRecord>(
            r#"
            SELECT id, name, sku, short_description, price, slug, product_type, published, deleted
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::from))
    }

    #[mutants::skip]
    async fn find_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, RepositoryError> {
        let records = query_as::<_, OrderItemRecord>(
            r#"
            SELECT id, product_id, quantity, unit_price, line_total, attribute_description
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(records.len());

        for record in records {
            let product = self
                .find_product(record.product_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;

            let bundle_items = query_as::<_, BundleItemRecord>(
                r#"
                SELECT product_name, quantity, price
                FROM order_item_bundle_items
                WHERE order_item_id = $1
                ORDER BY id
                "#,
            )
            .bind(record.id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|bundle| BundleItem {
                product_name: bundle.product_name,
                quantity: bundle.quantity,
                price: bundle.price,
            })
            .collect();

            items.push(OrderItem {
                id: record.id,
                product,
                quantity: record.quantity,
                unit_price: record.unit_price,
                line_total: record.line_total,
                attribute_description: record.attribute_description,
                bundle_items,
            });
        }

        Ok(items)
    }

    #[mutants::skip]
    pub(super) async fn find_order(&self, id: i64) -> Result<Option<Order>, RepositoryError> {
        let record = query_as::<_, OrderRecord>(
            r#"
            SELECT
                id, order_number, order_guid, store_id, customer_id, customer_currency_code,
                currency_rate, customer_tax_display_type, order_status, payment_status,
                shipping_status, billing_address_id, shipping_address_id, subtotal, shipping,
                payment_fee, discount, tax, tax_rates, total, customer_comment, created_on_utc,
                deleted
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let customer = self
            .find_customer(record.customer_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let billing_address = self
            .find_address(Some(record.billing_address_id))
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(Some(Order {
            id: record.id,
            order_number: record.order_number,
            order_guid: record.order_guid,
            store_id: record.store_id,
            customer,
            customer_currency_code: record.customer_currency_code,
            currency_rate: record.currency_rate,
            customer_tax_display_type: TaxDisplayType::from_id(record.customer_tax_display_type),
            order_status: OrderStatus::from_id(record.order_status),
            payment_status: PaymentStatus::from_id(record.payment_status),
            shipping_status: ShippingStatus::from_id(record.shipping_status),
            billing_address,
            shipping_address: self.find_address(record.shipping_address_id).await?,
            items: self.find_order_items(record.id).await?,
            subtotal: record.subtotal,
            shipping: record.shipping,
            payment_fee: record.payment_fee,
            discount: record.discount,
            tax: record.tax,
            tax_rates: parse_tax_rates(&record.tax_rates),
            total: record.total,
            customer_comment: record.customer_comment,
            created_on_utc: record.created_on_utc,
            deleted: record.deleted,
        }))
    }

    #[mutants::skip]
    pub(super) async fn find_campaign(&self, id: i64) -> Result<Option<Campaign>, RepositoryError> {
        Ok(query_as::<_, CampaignRecord>(
            "SELECT id, name, subject, body, created_on_utc FROM campaigns WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Campaign::from))
    }

    #[mutants::skip]
    pub(super) async fn find_subscriber(
        &self,
        id: i64,
    ) -> Result<Option<NewsletterSubscriber>, RepositoryError> {
        Ok(query_as::<_, SubscriberRecord>(
            r#"
            SELECT
                id, subscription_guid, email, active, store_id, customer_id, language_id,
                created_on_utc
            FROM newsletter_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(NewsletterSubscriber::from))
    }
}
