//! Converters for the commerce entities

use rust_decimal::Decimal;

use crate::domain::{
    commerce::{
        Address, BundleItem, Campaign, Customer, NewsletterSubscriber, Order, OrderItem, Product,
        Store, TaxDisplayType,
    },
    messaging::{
        errors::ComposeError,
        factory::{CurrencyRef, ModelPartFactory, PartContext},
        model::{ModelMap, ModelSource, ModelValue},
        templates::EmailAccount,
    },
};

pub(super) fn register_defaults(factory: &mut ModelPartFactory) {
    factory.register::<Store, _>(|store, _, _| Ok(store_part(store)));
    factory.register::<Customer, _>(customer_part);
    factory.register::<Address, _>(|address, _, _| Ok(address_part(address)));
    factory.register::<Product, _>(|product, cx, factory| {
        Ok(product_part(product, CurrencyRef::Currency(cx.working_currency), Decimal::ONE, cx, factory))
    });
    factory.register::<OrderItem, _>(|item, cx, factory| {
        order_item_part(item, CurrencyRef::Currency(cx.working_currency), Decimal::ONE, cx, factory)
    });
    factory.register::<Order, _>(order_part);
    factory.register::<Campaign, _>(|campaign, _, _| Ok(campaign_part(campaign)));
    factory.register::<NewsletterSubscriber, _>(|subscriber, cx, _| {
        Ok(subscription_part(subscriber, cx))
    });
    factory.register::<EmailAccount, _>(|account, _, _| Ok(account.to_value()));
}

fn part<const N: usize>(entries: [(&str, ModelValue); N]) -> ModelValue {
    ModelValue::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<ModelMap>(),
    )
}

fn store_part(store: &Store) -> ModelValue {
    part([
        ("Id", store.id.into()),
        ("Name", store.name.as_str().into()),
        ("Url", store.base_url().into()),
        ("CompanyName", store.company_name.clone().into()),
        ("LogoUrl", store.logo_url.clone().into()),
        ("PrimaryCurrency", store.primary_currency_code.as_str().into()),
    ])
}

fn customer_part(
    customer: &Customer,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> Result<ModelValue, ComposeError> {
    let billing = optional_address_part(customer.billing_address.as_ref(), cx, factory)?;
    let shipping = optional_address_part(customer.shipping_address.as_ref(), cx, factory)?;

    Ok(part([
        ("Id", customer.id.into()),
        ("CustomerGuid", customer.customer_guid.to_string().into()),
        ("Email", customer.email.clone().into()),
        ("Username", customer.username.clone().into()),
        ("FullName", customer.full_name().into()),
        ("FirstName", customer.first_name.clone().into()),
        ("LastName", customer.last_name.clone().into()),
        ("CreatedOn", customer.created_on_utc.into()),
        ("BillingAddress", billing),
        ("ShippingAddress", shipping),
    ]))
}

fn address_part(address: &Address) -> ModelValue {
    part([
        ("FullName", address.full_name().into()),
        ("FirstName", address.first_name.as_str().into()),
        ("LastName", address.last_name.as_str().into()),
        ("Email", address.email.clone().into()),
        ("Company", address.company.clone().into()),
        ("Address1", address.address1.as_str().into()),
        ("Address2", address.address2.clone().into()),
        ("City", address.city.as_str().into()),
        ("ZipPostalCode", address.zip_postal_code.as_str().into()),
        ("StateProvince", address.state_province.clone().into()),
        ("Country", address.country.clone().into()),
        ("PhoneNumber", address.phone_number.clone().into()),
    ])
}

/// An absent address keeps the members of a present one, all null, so the
/// model tree does not depend on which addresses an entity has.
fn optional_address_part(
    address: Option<&Address>,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> Result<ModelValue, ComposeError> {
    match address {
        Some(address) => factory.create_part(address, cx),
        None => Ok(blank(address_part(&Address::placeholder()))),
    }
}

fn blank(value: ModelValue) -> ModelValue {
    match value {
        ModelValue::Map(members) => ModelValue::Map(
            members
                .into_iter()
                .map(|(name, value)| (name, blank(value)))
                .collect(),
        ),
        ModelValue::List(_) => ModelValue::List(Vec::new()),
        _ => ModelValue::Null,
    }
}

fn product_part(
    product: &Product,
    currency: CurrencyRef<'_>,
    rate: Decimal,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> ModelValue {
    part([
        ("Id", product.id.into()),
        ("Name", product.name.as_str().into()),
        ("Sku", product.sku.clone().into()),
        ("ShortDescription", product.short_description.clone().into()),
        ("Price", factory.format_price(product.price, currency, rate, cx).into()),
        ("Url", format!("{}/{}", cx.base_url, product.slug).into()),
    ])
}

fn order_item_part(
    item: &OrderItem,
    currency: CurrencyRef<'_>,
    rate: Decimal,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> Result<ModelValue, ComposeError> {
    let mut product = product_part(&item.product, currency, rate, cx, factory);
    factory.decorate(&item.product, &mut product, cx);

    let bundle_items = item
        .bundle_items
        .iter()
        .map(|bundled| bundle_item_part(bundled, currency, rate, cx, factory))
        .collect::<Vec<_>>();

    Ok(part([
        ("Id", item.id.into()),
        ("Quantity", item.quantity.into()),
        ("UnitPrice", factory.format_price(item.unit_price, currency, rate, cx).into()),
        ("LineTotal", factory.format_price(item.line_total, currency, rate, cx).into()),
        ("AttributeDescription", item.attribute_description.clone().into()),
        ("Product", product),
        ("BundleItems", bundle_items.into()),
    ]))
}

fn bundle_item_part(
    bundled: &BundleItem,
    currency: CurrencyRef<'_>,
    rate: Decimal,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> ModelValue {
    part([
        ("ProductName", bundled.product_name.as_str().into()),
        ("Quantity", bundled.quantity.into()),
        ("Price", factory.format_price(bundled.price, currency, rate, cx).into()),
    ])
}

fn order_part(
    order: &Order,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> Result<ModelValue, ComposeError> {
    let currency = CurrencyRef::Code(&order.customer_currency_code);
    let rate = order.currency_rate;

    let billing = factory.create_part(&order.billing_address, cx)?;

    let shipping = optional_address_part(order.shipping_address.as_ref(), cx, factory)?;

    let mut items = Vec::with_capacity(order.items.len());

    for item in &order.items {
        let mut item_part = order_item_part(item, currency, rate, cx, factory)?;
        factory.decorate(item, &mut item_part, cx);
        items.push(item_part);
    }

    Ok(part([
        ("Id", order.id.into()),
        ("OrderNumber", order.order_number.as_str().into()),
        ("OrderGuid", order.order_guid.to_string().into()),
        ("Status", format!("{:?}", order.order_status).into()),
        ("PaymentStatus", format!("{:?}", order.payment_status).into()),
        ("ShippingStatus", format!("{:?}", order.shipping_status).into()),
        ("CreatedOn", order.created_on_utc.into()),
        ("CustomerComment", order.customer_comment.clone().into()),
        ("Url", format!("{}/order/details/{}", cx.base_url, order.id).into()),
        ("Billing", billing),
        ("Shipping", shipping),
        ("Items", items.into()),
        ("Totals", totals_part(order, currency, rate, cx, factory)),
    ]))
}

/// How the tax of an order is shown in its totals
#[derive(Debug, PartialEq, Eq)]
enum TaxLine {
    Hidden,
    Aggregate,
    Breakdown,
}

fn tax_line(order: &Order, factory: &ModelPartFactory) -> TaxLine {
    let settings = factory.tax_settings();

    let hidden_inclusive = order.customer_tax_display_type == TaxDisplayType::IncludingTax
        && settings.hide_tax_in_order_summary;
    let hidden_zero = order.tax.is_zero() && settings.hide_zero_tax;

    if hidden_inclusive || hidden_zero {
        TaxLine::Hidden
    } else if settings.display_tax_rates && !order.tax_rates.is_empty() {
        TaxLine::Breakdown
    } else {
        TaxLine::Aggregate
    }
}

fn totals_part(
    order: &Order,
    currency: CurrencyRef<'_>,
    rate: Decimal,
    cx: &PartContext<'_>,
    factory: &ModelPartFactory,
) -> ModelValue {
    let price = |amount: Decimal| ModelValue::from(factory.format_price(amount, currency, rate, cx));

    let optional = |amount: Decimal| {
        if amount.is_zero() {
            ModelValue::Null
        } else {
            price(amount)
        }
    };

    // Every member is always present; lines that are not shown are null or empty.
    let (tax, tax_rates): (ModelValue, Vec<ModelValue>) = match tax_line(order, factory) {
        TaxLine::Hidden => (ModelValue::Null, Vec::new()),
        TaxLine::Aggregate => (price(order.tax), Vec::new()),
        TaxLine::Breakdown => (
            ModelValue::Null,
            order
                .tax_rates
                .iter()
                .map(|tax_rate| {
                    part([
                        ("Rate", format!("{}%", tax_rate.rate.normalize()).into()),
                        ("Value", price(tax_rate.amount)),
                    ])
                })
                .collect(),
        ),
    };

    part([
        ("SubTotal", price(order.subtotal)),
        ("Shipping", price(order.shipping)),
        ("PaymentFee", optional(order.payment_fee)),
        ("Discount", optional(order.discount)),
        ("Tax", tax),
        ("TaxRates", tax_rates.into()),
        ("Total", price(order.total)),
    ])
}

fn campaign_part(campaign: &Campaign) -> ModelValue {
    part([
        ("Id", campaign.id.into()),
        ("Name", campaign.name.as_str().into()),
        ("Subject", campaign.subject.as_str().into()),
        ("Body", campaign.body.as_str().into()),
    ])
}

fn subscription_part(subscriber: &NewsletterSubscriber, cx: &PartContext<'_>) -> ModelValue {
    let guid = subscriber.subscription_guid;

    part([
        ("Id", subscriber.id.into()),
        ("Email", subscriber.email.as_str().into()),
        ("Active", subscriber.active.into()),
        ("SubscriptionGuid", guid.to_string().into()),
        (
            "ActivationUrl",
            format!("{}/newsletter/subscriptionactivation/{guid}/true", cx.base_url).into(),
        ),
        (
            "DeactivationUrl",
            format!("{}/newsletter/subscriptionactivation/{guid}/false", cx.base_url).into(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::domain::{
        commerce::TaxRate,
        messaging::{fixtures, fixtures::PartFixture, settings::TaxSettings},
    };

    fn totals(order: &Order, tax: TaxSettings) -> Result<ModelValue, ComposeError> {
        let fixture = PartFixture::new();
        let part = fixtures::factory(tax).create_part(order, &fixture.context())?;

        Ok(part.get("Totals").cloned().unwrap_or_default())
    }

    fn shown(totals: &ModelValue, line: &str) -> bool {
        match totals.get(line) {
            Some(ModelValue::List(entries)) => !entries.is_empty(),
            Some(value) => !value.is_null(),
            None => false,
        }
    }

    #[test]
    fn test_zero_tax_is_hidden() -> TestResult {
        let order = Order {
            tax: Decimal::ZERO,
            tax_rates: Vec::new(),
            ..fixtures::order()
        };

        let totals = totals(
            &order,
            TaxSettings {
                hide_zero_tax: true,
                display_tax_rates: true,
                ..Default::default()
            },
        )?;

        assert!(!shown(&totals, "Tax"));
        assert!(!shown(&totals, "TaxRates"));
        assert!(shown(&totals, "Total"));

        Ok(())
    }

    #[test]
    fn test_tax_inclusive_customers_see_no_tax_when_configured() -> TestResult {
        let order = fixtures::order();

        let hidden = totals(
            &order,
            TaxSettings {
                hide_tax_in_order_summary: true,
                ..Default::default()
            },
        )?;
        assert!(!shown(&hidden, "Tax"));

        let exclusive = Order {
            customer_tax_display_type: TaxDisplayType::ExcludingTax,
            ..fixtures::order()
        };
        let shown = totals(
            &exclusive,
            TaxSettings {
                hide_tax_in_order_summary: true,
                ..Default::default()
            },
        )?;
        assert_eq!(shown.get("Tax"), Some(&"$15.96".into()));

        Ok(())
    }

    #[test]
    fn test_breakdown_and_aggregate_are_exclusive() -> TestResult {
        let order = Order {
            tax_rates: vec![
                TaxRate {
                    rate: Decimal::new(190, 1),
                    amount: Decimal::new(1200, 2),
                },
                TaxRate {
                    rate: Decimal::new(7, 0),
                    amount: Decimal::new(396, 2),
                },
            ],
            ..fixtures::order()
        };

        let breakdown = totals(
            &order,
            TaxSettings {
                display_tax_rates: true,
                ..Default::default()
            },
        )?;

        assert!(!shown(&breakdown, "Tax"));

        let Some(ModelValue::List(rates)) = breakdown.get("TaxRates") else {
            panic!("expected tax rates");
        };
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].get("Rate"), Some(&"19%".into()));
        assert_eq!(rates[1].get("Value"), Some(&"$3.96".into()));

        let aggregate = totals(&order, TaxSettings::default())?;

        assert_eq!(aggregate.get("Tax"), Some(&"$15.96".into()));
        assert!(!shown(&aggregate, "TaxRates"));

        Ok(())
    }

    #[test]
    fn test_breakdown_without_rates_falls_back_to_aggregate() -> TestResult {
        let order = Order {
            tax_rates: Vec::new(),
            ..fixtures::order()
        };

        let totals = totals(
            &order,
            TaxSettings {
                display_tax_rates: true,
                ..Default::default()
            },
        )?;

        assert!(shown(&totals, "Tax"));
        assert!(!shown(&totals, "TaxRates"));

        Ok(())
    }

    #[test]
    fn test_order_prices_use_the_customer_currency() -> TestResult {
        let order = Order {
            customer_currency_code: "EUR".to_string(),
            currency_rate: Decimal::new(9, 1),
            ..fixtures::order()
        };

        let totals = totals(&order, TaxSettings::default())?;

        assert_eq!(totals.get("SubTotal"), Some(&"89.98 €".into()));
        assert_eq!(totals.get("Shipping"), Some(&"4.50 €".into()));

        Ok(())
    }

    #[test]
    fn test_order_part_builds_nested_parts() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());
        let order = Order {
            shipping_address: None,
            ..fixtures::order()
        };

        let part = factory.create_part(&order, &fixture.context())?;

        assert_eq!(part.get("Url"), Some(&"https://shop.example.com/order/details/42".into()));
        assert_eq!(
            part.get("Billing").and_then(|billing| billing.get("FullName")),
            Some(&"John Doe".into())
        );
        assert!(part
            .get("Shipping")
            .and_then(|shipping| shipping.get("Address1"))
            .is_some_and(ModelValue::is_null));

        let Some(ModelValue::List(items)) = part.get("Items") else {
            panic!("expected items");
        };
        let product = items[0].get("Product");

        assert_eq!(
            product.and_then(|product| product.get("Url")),
            Some(&"https://shop.example.com/sample-product".into())
        );
        assert_eq!(items[0].get("LineTotal"), Some(&"$99.98".into()));

        Ok(())
    }

    #[test]
    fn test_customer_part_is_allow_listed() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());

        let part = factory.create_part(&fixtures::customer(), &fixture.context())?;

        assert_eq!(part.get("FullName"), Some(&"Jane Roe".into()));
        assert!(part.get("IsSystemAccount").is_none());
        assert!(part.get("Deleted").is_none());

        Ok(())
    }

    #[test]
    fn test_subscription_links() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());

        let part = factory.create_part(&NewsletterSubscriber::placeholder(), &fixture.context())?;

        assert_eq!(
            part.get("DeactivationUrl"),
            Some(
                &"https://shop.example.com/newsletter/subscriptionactivation/00000000-0000-0000-0000-000000000000/false"
                    .into()
            )
        );

        Ok(())
    }
}
