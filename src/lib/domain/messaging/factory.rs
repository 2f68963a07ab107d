//! Model part factory
//!
//! Converts domain objects into template model parts. Converters are looked
//! up by the concrete type of the source; types without a converter fall
//! through to the registered [`ModelPartMapper`]s and finally to the
//! source's own opaque rendition.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use rust_decimal::Decimal;
use tracing::trace;

use crate::domain::{
    commerce::{Currency, Customer, Language, Store},
    messaging::{
        errors::ComposeError,
        hooks::{ModelPartDecorator, ModelPartMapper},
        model::{ModelPart, ModelSource, ModelValue, TemplateModel, TestModel},
        settings::TaxSettings,
    },
};

mod converters;

/// Request-specific data available to converters
#[derive(Debug, Clone, Copy)]
pub struct PartContext<'a> {
    /// Store the message is composed for
    pub store: &'a Store,

    /// Language the message is composed in
    pub language: &'a Language,

    /// Recipient customer, if any
    pub customer: Option<&'a Customer>,

    /// Base URL links are resolved against, without a trailing slash
    pub base_url: &'a str,

    /// Currency prices are shown in unless a part names another one
    pub working_currency: &'a Currency,

    /// Whether the message is a preview
    pub test_mode: bool,
}

/// Currency argument of [`ModelPartFactory::format_price`]
#[derive(Debug, Clone, Copy)]
pub enum CurrencyRef<'a> {
    /// A resolved currency
    Currency(&'a Currency),

    /// An ISO code that still needs a lookup
    Code(&'a str),
}

type PartConverter = Arc<
    dyn Fn(&dyn ModelSource, &PartContext<'_>, &ModelPartFactory) -> Result<ModelValue, ComposeError>
        + Send
        + Sync,
>;

/// Builds template model parts from domain objects
#[derive(Clone)]
pub struct ModelPartFactory {
    converters: HashMap<TypeId, PartConverter>,
    decorators: Vec<Arc<dyn ModelPartDecorator>>,
    mappers: Vec<Arc<dyn ModelPartMapper>>,
    currencies: HashMap<String, Currency>,
    tax: TaxSettings,
}

impl fmt::Debug for ModelPartFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPartFactory")
            .field("converters", &self.converters.len())
            .field("decorators", &self.decorators.len())
            .field("mappers", &self.mappers.len())
            .field("currencies", &self.currencies.keys().collect::<Vec<_>>())
            .field("tax", &self.tax)
            .finish()
    }
}

impl ModelPartFactory {
    /// Creates a factory without any converters
    pub fn new(tax: TaxSettings, currencies: Vec<Currency>) -> Self {
        Self {
            converters: HashMap::new(),
            decorators: Vec::new(),
            mappers: Vec::new(),
            currencies: currencies
                .into_iter()
                .map(|currency| (currency.code.to_uppercase(), currency))
                .collect(),
            tax,
        }
    }

    /// Creates a factory with converters for all commerce entities
    pub fn with_defaults(tax: TaxSettings, currencies: Vec<Currency>) -> Self {
        let mut factory = Self::new(tax, currencies);
        converters::register_defaults(&mut factory);
        factory
    }

    /// Registers the converter for sources of type `T`, replacing any
    /// previous one
    pub fn register<T, F>(&mut self, convert: F)
    where
        T: ModelSource,
        F: Fn(&T, &PartContext<'_>, &ModelPartFactory) -> Result<ModelValue, ComposeError>
            + Send
            + Sync
            + 'static,
    {
        let converter: PartConverter = Arc::new(move |source, cx, factory| {
            match source.as_any().downcast_ref::<T>() {
                Some(source) => convert(source, cx, factory),
                None => Ok(source.to_value()),
            }
        });

        self.converters.insert(TypeId::of::<T>(), converter);
    }

    /// Appends a decorator invoked after every built part
    pub fn add_decorator(&mut self, decorator: Arc<dyn ModelPartDecorator>) {
        self.decorators.push(decorator);
    }

    /// Appends a mapper consulted for sources without a converter
    pub fn add_mapper(&mut self, mapper: Arc<dyn ModelPartMapper>) {
        self.mappers.push(mapper);
    }

    /// Tax display settings
    pub fn tax_settings(&self) -> &TaxSettings {
        &self.tax
    }

    /// Looks up a currency by ISO code
    pub fn currency(&self, code: &str) -> Option<&Currency> {
        self.currencies.get(&code.to_uppercase())
    }

    /// Builds the part for a single source
    pub fn create_part(
        &self,
        source: &dyn ModelSource,
        cx: &PartContext<'_>,
    ) -> Result<ModelValue, ComposeError> {
        if let Some(test_model) = source.as_any().downcast_ref::<TestModel>() {
            return self.create_part(test_model.entity(), cx);
        }

        let mut part = match self.converters.get(&source.as_any().type_id()) {
            Some(convert) => convert(source, cx, self)?,
            None => self
                .mappers
                .iter()
                .find_map(|mapper| mapper.map(source, cx))
                .unwrap_or_else(|| source.to_value()),
        };

        self.decorate(source, &mut part, cx);

        Ok(part)
    }

    /// Runs the decorators over a part built outside [`Self::create_part`]
    pub fn decorate(&self, source: &dyn ModelSource, part: &mut ModelValue, cx: &PartContext<'_>) {
        for decorator in &self.decorators {
            decorator.decorate(source, part, cx);
        }
    }

    /// Builds a part and merges it into the model under its resolved name
    pub fn add_part(
        &self,
        model: &mut TemplateModel,
        part: &ModelPart,
        cx: &PartContext<'_>,
    ) -> Result<(), ComposeError> {
        let name = part
            .name()
            .ok_or_else(|| ComposeError::UnresolvablePartName(describe(part.source().as_ref())))?;

        let value = self.create_part(part.source().as_ref(), cx)?;

        trace!(part = %name, "model part created");

        model.add(name, value);

        Ok(())
    }

    /// Formats an amount for display.
    ///
    /// A rate other than one is applied before the amount is expressed in
    /// the target currency. Unknown currency codes fall back to the working
    /// currency.
    pub fn format_price(
        &self,
        amount: Decimal,
        currency: CurrencyRef<'_>,
        exchange_rate: Decimal,
        cx: &PartContext<'_>,
    ) -> String {
        let currency = match currency {
            CurrencyRef::Currency(currency) => currency,
            CurrencyRef::Code(code) => self.currency(code).unwrap_or(cx.working_currency),
        };

        let amount = if exchange_rate != Decimal::ONE {
            amount * exchange_rate
        } else {
            amount
        };

        currency.format(amount)
    }
}

fn describe(source: &dyn ModelSource) -> String {
    let debug = format!("{source:?}");

    match debug.char_indices().nth(80) {
        Some((end, _)) => format!("{}...", &debug[..end]),
        None => debug,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use testresult::TestResult;

    use super::*;
    use crate::domain::{
        commerce::Order,
        messaging::{fixtures, fixtures::PartFixture, model::ModelMap},
    };

    #[derive(Debug)]
    struct Shipment {
        tracking_number: String,
    }

    impl ModelSource for Shipment {
        fn to_value(&self) -> ModelValue {
            ModelValue::Map(ModelMap::from([(
                "TrackingNumber".to_string(),
                self.tracking_number.as_str().into(),
            )]))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct CountingDecorator(AtomicUsize);

    impl ModelPartDecorator for CountingDecorator {
        fn decorate(&self, _source: &dyn ModelSource, part: &mut ModelValue, _cx: &PartContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);

            if let Some(map) = part.as_map_mut() {
                map.insert("Decorated".into(), true.into());
            }
        }
    }

    struct ShipmentMapper;

    impl ModelPartMapper for ShipmentMapper {
        fn map(&self, source: &dyn ModelSource, _cx: &PartContext<'_>) -> Option<ModelValue> {
            let shipment = source.as_any().downcast_ref::<Shipment>()?;

            Some(ModelValue::Map(ModelMap::from([(
                "Tracking".to_string(),
                format!("#{}", shipment.tracking_number).into(),
            )])))
        }
    }

    fn shipment() -> Shipment {
        Shipment {
            tracking_number: "1Z999".to_string(),
        }
    }

    #[test]
    fn test_unregistered_types_are_used_as_is() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());

        let part = factory.create_part(&shipment(), &fixture.context())?;

        assert_eq!(part.get("TrackingNumber"), Some(&"1Z999".into()));

        Ok(())
    }

    #[test]
    fn test_mappers_handle_unregistered_types() -> TestResult {
        let fixture = PartFixture::new();
        let mut factory = fixtures::factory(TaxSettings::default());
        factory.add_mapper(Arc::new(ShipmentMapper));

        let part = factory.create_part(&shipment(), &fixture.context())?;

        assert_eq!(part.get("Tracking"), Some(&"#1Z999".into()));
        assert_eq!(part.get("TrackingNumber"), None);

        Ok(())
    }

    #[test]
    fn test_registered_converter_replaces_the_default() -> TestResult {
        let fixture = PartFixture::new();
        let mut factory = fixtures::factory(TaxSettings::default());

        factory.register::<Order, _>(|order, _, _| {
            Ok(ModelValue::Map(ModelMap::from([(
                "Number".to_string(),
                order.order_number.as_str().into(),
            )])))
        });

        let part = factory.create_part(&fixtures::order(), &fixture.context())?;

        assert_eq!(part.get("Number"), Some(&"1001".into()));
        assert_eq!(part.as_map().map(ModelMap::len), Some(1));

        Ok(())
    }

    #[test]
    fn test_decorators_run_for_every_part() -> TestResult {
        let fixture = PartFixture::new();
        let decorator = Arc::new(CountingDecorator(AtomicUsize::new(0)));
        let mut factory = fixtures::factory(TaxSettings::default());
        factory.add_decorator(decorator.clone());

        let part = factory.create_part(&shipment(), &fixture.context())?;
        assert_eq!(part.get("Decorated"), Some(&true.into()));

        let order = factory.create_part(&fixtures::order(), &fixture.context())?;
        assert_eq!(order.get("Decorated"), Some(&true.into()));

        // shipment + order + billing + shipping + one item + its product
        assert_eq!(decorator.0.load(Ordering::SeqCst), 6);

        Ok(())
    }

    #[test]
    fn test_add_part_infers_names_and_rejects_anonymous_values() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());
        let mut model = TemplateModel::new();

        factory.add_part(&mut model, &ModelPart::anonymous(fixtures::order()), &fixture.context())?;
        factory.add_part(&mut model, &ModelPart::anonymous(shipment()), &fixture.context())?;
        factory.add_part(
            &mut model,
            &ModelPart::named("Extra", ModelValue::from("x")),
            &fixture.context(),
        )?;

        assert!(model.contains("Order"));
        assert!(model.contains("Shipment"));
        assert_eq!(model.get("Extra"), Some(&"x".into()));

        let result = factory.add_part(
            &mut model,
            &ModelPart::anonymous(ModelValue::map()),
            &fixture.context(),
        );

        assert!(matches!(result, Err(ComposeError::UnresolvablePartName(_))));

        Ok(())
    }

    #[test]
    fn test_test_models_convert_their_entity() -> TestResult {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());
        let test_model = TestModel::new("Order", Arc::new(Order::placeholder()));

        let part = factory.create_part(&test_model, &fixture.context())?;

        assert_eq!(part.get("OrderNumber"), Some(&"1001".into()));
        assert!(part.get("Totals").is_some());

        Ok(())
    }

    #[test]
    fn test_format_price_applies_rate_other_than_one() {
        let fixture = PartFixture::new();
        let cx = fixture.context();
        let factory = fixtures::factory(TaxSettings::default());
        let eur = fixtures::eur();

        assert_eq!(
            factory.format_price(Decimal::new(1000, 2), CurrencyRef::Currency(&eur), Decimal::ONE, &cx),
            "10.00 €"
        );
        assert_eq!(
            factory.format_price(Decimal::new(1000, 2), CurrencyRef::Code("eur"), Decimal::new(9, 1), &cx),
            "9.00 €"
        );
    }

    #[test]
    fn test_format_price_falls_back_to_the_working_currency() {
        let fixture = PartFixture::new();
        let factory = fixtures::factory(TaxSettings::default());

        assert_eq!(
            factory.format_price(
                Decimal::new(250, 2),
                CurrencyRef::Code("XXX"),
                Decimal::ONE,
                &fixture.context()
            ),
            "$2.50"
        );
    }

    #[test]
    fn test_long_part_descriptions_are_truncated() {
        let description = describe(&ModelValue::Text("x".repeat(200)));

        assert!(description.is_ascii());
        assert!(description.ends_with("..."));
        assert_eq!(description.len(), 83);
    }
}
