//! Template model values and parts
//!
//! A [`TemplateModel`] is the full named collection of model parts handed to
//! the template engine for one message. Parts are built from domain objects
//! implementing [`ModelSource`] and stored as [`ModelValue`] trees.

use std::{any::Any, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serialize, Serializer,
};

/// Ordered string-keyed map of model values
pub type ModelMap = IndexMap<String, ModelValue>;

/// A single value inside a template model
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ModelValue {
    /// Absent value. Also used to tombstone a key during merges.
    #[default]
    Null,

    /// Boolean scalar
    Bool(bool),

    /// Integer scalar
    Int(i64),

    /// Decimal scalar
    Decimal(Decimal),

    /// String scalar
    Text(String),

    /// Timestamp scalar
    DateTime(DateTime<Utc>),

    /// Sequence of values; not guaranteed to be homogeneous
    List(Vec<ModelValue>),

    /// Dictionary shaped value
    Map(ModelMap),

    /// Member bag whose shape is opaque: only the member names are
    /// advertised to tooling.
    Bag(ModelMap),
}

impl ModelValue {
    /// Creates an empty dictionary value
    pub fn map() -> Self {
        ModelValue::Map(ModelMap::new())
    }

    /// Converts any serializable value into a model value.
    ///
    /// Values that fail to serialize become [`ModelValue::Null`].
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value).map_or(ModelValue::Null, ModelValue::from)
    }

    /// Returns `true` for [`ModelValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, ModelValue::Null)
    }

    /// Returns the entries of a `Map` or `Bag`
    pub fn as_map(&self) -> Option<&ModelMap> {
        match self {
            ModelValue::Map(map) | ModelValue::Bag(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the mutable entries of a `Map` or `Bag`
    pub fn as_map_mut(&mut self) -> Option<&mut ModelMap> {
        match self {
            ModelValue::Map(map) | ModelValue::Bag(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a member of a `Map` or `Bag`
    pub fn get(&self, key: &str) -> Option<&ModelValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Returns the text of a `Text` value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ModelValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Merges `other` into `self`.
    ///
    /// Two maps are merged key by key (recursively on collisions); every
    /// other combination is an overwrite.
    pub fn merge(&mut self, other: ModelValue) {
        match (self, other) {
            (
                ModelValue::Map(target) | ModelValue::Bag(target),
                ModelValue::Map(source) | ModelValue::Bag(source),
            ) => merge_maps(target, source),
            (slot, other) => *slot = other,
        }
    }
}

fn merge_maps(target: &mut ModelMap, source: ModelMap) {
    for (key, value) in source {
        match target.get_mut(&key) {
            Some(existing) => existing.merge(value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

impl Serialize for ModelValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ModelValue::Null => serializer.serialize_none(),
            ModelValue::Bool(value) => serializer.serialize_bool(*value),
            ModelValue::Int(value) => serializer.serialize_i64(*value),
            ModelValue::Decimal(value) => serializer.serialize_str(&value.to_string()),
            ModelValue::Text(value) => serializer.serialize_str(value),
            ModelValue::DateTime(value) => serializer.serialize_str(&value.to_rfc3339()),
            ModelValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ModelValue::Map(entries) | ModelValue::Bag(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for ModelValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ModelValue::Null,
            Value::Bool(value) => ModelValue::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(int) => ModelValue::Int(int),
                None => number
                    .to_string()
                    .parse::<Decimal>()
                    .map_or_else(|_| ModelValue::Text(number.to_string()), ModelValue::Decimal),
            },
            Value::String(text) => ModelValue::Text(text),
            Value::Array(items) => ModelValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => ModelValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ModelValue {
    fn from(value: bool) -> Self {
        ModelValue::Bool(value)
    }
}

impl From<i64> for ModelValue {
    fn from(value: i64) -> Self {
        ModelValue::Int(value)
    }
}

impl From<i32> for ModelValue {
    fn from(value: i32) -> Self {
        ModelValue::Int(value.into())
    }
}

impl From<Decimal> for ModelValue {
    fn from(value: Decimal) -> Self {
        ModelValue::Decimal(value)
    }
}

impl From<String> for ModelValue {
    fn from(value: String) -> Self {
        ModelValue::Text(value)
    }
}

impl From<&str> for ModelValue {
    fn from(value: &str) -> Self {
        ModelValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for ModelValue {
    fn from(value: DateTime<Utc>) -> Self {
        ModelValue::DateTime(value)
    }
}

impl From<ModelMap> for ModelValue {
    fn from(value: ModelMap) -> Self {
        ModelValue::Map(value)
    }
}

impl From<Vec<ModelValue>> for ModelValue {
    fn from(value: Vec<ModelValue>) -> Self {
        ModelValue::List(value)
    }
}

impl<T: Into<ModelValue>> From<Option<T>> for ModelValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ModelValue::Null, Into::into)
    }
}

/// The named collection of parts rendered for one message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateModel {
    parts: ModelMap,
}

impl TemplateModel {
    /// Creates an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a part, deep-merging into an existing part of the same name
    pub fn add(&mut self, name: impl Into<String>, value: ModelValue) {
        let name = name.into();

        match self.parts.get_mut(&name) {
            Some(existing) => existing.merge(value),
            None => {
                self.parts.insert(name, value);
            }
        }
    }

    /// Tombstones a part so that templates see it as absent
    pub fn hide(&mut self, name: impl Into<String>) {
        self.parts.insert(name.into(), ModelValue::Null);
    }

    /// Returns a part by name
    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.parts.get(name)
    }

    /// Returns a mutable part by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModelValue> {
        self.parts.get_mut(name)
    }

    /// Returns `true` if a part with the given name exists
    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Iterates the parts in insertion order
    pub fn parts(&self) -> impl Iterator<Item = (&String, &ModelValue)> {
        self.parts.iter()
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the model has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Serialize for TemplateModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parts.len()))?;
        for (key, value) in &self.parts {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A domain object that can contribute a part to a template model
pub trait ModelSource: Any + Send + Sync + fmt::Debug {
    /// Name under which the object is added when no explicit name is given.
    ///
    /// Defaults to the short Rust type name.
    fn model_name(&self) -> Option<String> {
        Some(short_type_name(std::any::type_name::<Self>()).to_string())
    }

    /// Opaque rendition used when no converter is registered for the type
    fn to_value(&self) -> ModelValue;

    /// Returns a related object by property name
    fn property(&self, _name: &str) -> Option<Arc<dyn ModelSource>> {
        None
    }

    /// Upcast used to dispatch to registered converters
    fn as_any(&self) -> &dyn Any;
}

/// Strips the module path and generic arguments from a type name
pub(crate) fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);

    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

impl ModelSource for ModelValue {
    fn model_name(&self) -> Option<String> {
        None
    }

    fn to_value(&self) -> ModelValue {
        self.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Synthetic stand-in for a model part, used only while previewing
#[derive(Clone, Debug)]
pub struct TestModel {
    model_name: String,
    entity: Arc<dyn ModelSource>,
}

impl TestModel {
    /// Wraps a placeholder entity under the given model name
    pub fn new(model_name: impl Into<String>, entity: Arc<dyn ModelSource>) -> Self {
        Self {
            model_name: model_name.into(),
            entity,
        }
    }

    /// The declared model name
    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// The wrapped placeholder entity
    pub fn entity(&self) -> &dyn ModelSource {
        self.entity.as_ref()
    }
}

impl ModelSource for TestModel {
    fn model_name(&self) -> Option<String> {
        Some(self.model_name.clone())
    }

    fn to_value(&self) -> ModelValue {
        self.entity.to_value()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A contribution to the template model
#[derive(Clone, Debug)]
pub enum ModelPart {
    /// Part added under an explicit key
    Named(String, Arc<dyn ModelSource>),

    /// Part whose key is inferred from the source
    Anonymous(Arc<dyn ModelSource>),
}

impl ModelPart {
    /// Creates a part with an explicit name
    pub fn named(name: impl Into<String>, source: impl ModelSource) -> Self {
        ModelPart::Named(name.into(), Arc::new(source))
    }

    /// Creates a part whose name is inferred from the source
    pub fn anonymous(source: impl ModelSource) -> Self {
        ModelPart::Anonymous(Arc::new(source))
    }

    /// The source object
    pub fn source(&self) -> &Arc<dyn ModelSource> {
        match self {
            ModelPart::Named(_, source) | ModelPart::Anonymous(source) => source,
        }
    }

    /// The explicit name, else the name inferred from the source
    pub fn name(&self) -> Option<String> {
        match self {
            ModelPart::Named(name, _) => Some(name.clone()),
            ModelPart::Anonymous(source) => source.model_name(),
        }
    }

    /// Downcasts the source to a concrete type
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.source().as_any().downcast_ref::<T>()
    }
}
