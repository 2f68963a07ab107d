//! Sample models for previews
//!
//! Templates declare the models they need as comma separated dot paths, e.g.
//! `Order, Order.Customer`. Each path is evaluated segment by segment; bare
//! names pick a random persisted entity (or a synthetic placeholder) and
//! dotted continuations read a property off their parent.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use rand::Rng;
use tracing::debug;

use crate::domain::messaging::{
    errors::ComposeError,
    hooks::TestModelProvider,
    model::{ModelPart, ModelSource, TestModel},
    repository::{MessagingRepository, SampleKind},
};

type Resolved = Option<Arc<dyn ModelSource>>;

/// Resolves the preview models a template declares
#[derive(Clone)]
pub struct TestModelResolver<R>
where
    R: MessagingRepository,
{
    repository: Arc<R>,
    providers: Vec<Arc<dyn TestModelProvider>>,
}

impl<R> fmt::Debug for TestModelResolver<R>
where
    R: MessagingRepository,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelResolver")
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}

impl<R> TestModelResolver<R>
where
    R: MessagingRepository,
{
    /// Creates a resolver
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            providers: Vec::new(),
        }
    }

    /// Appends a provider consulted for unknown model names
    pub fn add_provider(&mut self, provider: Arc<dyn TestModelProvider>) {
        self.providers.push(provider);
    }

    /// Resolves every declared path.
    ///
    /// Each resolved prefix yields one part named after its last segment.
    /// Unresolvable names are left out.
    pub async fn resolve(&self, model_types: &str) -> Result<Vec<ModelPart>, ComposeError> {
        let mut memo: IndexMap<String, Resolved> = IndexMap::new();

        for path in model_types.split(',') {
            let segments: Vec<&str> = path
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .collect();

            let mut parent: Resolved = None;

            for (depth, segment) in segments.iter().enumerate() {
                let prefix = segments[..=depth].join(".");

                let resolved = match memo.get(&prefix) {
                    Some(resolved) => resolved.clone(),
                    None => {
                        let resolved = if depth == 0 {
                            self.resolve_name(segment).await?
                        } else {
                            self.resolve_member(parent.as_deref(), segment).await?
                        };

                        memo.insert(prefix, resolved.clone());
                        resolved
                    }
                };

                if resolved.is_none() {
                    break;
                }

                parent = resolved;
            }
        }

        Ok(memo
            .into_iter()
            .filter_map(|(path, resolved)| {
                let name = path.rsplit('.').next().unwrap_or(&path).to_string();
                resolved.map(|source| ModelPart::Named(name, source))
            })
            .collect())
    }

    async fn resolve_member(
        &self,
        parent: Option<&dyn ModelSource>,
        segment: &str,
    ) -> Result<Resolved, ComposeError> {
        let Some(parent) = parent else {
            return Ok(None);
        };

        // synthetic parents have no property graph
        if parent.as_any().is::<TestModel>() {
            return self.resolve_name(segment).await;
        }

        Ok(parent.property(segment))
    }

    async fn resolve_name(&self, name: &str) -> Result<Resolved, ComposeError> {
        let Some(kind) = SampleKind::from_model_name(name) else {
            let provided = self
                .providers
                .iter()
                .find_map(|provider| provider.resolve(name));

            if provided.is_none() {
                debug!(model = name, "no preview model available");
            }

            return Ok(provided);
        };

        let count = self.repository.count_samples(kind).await?;

        if count > 0 {
            let skip = rand::thread_rng().gen_range(0..count);

            if let Some(sample) = self.repository.fetch_sample(kind, skip).await? {
                debug!(model = name, skip, "using persisted preview sample");
                return Ok(Some(sample));
            }
        }

        Ok(Some(Arc::new(TestModel::new(name, kind.placeholder()))))
    }
}
