//! Template rendering and the compiled template cache

use std::{collections::HashMap, fmt, sync::Arc};

use css_inline::{CSSInliner, Url};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::messaging::{
    errors::RenderError, model::TemplateModel, templates::MessageTemplate,
};

lazy_static! {
    static ref NO_INLINE_STYLE: Regex =
        Regex::new(r#"(?is)<style[^>]*\sclass\s*=\s*["']no-inline["'][^>]*>.*?</style>"#).unwrap();
}

/// A compiled, renderable template
pub trait CompiledTemplate: Send + Sync + fmt::Debug {
    /// The source the template was compiled from
    fn source(&self) -> &str;

    /// Render the template against a model
    fn render(&self, model: &TemplateModel, culture: &str) -> Result<String, RenderError>;
}

/// The template engine collaborator
pub trait TemplateEngine: Send + Sync {
    /// Compile a template
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn CompiledTemplate>, RenderError>;

    /// Compile and render a one-off template
    fn render_str(
        &self,
        source: &str,
        model: &TemplateModel,
        culture: &str,
    ) -> Result<String, RenderError>;
}

/// Compiled body templates shared by all compositions
#[derive(Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<String, Arc<dyn CompiledTemplate>>>,
}

impl fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl TemplateCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key of a template body in a language
    pub fn key(template: &MessageTemplate, language_id: i64) -> String {
        let scope = if template.is_transient() {
            "transient"
        } else {
            "persistent"
        };

        format!("{scope}/{}/{language_id}/Body", template.name)
    }

    /// Returns the cached template for `key`, compiling it when it is missing
    /// or was compiled from a different source
    pub fn get_or_compile(
        &self,
        key: &str,
        source: &str,
        engine: &dyn TemplateEngine,
    ) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        if let Some(compiled) = self.entries.read().get(key) {
            if compiled.source() == source {
                return Ok(compiled.clone());
            }

            debug!(key, "template source changed, recompiling");
        }

        let compiled = engine.compile(key, source)?;

        self.entries
            .write()
            .insert(key.to_string(), compiled.clone());

        Ok(compiled)
    }

    /// Drops a single entry
    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached templates
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Everything needed to render one message
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// The template
    pub template: &'a MessageTemplate,

    /// Language the localized fields are taken from
    pub language_id: i64,

    /// Culture used for formatting, e.g. `en-US`
    pub culture: &'a str,

    /// Root that relative stylesheet references are resolved against
    pub base_url: &'a str,

    /// The assembled model
    pub model: &'a TemplateModel,
}

/// The rendered fields of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Rendered recipient list
    pub to: String,

    /// Rendered reply-to address
    pub reply_to: Option<String>,

    /// BCC addresses
    pub bcc: Option<String>,

    /// Rendered subject
    pub subject: String,

    /// Rendered body with inlined CSS
    pub body: String,
}

/// Renders message templates through the cache
#[derive(Clone)]
pub struct TemplateRenderer {
    engine: Arc<dyn TemplateEngine>,
    cache: Arc<TemplateCache>,
}

impl fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    /// Creates a renderer
    pub fn new(engine: Arc<dyn TemplateEngine>, cache: Arc<TemplateCache>) -> Self {
        Self { engine, cache }
    }

    /// The shared cache
    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Renders a single uncached template
    pub fn render_str(
        &self,
        source: &str,
        model: &TemplateModel,
        culture: &str,
    ) -> Result<String, RenderError> {
        self.engine.render_str(source, model, culture)
    }

    /// Renders every field of a message.
    ///
    /// Recipients, reply-to and subject are rendered first as one-off
    /// templates; the body goes through the cache and has its CSS inlined.
    pub fn render(&self, request: &RenderRequest<'_>) -> Result<RenderedMessage, RenderError> {
        let template = request.template;
        let model = request.model;

        let to = self.render_str(&template.to, model, request.culture)?;

        let reply_to = match template.reply_to.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(source) => Some(self.render_str(source, model, request.culture)?),
            None => None,
        };

        let subject = self.render_str(
            template.subject_for(request.language_id),
            model,
            request.culture,
        )?;

        let key = TemplateCache::key(template, request.language_id);
        let compiled = self.cache.get_or_compile(
            &key,
            template.body_for(request.language_id),
            self.engine.as_ref(),
        )?;

        let body = inline_css(&compiled.render(model, request.culture)?, request.base_url)?;

        Ok(RenderedMessage {
            to: to.trim().to_string(),
            reply_to: reply_to
                .map(|reply_to| reply_to.trim().to_string())
                .filter(|reply_to| !reply_to.is_empty()),
            bcc: template.bcc.clone().filter(|bcc| !bcc.trim().is_empty()),
            subject: subject.trim().to_string(),
            body,
        })
    }
}

/// Moves the rules of `<style>` blocks into `style` attributes.
///
/// Blocks with the `no-inline` class are taken out before inlining and put
/// back at the end of the `<head>`.
pub fn inline_css(html: &str, base_url: &str) -> Result<String, RenderError> {
    let kept: Vec<&str> = NO_INLINE_STYLE
        .find_iter(html)
        .map(|block| block.as_str())
        .collect();
    let html = NO_INLINE_STYLE.replace_all(html, "");

    let base_url = match Url::parse(&format!("{}/", base_url.trim_end_matches('/'))) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(base_url, "ignoring invalid base URL: {err}");
            None
        }
    };

    let inliner = CSSInliner::options()
        .base_url(base_url)
        .load_remote_stylesheets(false)
        .build();

    let inlined = inliner.inline(&html)?;

    if kept.is_empty() {
        return Ok(inlined);
    }

    let kept = kept.concat();

    Ok(match inlined.find("</head>") {
        Some(index) => format!("{}{kept}{}", &inlined[..index], &inlined[index..]),
        None => format!("{kept}{inlined}"),
    })
}
