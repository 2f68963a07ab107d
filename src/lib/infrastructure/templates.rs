//! MiniJinja template engine
//!
//! Every compiled template owns a small environment holding just its own
//! source, so it can be cached and shared across threads.

use std::{fmt, sync::Arc};

use minijinja::{context, AutoEscape, Environment, UndefinedBehavior, Value};

use crate::domain::messaging::{
    errors::RenderError,
    model::TemplateModel,
    renderer::{CompiledTemplate, TemplateEngine},
};

const INLINE_TEMPLATE: &str = "inline";

fn environment() -> Environment<'static> {
    let mut env = Environment::new();

    // missing members render as empty strings
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    // model values may carry markup
    env.set_auto_escape_callback(|_| AutoEscape::None);

    env
}

fn render_context(model: &TemplateModel, culture: &str) -> Value {
    context! { Culture => culture, ..Value::from_serialize(model) }
}

fn compile_error(name: &str, err: minijinja::Error) -> RenderError {
    RenderError::Compile {
        name: name.to_string(),
        message: err.to_string(),
    }
}

fn render_error(err: minijinja::Error) -> RenderError {
    RenderError::Render(err.to_string())
}

/// A compiled MiniJinja template
pub struct MiniJinjaTemplate {
    name: String,
    source: String,
    env: Environment<'static>,
}

impl fmt::Debug for MiniJinjaTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniJinjaTemplate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MiniJinjaTemplate {
    /// Parses a template
    pub fn new(name: &str, source: &str) -> Result<Self, RenderError> {
        let mut env = environment();

        env.add_template_owned(name.to_string(), source.to_string())
            .map_err(|err| compile_error(name, err))?;

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            env,
        })
    }
}

impl CompiledTemplate for MiniJinjaTemplate {
    fn source(&self) -> &str {
        &self.source
    }

    fn render(&self, model: &TemplateModel, culture: &str) -> Result<String, RenderError> {
        self.env
            .get_template(&self.name)
            .map_err(render_error)?
            .render(render_context(model, culture))
            .map_err(render_error)
    }
}

/// Template engine backed by MiniJinja
pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl fmt::Debug for MiniJinjaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiniJinjaEngine").finish_non_exhaustive()
    }
}

impl MiniJinjaEngine {
    /// Creates an engine
    pub fn new() -> Self {
        Self { env: environment() }
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        Ok(Arc::new(MiniJinjaTemplate::new(name, source)?))
    }

    fn render_str(
        &self,
        source: &str,
        model: &TemplateModel,
        culture: &str,
    ) -> Result<String, RenderError> {
        self.env
            .render_named_str(INLINE_TEMPLATE, source, render_context(model, culture))
            .map_err(render_error)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::domain::messaging::model::{ModelMap, ModelValue};

    fn model() -> TemplateModel {
        let mut model = TemplateModel::new();

        model.add(
            "Customer",
            ModelValue::Map(ModelMap::from([
                ("FirstName".to_string(), "Jane".into()),
                ("Bio".to_string(), "<b>hi</b>".into()),
            ])),
        );
        model.add(
            "Order",
            ModelValue::Map(ModelMap::from([(
                "Items".to_string(),
                ModelValue::List(vec!["Shirt".into(), "Hat".into()]),
            )])),
        );

        model
    }

    #[test]
    fn test_compiled_templates_render_model_members() -> TestResult {
        let template = MiniJinjaEngine::new().compile(
            "persistent/Welcome/1/Body",
            "Hello {{ Customer.FirstName }}{% for item in Order.Items %}, {{ item }}{% endfor %}",
        )?;

        assert_eq!(template.render(&model(), "en-US")?, "Hello Jane, Shirt, Hat");

        Ok(())
    }

    #[test]
    fn test_missing_members_render_empty_and_markup_is_kept() -> TestResult {
        let rendered = MiniJinjaEngine::new().render_str(
            "[{{ Customer.Nickname }}]{{ Customer.Bio }} {{ Culture }}",
            &model(),
            "de-DE",
        )?;

        assert_eq!(rendered, "[]<b>hi</b> de-DE");

        Ok(())
    }

    #[test]
    fn test_invalid_source_is_a_compile_error() {
        let result = MiniJinjaEngine::new().compile("broken", "{% if %}");

        assert!(matches!(result, Err(RenderError::Compile { .. })));
    }
}
