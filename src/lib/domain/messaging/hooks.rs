//! Extension points of the messaging pipeline
//!
//! Every hook is optional. Nothing is registered by default except the
//! [`LogNotifier`], which only logs.

use std::sync::Arc;

use tracing::error;

use crate::domain::messaging::{
    factory::PartContext,
    model::{ModelSource, ModelValue},
};

/// Invoked after a model part was built
pub trait ModelPartDecorator: Send + Sync {
    /// Adjust the freshly built part
    fn decorate(&self, source: &dyn ModelSource, part: &mut ModelValue, cx: &PartContext<'_>);
}

/// Invoked for sources without a registered converter
pub trait ModelPartMapper: Send + Sync {
    /// Build a part for the source, or `None` to let the next mapper try
    fn map(&self, source: &dyn ModelSource, cx: &PartContext<'_>) -> Option<ModelValue>;
}

/// Invoked for preview model names without a registered sample kind
pub trait TestModelProvider: Send + Sync {
    /// Supply a model for the name, or `None` to omit it
    fn resolve(&self, model_name: &str) -> Option<Arc<dyn ModelSource>>;
}

/// Operator-facing channel for problems that need human attention
pub trait OperatorNotifier: Send + Sync {
    /// Report a problem
    fn notify(&self, message: &str);
}

/// Notifier that writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl OperatorNotifier for LogNotifier {
    fn notify(&self, message: &str) {
        error!(target: "operator", "{message}");
    }
}
