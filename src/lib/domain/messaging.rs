//! Message composition and delivery
//!
//! Domain objects are turned into a [`TemplateModel`] by the
//! [`ModelPartFactory`], rendered through the cached [`TemplateRenderer`] by
//! the [`MessageComposer`], and queued as [`QueuedEmail`]s that the
//! [`QueuedEmailDispatcher`] later sends in per-account slices.

pub mod campaigns;
pub mod composer;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod factory;
pub mod hooks;
pub mod model;
pub mod queue;
pub mod queued_email;
pub mod renderer;
pub mod repository;
pub mod settings;
pub mod templates;
pub mod test_models;
pub mod transport;
pub mod tree;

#[cfg(test)]
pub(crate) mod fixtures;

pub use campaigns::CampaignService;
pub use composer::{CreatedMessage, MessageComposer, MessageFactory};
pub use context::{MessageContext, MessageContextValidator, SkipReason, Validation, WorkContext};
pub use dispatcher::{DispatchConfig, DispatchReport, QueuedEmailDispatcher};
pub use factory::{ModelPartFactory, PartContext};
pub use model::{ModelMap, ModelPart, ModelSource, ModelValue, TemplateModel, TestModel};
pub use queue::{EmailQueue, QueueService};
pub use queued_email::{AttachmentStorage, QueuedEmail, QueuedEmailAttachment};
pub use renderer::{TemplateCache, TemplateRenderer};
pub use repository::{MessagingRepository, SampleKind};
pub use settings::{MessagingSettings, TaxSettings, ThemeSettings};
pub use templates::{EmailAccount, MessageTemplate};
pub use transport::{MailConnection, MailTransport};
pub use tree::{ModelTreeBuilder, ModelTreeNode};
