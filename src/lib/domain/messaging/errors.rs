//! Error types for message composition and delivery

use anyhow::anyhow;
use css_inline::InlineError;
use thiserror::Error;
use tracing::debug;

/// Errors that abort the composition of a single message
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Neither a template nor a template name was given
    #[error("a message template or template name is required")]
    TemplateNameMissing,

    /// No template with the given name exists
    #[error("message template \"{0}\" not found")]
    TemplateNotFound(String),

    /// A required template field is blank
    #[error("message template \"{name}\" has no {field}")]
    InvalidTemplate {
        /// Template name
        name: String,

        /// Blank field
        field: &'static str,
    },

    /// The requested store does not exist
    #[error("store {0} not found")]
    StoreNotFound(i64),

    /// No language could be resolved
    #[error("no active language available")]
    NoActiveLanguage,

    /// No email account could be resolved
    #[error("no email account available")]
    NoEmailAccount,

    /// Messages are never composed for system accounts
    #[error("messages cannot be composed for system account \"{0}\"")]
    SystemAccount(String),

    /// A model part has neither an explicit nor an inferable name
    #[error("unresolvable model part name for {0}")]
    UnresolvablePartName(String),

    /// A rendered address could not be parsed
    #[error("invalid email address \"{0}\"")]
    InvalidAddress(String),

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Persistence failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl ComposeError {
    /// Whether the error stems from missing or invalid configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateNameMissing
                | Self::TemplateNotFound(_)
                | Self::InvalidTemplate { .. }
                | Self::StoreNotFound(_)
                | Self::NoActiveLanguage
                | Self::NoEmailAccount
                | Self::SystemAccount(_)
        )
    }
}

/// Errors raised while compiling or rendering templates
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template source is invalid
    #[error("failed to compile template \"{name}\": {message}")]
    Compile {
        /// Template name
        name: String,

        /// Engine message
        message: String,
    },

    /// Rendering the compiled template failed
    #[error("failed to render template: {0}")]
    Render(String),

    /// CSS could not be inlined
    #[error("failed to inline CSS: {0}")]
    CssInline(String),
}

impl From<InlineError> for RenderError {
    fn from(err: InlineError) -> Self {
        debug!("InlineError -> RenderError");

        RenderError::CssInline(err.to_string())
    }
}

/// Errors raised by the persistence collaborator
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested record does not exist
    #[error("record not found")]
    NotFound,

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        debug!("sqlxError: {:?}", err);

        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            _ => RepositoryError::UnknownError(anyhow!("Unknown database error: {:?}", err)),
        }
    }
}

/// Errors raised by the mail transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection to the server could be established
    #[error("could not connect to {host}: {message}")]
    Connect {
        /// SMTP host
        host: String,

        /// Transport message
        message: String,
    },

    /// The server rejected the message
    #[error("failed to send message: {0}")]
    Send(String),

    /// The message could not be built
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid email address
    #[error("invalid email address \"{0}\"")]
    InvalidAddress(String),

    /// An attachment could not be loaded
    #[error("attachment \"{0}\" could not be loaded")]
    MissingAttachment(String),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl From<lettre::error::Error> for TransportError {
    fn from(err: lettre::error::Error) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}

/// Errors that abort a dispatch run
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Persistence failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}
