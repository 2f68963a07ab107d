//! Mail transport module

use std::{
    fmt,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use lettre::{AsyncFileTransport, AsyncTransport, Message, Tokio1Executor};

#[cfg(test)]
use mockall::mock;

use crate::domain::messaging::{errors::TransportError, templates::EmailAccount};

/// Opens connections to the mail server of an account
#[async_trait]
pub trait MailTransport: Clone + Send + Sync + 'static {
    /// Open a connection for the given account
    async fn connect(
        &self,
        account: &EmailAccount,
    ) -> Result<Box<dyn MailConnection>, TransportError>;
}

/// An open connection messages are sent over
#[async_trait]
pub trait MailConnection: Send + Sync {
    /// Send one message
    async fn send(&self, message: Message) -> Result<(), TransportError>;
}

/// Writes messages as `.eml` files into a pickup directory instead of
/// sending them
pub struct PickupDirectory {
    path: PathBuf,
    transport: AsyncFileTransport<Tokio1Executor>,
}

impl PickupDirectory {
    /// Create a writer for an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        Self {
            transport: AsyncFileTransport::<Tokio1Executor>::new(&path),
            path,
        }
    }

    /// The directory messages are written to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for PickupDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PickupDirectory")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl MailConnection for PickupDirectory {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}

#[cfg(test)]
mock! {
    pub MailTransport {}

    impl Clone for MailTransport {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MailTransport for MailTransport {
        async fn connect(&self, account: &EmailAccount) -> Result<Box<dyn MailConnection>, TransportError>;
    }
}

#[cfg(test)]
mock! {
    pub MailConnection {}

    #[async_trait]
    impl MailConnection for MailConnection {
        async fn send(&self, message: Message) -> Result<(), TransportError>;
    }
}
