//! SMTP mail transport implementation

use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use lettre::{
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::domain::messaging::{
    errors::TransportError,
    templates::EmailAccount,
    transport::{MailConnection, MailTransport},
};

/// Port on which SMTP servers expect an implicit TLS connection
const SMTPS_PORT: u16 = 465;

/// SMTP configuration shared by all email accounts
#[derive(Clone, Debug, Parser)]
pub struct SMTPConfig {
    /// Verify the TLS certificate
    #[clap(long, env = "SMTP_VERIFY_TLS", default_value = "true")]
    pub verify_tls: bool,

    /// Connection timeout in seconds
    #[clap(long, env = "SMTP_TIMEOUT_SECONDS", default_value = "30")]
    pub timeout_seconds: u64,
}

impl Default for SMTPConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout_seconds: 30,
        }
    }
}

/// Opens SMTP connections using the settings of each email account
#[derive(Debug, Default, Clone)]
pub struct SMTPMailTransport {
    config: SMTPConfig,
}

impl SMTPMailTransport {
    /// Create a new SMTP transport
    pub fn new(config: SMTPConfig) -> Self {
        Self { config }
    }

    /// Build the SMTP transport for an account
    pub fn mailer(
        &self,
        account: &EmailAccount,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let connect_error = |err: lettre::transport::smtp::Error| TransportError::Connect {
            host: account.host.clone(),
            message: err.to_string(),
        };

        let builder = if account.enable_ssl {
            let parameters = TlsParameters::builder(account.host.clone())
                .dangerous_accept_invalid_certs(!self.config.verify_tls)
                .build()
                .map_err(connect_error)?;

            let tls = if account.port == SMTPS_PORT {
                Tls::Wrapper(parameters)
            } else {
                Tls::Required(parameters)
            };

            AsyncSmtpTransport::<Tokio1Executor>::relay(&account.host)
                .map_err(connect_error)?
                .tls(tls)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&account.host)
        };

        let builder = builder
            .port(account.port)
            .timeout(Some(Duration::from_secs(self.config.timeout_seconds)));

        let builder = match (&account.username, &account.password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SMTPMailTransport {
    async fn connect(&self, account: &EmailAccount) -> Result<Box<dyn MailConnection>, TransportError> {
        let transport = self.mailer(account)?;

        let reachable = transport
            .test_connection()
            .await
            .map_err(|err| TransportError::Connect {
                host: account.host.clone(),
                message: err.to_string(),
            })?;

        if !reachable {
            return Err(TransportError::Connect {
                host: account.host.clone(),
                message: "server did not accept the connection".to_string(),
            });
        }

        debug!(account = account.id, host = %account.host, "SMTP connection established");

        Ok(Box::new(SMTPConnection { transport }))
    }
}

/// An SMTP transport bound to one account
struct SMTPConnection {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailConnection for SMTPConnection {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn account(port: u16, enable_ssl: bool) -> EmailAccount {
        EmailAccount {
            id: 1,
            email: "shop@example.com".to_string(),
            host: "localhost".to_string(),
            port,
            username: Some("shop".to_string()),
            password: Some("secret".to_string()),
            enable_ssl,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mailer_builds_for_every_tls_mode() -> TestResult {
        let transport = SMTPMailTransport::default();

        transport.mailer(&account(25, false))?;
        transport.mailer(&account(587, true))?;
        transport.mailer(&account(SMTPS_PORT, true))?;

        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_to_connect() {
        let transport = SMTPMailTransport::new(SMTPConfig {
            verify_tls: true,
            timeout_seconds: 1,
        });

        let result = transport.connect(&account(1, false)).await;

        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
