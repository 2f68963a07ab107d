#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Message composition and dispatch server

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use courier::{
    domain::messaging::{
        context::WorkContext,
        dispatcher::QueuedEmailDispatcher,
        factory::ModelPartFactory,
        queue::{EmailQueue, QueueService},
        renderer::{TemplateCache, TemplateRenderer},
        repository::MessagingRepository,
        settings::ThemeSettings,
        MessageComposer,
    },
    infrastructure::{
        config::MessagingConfig,
        db::postgres::{DatabaseConnectionDetails, PostgresDatabase},
        email::smtp::{SMTPConfig, SMTPMailTransport},
        http::{shutdown_signal, HttpServer, HttpServerConfig},
        templates::MiniJinjaEngine,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The HTTP server configuration
    #[clap(flatten)]
    pub server: HttpServerConfig,

    /// The database connection details
    #[clap(flatten)]
    pub db: DatabaseConnectionDetails,

    /// The SMTP configuration
    #[clap(flatten)]
    pub smtp: SMTPConfig,

    /// Composition and dispatch configuration
    #[clap(flatten)]
    pub messaging: MessagingConfig,

    /// Store messages are composed for when a request names none
    #[clap(long, env = "STORE_ID", default_value = "1")]
    pub store_id: i64,

    /// Language messages are composed in when a request names none
    #[clap(long, env = "LANGUAGE_ID")]
    pub language_id: Option<i64>,
}

#[mutants::skip]
async fn dispatch_loop(queue: impl QueueService, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = queue.send_pending(&shutdown).await {
                    error!("dispatch run failed: {err}");
                }
            }
        }
    }

    info!("dispatch loop stopped");
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let postgres = Arc::new(PostgresDatabase::new(&args.db).await?);
    postgres.migrate().await?;

    let currencies = postgres.get_currencies().await?;
    let factory = Arc::new(ModelPartFactory::with_defaults(
        args.messaging.tax_settings(),
        currencies,
    ));

    let renderer = TemplateRenderer::new(
        Arc::new(MiniJinjaEngine::new()),
        Arc::new(TemplateCache::new()),
    );

    let composer = MessageComposer::new(
        postgres.clone(),
        factory,
        renderer,
        args.messaging.settings(),
        ThemeSettings::default(),
    )
    .with_work_context(WorkContext {
        store_id: args.store_id,
        working_language_id: args.language_id,
        current_customer: None,
    });

    let dispatcher = QueuedEmailDispatcher::new(
        postgres.clone(),
        Arc::new(SMTPMailTransport::new(args.smtp.clone())),
        args.messaging.dispatch_config(),
    );

    let queue = EmailQueue::new(
        postgres,
        Arc::new(dispatcher),
        args.messaging.max_send_tries,
    )
    .with_batch_limit(args.messaging.batch_limit);

    let shutdown = CancellationToken::new();

    let server = HttpServer::new(composer, queue.clone(), args.server.clone()).await?;

    let dispatching = tokio::spawn(dispatch_loop(
        queue,
        args.messaging.dispatch_interval(),
        shutdown.clone(),
    ));

    let signals = tokio::spawn(shutdown_signal(shutdown.clone()));

    let served = server.run(shutdown.clone()).await;

    shutdown.cancel();
    signals.abort();
    dispatching.await?;

    served
}
