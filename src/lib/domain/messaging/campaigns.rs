//! Newsletter campaign delivery

use std::{collections::HashSet, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{
    commerce::{Campaign, NewsletterSubscriber},
    messaging::{
        composer::MessageFactory,
        context::MessageContext,
        errors::ComposeError,
        model::ModelPart,
        repository::MessagingRepository,
    },
};

/// Template every campaign message is composed from
pub const CAMPAIGN_TEMPLATE: &str = "System.Campaign";

/// Subscriptions loaded per page
pub const SUBSCRIBER_PAGE_SIZE: i64 = 500;

/// What happened to one subscription
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    /// Nothing was composed; a later subscription with the same address may still receive it
    Skipped,

    /// A message was composed for the address
    Composed { queued: bool },
}

/// Queues campaign messages for newsletter subscribers
#[derive(Debug, Clone)]
pub struct CampaignService<R, F>
where
    R: MessagingRepository,
    F: MessageFactory,
{
    repository: Arc<R>,
    factory: Arc<F>,
    page_size: i64,
}

impl<R, F> CampaignService<R, F>
where
    R: MessagingRepository,
    F: MessageFactory,
{
    /// Creates a campaign service
    pub fn new(repository: Arc<R>, factory: Arc<F>) -> Self {
        Self {
            repository,
            factory,
            page_size: SUBSCRIBER_PAGE_SIZE,
        }
    }

    /// Queues one message per distinct subscribed address of a store.
    ///
    /// Addresses are compared case-insensitively. Subscribers whose customer
    /// account is inactive are skipped. Cancellation is honoured between
    /// pages.
    ///
    /// # Returns
    /// The number of queued messages.
    pub async fn send(
        &self,
        campaign: &Campaign,
        store_id: i64,
        cancel: &CancellationToken,
    ) -> Result<usize, ComposeError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queued = 0;
        let mut page_index = 0;

        loop {
            if cancel.is_cancelled() {
                info!(campaign = campaign.id, queued, "campaign cancelled");
                break;
            }

            let page = self
                .repository
                .get_subscribers_page(store_id, page_index, self.page_size)
                .await?;
            let last_page = (page.len() as i64) < self.page_size;

            for subscriber in page {
                let address = subscriber.email.trim().to_lowercase();

                if seen.contains(&address) {
                    debug!(subscriber = subscriber.id, "duplicate subscription address");
                    continue;
                }

                match self.send_to(campaign, store_id, subscriber).await? {
                    Delivery::Skipped => {}
                    Delivery::Composed { queued: sent } => {
                        seen.insert(address);

                        if sent {
                            queued += 1;
                        }
                    }
                }
            }

            if last_page {
                break;
            }

            page_index += 1;
        }

        info!(campaign = campaign.id, store = store_id, queued, "campaign queued");

        Ok(queued)
    }

    async fn send_to(
        &self,
        campaign: &Campaign,
        store_id: i64,
        subscriber: NewsletterSubscriber,
    ) -> Result<Delivery, ComposeError> {
        let mut ctx = MessageContext::new(CAMPAIGN_TEMPLATE).with_store_id(store_id);

        if let Some(language_id) = subscriber.language_id {
            ctx = ctx.with_language_id(language_id);
        }

        if let Some(customer_id) = subscriber.customer_id {
            match self.repository.get_customer(customer_id).await? {
                Some(customer) if !customer.active => {
                    debug!(subscriber = subscriber.id, customer = customer_id, "customer inactive");
                    return Ok(Delivery::Skipped);
                }
                Some(customer) => ctx = ctx.with_customer(customer),
                None => {}
            }
        }

        let subscriber_id = subscriber.id;
        let parts = vec![
            ModelPart::anonymous(subscriber),
            ModelPart::anonymous(campaign.clone()),
        ];

        match self.factory.create_message(ctx, true, parts).await {
            Ok(created) => Ok(Delivery::Composed {
                queued: created.is_some_and(|created| created.queued),
            }),
            Err(err) if err.is_configuration_error() => Err(err),
            Err(err) => {
                warn!(subscriber = subscriber_id, "could not compose campaign message: {err}");
                Ok(Delivery::Skipped)
            }
        }
    }
}
