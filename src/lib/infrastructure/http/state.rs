//! Application state module

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use crate::domain::messaging::{composer::MessageFactory, queue::QueueService};

/// Global application state
#[derive(Clone)]
pub struct AppState<F: MessageFactory, Q: QueueService> {
    /// The time the server started
    pub start_time: DateTime<Utc>,

    /// Message composer
    pub messages: Arc<F>,

    /// Email queue
    pub queue: Arc<Q>,
}

impl<F, Q> AppState<F, Q>
where
    F: MessageFactory,
    Q: QueueService,
{
    /// Create a new application state
    pub fn new(messages: F, queue: Q) -> Self {
        Self {
            start_time: Utc::now(),
            messages: Arc::new(messages),
            queue: Arc::new(queue),
        }
    }
}

impl<F, Q> fmt::Debug for AppState<F, Q>
where
    F: MessageFactory,
    Q: QueueService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("start_time", &self.start_time)
            .field("messages", &"MessageFactory")
            .field("queue", &"QueueService")
            .finish()
    }
}
