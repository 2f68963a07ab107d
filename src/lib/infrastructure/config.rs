//! Messaging configuration

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::domain::messaging::{
    dispatcher::{DispatchConfig, DEFAULT_SLICE_SIZE},
    queue::DEFAULT_BATCH_LIMIT,
    settings::{MessagingSettings, TaxSettings},
};

/// Configuration of message composition and dispatch
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
pub struct MessagingConfig {
    /// Email account used when a template does not name one
    #[arg(long, env = "MESSAGING_DEFAULT_EMAIL_ACCOUNT_ID")]
    pub default_email_account_id: Option<i64>,

    /// Skip order-status messages for orders completed more than this many days ago
    #[arg(long, env = "MESSAGING_MAX_ORDER_AGE_DAYS")]
    pub max_message_order_age_days: Option<u32>,

    /// Give up on a queued email after this many attempts
    #[arg(long, env = "MESSAGING_MAX_SEND_TRIES", default_value = "3")]
    pub max_send_tries: i32,

    /// Hide tax lines for customers that see prices including tax
    #[arg(long, env = "TAX_HIDE_IN_ORDER_SUMMARY")]
    pub hide_tax_in_order_summary: bool,

    /// Hide tax lines when no tax was charged
    #[arg(long, env = "TAX_HIDE_ZERO")]
    pub hide_zero_tax: bool,

    /// Break tax down by rate
    #[arg(long, env = "TAX_DISPLAY_RATES")]
    pub display_tax_rates: bool,

    /// Emails sent per slice before progress is saved
    #[arg(long, env = "DISPATCH_SLICE_SIZE", default_value_t = DEFAULT_SLICE_SIZE)]
    pub slice_size: usize,

    /// Pending emails loaded per dispatch run
    #[arg(long, env = "DISPATCH_BATCH_LIMIT", default_value_t = DEFAULT_BATCH_LIMIT)]
    pub batch_limit: i64,

    /// Pause after each sent email, in milliseconds
    #[arg(long, env = "DISPATCH_SEND_DELAY_MS", default_value = "0")]
    pub send_delay_ms: u64,

    /// Write emails into this directory instead of sending them
    #[arg(long, env = "DISPATCH_PICKUP_DIRECTORY")]
    pub pickup_directory: Option<PathBuf>,

    /// Seconds between dispatch runs
    #[arg(long, env = "DISPATCH_INTERVAL_SECONDS", default_value = "60")]
    pub dispatch_interval_seconds: u64,
}

impl MessagingConfig {
    /// Composition settings
    pub fn settings(&self) -> MessagingSettings {
        MessagingSettings {
            default_email_account_id: self.default_email_account_id,
            max_message_order_age_days: self.max_message_order_age_days,
            max_send_tries: self.max_send_tries,
        }
    }

    /// Tax display settings
    pub fn tax_settings(&self) -> TaxSettings {
        TaxSettings {
            hide_tax_in_order_summary: self.hide_tax_in_order_summary,
            hide_zero_tax: self.hide_zero_tax,
            display_tax_rates: self.display_tax_rates,
        }
    }

    /// Dispatcher configuration
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(
            self.slice_size,
            Some(Duration::from_millis(self.send_delay_ms)),
            self.pickup_directory.clone(),
        )
    }

    /// Interval between dispatch runs
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_seconds.max(1))
    }
}
