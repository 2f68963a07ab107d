//! Messaging settings

/// Composition settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagingSettings {
    /// Account used when a template does not name one
    pub default_email_account_id: Option<i64>,

    /// Order-status messages for orders completed longer ago are skipped
    pub max_message_order_age_days: Option<u32>,

    /// Queued emails are retried until this many attempts were made
    pub max_send_tries: i32,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            default_email_account_id: None,
            max_message_order_age_days: None,
            max_send_tries: 3,
        }
    }
}

/// Tax display settings used by the order totals part
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaxSettings {
    /// Hide tax lines for customers that see prices including tax
    pub hide_tax_in_order_summary: bool,

    /// Hide tax lines when no tax was charged
    pub hide_zero_tax: bool,

    /// Show tax broken down by rate
    pub display_tax_rates: bool,
}

/// Colors exposed to templates as the `Theme` part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThemeSettings {
    /// Page background
    pub body_background: String,

    /// Primary brand color
    pub brand_primary: String,

    /// Secondary brand color
    pub brand_secondary: String,

    /// Default text color
    pub text_color: String,

    /// Link color
    pub link_color: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            body_background: "#f4f6f8".to_string(),
            brand_primary: "#3f51b5".to_string(),
            brand_secondary: "#ff4081".to_string(),
            text_color: "#212121".to_string(),
            link_color: "#3f51b5".to_string(),
        }
    }
}
