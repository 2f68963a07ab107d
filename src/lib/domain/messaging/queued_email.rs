//! Queued emails awaiting dispatch

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lettre::{
    address::AddressError,
    message::{Mailbox, Mailboxes},
};

/// Where the bytes of an attachment live
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentStorage {
    /// Bytes stored with the attachment
    Blob(Vec<u8>),

    /// File on the local file system
    Path(PathBuf),

    /// File in the media storage
    FileReference(i64),
}

/// An attachment of a queued email
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedEmailAttachment {
    /// Attachment ID
    pub id: i64,

    /// File name shown to the recipient
    pub name: String,

    /// MIME type, e.g. `application/pdf`
    pub mime_type: String,

    /// Storage of the bytes
    pub storage: AttachmentStorage,
}

/// A fully rendered message awaiting transport dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedEmail {
    /// Queued email ID. `0` until persisted.
    pub id: i64,

    /// Higher values are sent first
    pub priority: i32,

    /// Sender mailbox
    pub from: String,

    /// Recipient mailboxes, separated by `;` or `,`
    pub to: String,

    /// Reply-to mailbox
    pub reply_to: Option<String>,

    /// CC mailboxes, separated by `;` or `,`
    pub cc: Option<String>,

    /// BCC mailboxes, separated by `;` or `,`
    pub bcc: Option<String>,

    /// Rendered subject
    pub subject: String,

    /// Rendered HTML body with inlined CSS
    pub body: String,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,

    /// Set once, when the message was handed to the transport
    pub sent_on_utc: Option<DateTime<Utc>>,

    /// Number of send attempts
    pub sent_tries: i32,

    /// Account the message is sent from
    pub email_account_id: i64,

    /// Only sent on explicit request
    pub send_manually: bool,

    /// Attachments
    pub attachments: Vec<QueuedEmailAttachment>,
}

impl QueuedEmail {
    /// Whether the message was sent
    pub fn is_sent(&self) -> bool {
        self.sent_on_utc.is_some()
    }

    /// Records a send attempt.
    ///
    /// The attempt counter always grows; the sent timestamp is stamped only
    /// on the first successful attempt.
    pub fn record_attempt(&mut self, succeeded: bool, now: DateTime<Utc>) {
        self.sent_tries += 1;

        if succeeded && self.sent_on_utc.is_none() {
            self.sent_on_utc = Some(now);
        }
    }
}

/// Parses a recipient list separated by `,` or `;`.
///
/// Separators inside quoted display names belong to the name.
pub fn parse_mailboxes(list: &str) -> Result<Vec<Mailbox>, AddressError> {
    let mut mailboxes = Vec::new();

    for group in unquoted_groups(list) {
        mailboxes.extend(group.parse::<Mailboxes>()?);
    }

    Ok(mailboxes)
}

/// Formats mailboxes as a header value, quoting display names where needed
pub fn format_mailboxes(mailboxes: Vec<Mailbox>) -> String {
    mailboxes.into_iter().collect::<Mailboxes>().to_string()
}

/// Splits on `;` outside quoted strings; `,` lists are left to the mailbox parser
fn unquoted_groups(list: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in list.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                groups.push(&list[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    groups.push(&list[start..]);

    groups
        .into_iter()
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use testresult::TestResult;

    use super::*;

    fn email() -> QueuedEmail {
        QueuedEmail {
            id: 1,
            priority: 5,
            from: "shop@example.com".to_string(),
            to: "jane@example.com".to_string(),
            reply_to: None,
            cc: None,
            bcc: None,
            subject: "Hello".to_string(),
            body: "<p>Hi</p>".to_string(),
            created_on_utc: Utc::now(),
            sent_on_utc: None,
            sent_tries: 0,
            email_account_id: 1,
            send_manually: false,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_failed_attempts_only_increment_tries() {
        let mut email = email();

        email.record_attempt(false, Utc::now());
        email.record_attempt(false, Utc::now());

        assert_eq!(email.sent_tries, 2);
        assert!(!email.is_sent());
    }

    #[test]
    fn test_sent_timestamp_is_stamped_once() {
        let mut email = email();
        let first = Utc::now() - Duration::minutes(5);

        email.record_attempt(true, first);
        email.record_attempt(true, Utc::now());

        assert_eq!(email.sent_on_utc, Some(first));
        assert_eq!(email.sent_tries, 2);
    }

    #[test]
    fn test_parse_mailboxes_accepts_both_separators() -> TestResult {
        let mailboxes = parse_mailboxes("a@example.com; b@example.com, c@example.com ;")?;

        let emails: Vec<_> = mailboxes.iter().map(|mailbox| mailbox.email.to_string()).collect();

        assert_eq!(emails, vec!["a@example.com", "b@example.com", "c@example.com"]);

        Ok(())
    }

    #[test]
    fn test_separators_in_quoted_names_are_kept() -> TestResult {
        let mailboxes = parse_mailboxes(r#""Doe, John" <john@example.com>; "Roe; Jane" <jane@example.com>"#)?;

        assert_eq!(mailboxes.len(), 2);
        assert_eq!(mailboxes[0].name.as_deref(), Some("Doe, John"));
        assert_eq!(mailboxes[1].name.as_deref(), Some("Roe; Jane"));
        assert_eq!(
            format_mailboxes(mailboxes),
            r#""Doe, John" <john@example.com>, "Roe; Jane" <jane@example.com>"#
        );

        Ok(())
    }

    #[test]
    fn test_invalid_lists_are_rejected() {
        assert!(parse_mailboxes("not an address").is_err());
    }
}
