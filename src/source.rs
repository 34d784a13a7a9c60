//! Email sources feeding batch scans.
//!
//! A source either fails as a whole (`ConnectionFailed`) or returns one entry
//! per message, where each entry may itself be a `FetchFailed` error.

use crate::email::EmailRecord;
use crate::error::SourceError;
use async_trait::async_trait;
use mail_parser::MessageParser;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One retrieved message, or the reason it could not be retrieved.
pub type FetchedEmail = Result<EmailRecord, SourceError>;

#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Up to `max_count` of the most recent messages, oldest first.
    async fn fetch(&self, max_count: usize) -> Result<Vec<FetchedEmail>, SourceError>;
}

/// Parses a raw RFC 822 message into an [`EmailRecord`].
///
/// The subject is MIME-decoded, the sender is the `From` address rendered as
/// `Name <addr>` (or just `addr`), and the body is the first plain-text part.
pub fn parse_message(raw: &[u8], max_body_chars: usize) -> Result<EmailRecord, SourceError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| SourceError::FetchFailed("Not a parseable RFC 822 message".to_string()))?;

    let subject = message.subject().unwrap_or_default().to_string();

    let sender = message
        .from()
        .and_then(|from| from.first())
        .map(|addr| match (addr.name(), addr.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .unwrap_or_default();

    let body = message
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();

    Ok(EmailRecord::new(subject, sender, body, max_body_chars))
}

/// Reads messages from a Maildir (`new/` and `cur/`) or a flat directory of
/// message files.
pub struct MaildirSource {
    root: PathBuf,
    max_body_chars: usize,
}

impl MaildirSource {
    pub fn new(root: impl Into<PathBuf>, max_body_chars: usize) -> Self {
        Self {
            root: root.into(),
            max_body_chars,
        }
    }

    fn message_dirs(&self) -> Result<Vec<PathBuf>, SourceError> {
        let metadata = std::fs::metadata(&self.root).map_err(|e| {
            SourceError::ConnectionFailed(format!("{}: {e}", self.root.display()))
        })?;
        if !metadata.is_dir() {
            return Err(SourceError::ConnectionFailed(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let maildir: Vec<PathBuf> = ["new", "cur"]
            .iter()
            .map(|sub| self.root.join(sub))
            .filter(|dir| dir.is_dir())
            .collect();

        if maildir.is_empty() {
            Ok(vec![self.root.clone()])
        } else {
            Ok(maildir)
        }
    }

    /// Message files sorted oldest first by modification time.
    fn list_messages(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

        for dir in self.message_dirs()? {
            let entries = std::fs::read_dir(&dir).map_err(|e| {
                SourceError::ConnectionFailed(format!("{}: {e}", dir.display()))
            })?;

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Skipping unlistable entry in {}: {e}", dir.display());
                        continue;
                    }
                };
                let path = entry.path();
                if !path.is_file() || is_hidden(&path) {
                    continue;
                }
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((modified, path));
            }
        }

        // Ties broken by name for a stable order.
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn read_message(&self, path: &Path) -> FetchedEmail {
        let raw = std::fs::read(path)
            .map_err(|e| SourceError::FetchFailed(format!("{}: {e}", path.display())))?;
        parse_message(&raw, self.max_body_chars).map_err(|e| match e {
            SourceError::FetchFailed(reason) => {
                SourceError::FetchFailed(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[async_trait]
impl EmailSource for MaildirSource {
    async fn fetch(&self, max_count: usize) -> Result<Vec<FetchedEmail>, SourceError> {
        let files = self.list_messages()?;
        let skip = files.len().saturating_sub(max_count);

        log::info!(
            "Fetching {} of {} messages from {}",
            files.len() - skip,
            files.len(),
            self.root.display()
        );

        Ok(files[skip..]
            .iter()
            .map(|path| {
                let fetched = self.read_message(path);
                if let Err(e) = &fetched {
                    log::warn!("{e}");
                }
                fetched
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SIMPLE: &str = "From: Prize Desk <claims@winner123.com>\r\n\
To: you@example.com\r\n\
Subject: You WON!\r\n\
\r\n\
Claim your cash prize now.\r\n";

    const ENCODED_SUBJECT: &str = "From: alice@example.com\r\n\
Subject: =?UTF-8?B?Q2Fmw6kgbWVldGluZw==?=\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See you there.\r\n";

    const MULTIPART: &str = "From: news@example.com\r\n\
Subject: Newsletter\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain part\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML part</p>\r\n\
--b1--\r\n";

    #[test]
    fn test_parse_simple_message() {
        let record = parse_message(SIMPLE.as_bytes(), 1000).unwrap();
        assert_eq!(record.subject, "You WON!");
        assert_eq!(record.sender, "Prize Desk <claims@winner123.com>");
        assert!(record.body.starts_with("Claim your cash prize now."));
    }

    #[test]
    fn test_parse_decodes_subject() {
        let record = parse_message(ENCODED_SUBJECT.as_bytes(), 1000).unwrap();
        assert_eq!(record.subject, "Café meeting");
        assert_eq!(record.sender, "alice@example.com");
    }

    #[test]
    fn test_parse_prefers_plain_text_part() {
        let record = parse_message(MULTIPART.as_bytes(), 1000).unwrap();
        assert!(record.body.contains("Plain part"));
        assert!(!record.body.contains("<p>"));
    }

    #[test]
    fn test_parse_truncates_body() {
        let raw = format!("From: a@example.com\r\nSubject: x\r\n\r\n{}", "b".repeat(5000));
        let record = parse_message(raw.as_bytes(), 1000).unwrap();
        assert_eq!(record.body.chars().count(), 1000);
    }

    #[tokio::test]
    async fn test_missing_mailbox_is_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = MaildirSource::new(dir.path().join("absent"), 1000);
        assert!(matches!(
            source.fetch(5).await,
            Err(SourceError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_most_recent_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let new_dir = dir.path().join("new");
        fs::create_dir(&new_dir).unwrap();
        fs::create_dir(dir.path().join("cur")).unwrap();

        for i in 0..4 {
            let raw = format!("From: a@example.com\r\nSubject: message {i}\r\n\r\nbody {i}\r\n");
            fs::write(new_dir.join(format!("{i}.eml")), raw).unwrap();
            // Distinct modification times.
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        fs::write(new_dir.join(".hidden"), "ignored").unwrap();

        let source = MaildirSource::new(dir.path(), 1000);
        let fetched = source.fetch(2).await.unwrap();
        let subjects: Vec<String> = fetched
            .into_iter()
            .map(|f| f.unwrap().subject)
            .collect();
        assert_eq!(subjects, vec!["message 2", "message 3"]);
    }

    #[tokio::test]
    async fn test_flat_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.eml"), SIMPLE).unwrap();

        let source = MaildirSource::new(dir.path(), 1000);
        let fetched = source.fetch(10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].as_ref().unwrap().subject, "You WON!");
    }
}
