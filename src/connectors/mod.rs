use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

pub mod gmail_api;

pub use gmail_api::{Credential, GmailApiConnector, GmailSession};

/// Default `maxResults` for a listing call.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    pub messages: Vec<MessageSummary>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: Option<String>,
    pub snippet: Option<String>,
    pub headers: Vec<MessageHeader>,
}

impl MessageMetadata {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// A mailbox the probe can list and inspect.
#[async_trait]
pub trait MessageProvider: Send {
    fn name(&self) -> &str;

    async fn list_recent(
        &mut self,
        query: &str,
        max_results: u32,
    ) -> Result<MessageList, ProbeError>;

    /// Fetches only the From, Subject and Date headers of one message.
    async fn get_message_metadata(&mut self, id: &str) -> Result<MessageMetadata, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::{MessageHeader, MessageMetadata};

    #[test]
    fn header_lookup_ignores_case() {
        let metadata = MessageMetadata {
            id: "m1".to_string(),
            thread_id: None,
            snippet: None,
            headers: vec![
                MessageHeader {
                    name: "from".to_string(),
                    value: "Alex <alex@example.com>".to_string(),
                },
                MessageHeader {
                    name: "Subject".to_string(),
                    value: "Hello".to_string(),
                },
            ],
        };
        assert_eq!(metadata.header("From"), Some("Alex <alex@example.com>"));
        assert_eq!(metadata.header("SUBJECT"), Some("Hello"));
        assert_eq!(metadata.header("Date"), None);
    }
}
