use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DetailLevel, LabelInfo, MessageData, Profile};

/// One listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub label: Option<String>,
    pub query: Option<String>,
    /// Empty starts from the beginning.
    pub page_token: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResponse {
    pub ids: Vec<String>,
    pub result_size_estimate: u64,
    /// Empty when there are no more pages.
    pub next_page_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub id: String,
    pub info: LabelInfo,
}

/// The remote mail store, as the connection sees it.
///
/// Implementations carry their own deadlines; nothing above this layer
/// cancels a call.
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_messages(&self, request: &ListRequest) -> Result<ListResponse>;

    async fn get_message(&self, id: &str, level: DetailLevel) -> Result<MessageData>;

    /// Returns the message's label set after the change.
    async fn modify_message(&self, id: &str, add: &[String], remove: &[String])
    -> Result<Vec<String>>;

    /// Returns the message's label set after trashing.
    async fn trash_message(&self, id: &str) -> Result<Vec<String>>;

    /// `raw` is an RFC 2822 message in the transport-safe encoding.
    async fn send_message(&self, raw: &str) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<LabelRecord>>;

    async fn get_label(&self, id: &str) -> Result<LabelRecord>;

    async fn get_profile(&self) -> Result<Profile>;
}
