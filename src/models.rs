use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};
use inflections::case::to_title_case;
use serde::{Deserialize, Serialize};

/// Label ID of the primary inbox. Used for default sort order.
pub const INBOX: &str = "INBOX";
pub const UNREAD: &str = "UNREAD";
pub const TRASH: &str = "TRASH";

/// How much of a message a fetch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Nothing but the ID. A stub.
    #[default]
    Empty,
    /// ID and labels.
    Minimal,
    /// ID, labels and headers.
    Metadata,
    /// ID, labels, headers and body.
    Full,
}

impl DetailLevel {
    /// Value of the remote `format` parameter, if any.
    pub fn as_format(self) -> Option<&'static str> {
        match self {
            DetailLevel::Empty => None,
            DetailLevel::Minimal => Some("minimal"),
            DetailLevel::Metadata => Some("metadata"),
            DetailLevel::Full => Some("full"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One node of a message's MIME tree. `data` is still in its transport encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub mime_type: String,
    pub filename: Option<String>,
    pub headers: Vec<Header>,
    pub data: Option<String>,
    pub parts: Vec<Part>,
}

/// Everything the remote store told us about a message, at some detail level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageData {
    pub thread_id: String,
    pub label_ids: Vec<String>,
    pub snippet: String,
    pub headers: Vec<Header>,
    pub payload: Option<Part>,
    pub internal_date: Option<i64>,
    pub size_estimate: Option<i64>,
}

#[derive(Debug, Default)]
struct MessageState {
    level: DetailLevel,
    data: MessageData,
}

/// A cached message. One instance per ID for the life of the process.
///
/// Only the label set and the detail level change after creation, and only
/// through [`Message::hydrate`] and [`Message::set_labels`].
#[derive(Debug)]
pub struct Message {
    id: String,
    state: RwLock<MessageState>,
}

impl Message {
    /// A message nothing has been fetched for yet.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(MessageState::default()),
        }
    }

    pub fn with_data(id: impl Into<String>, level: DetailLevel, data: MessageData) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(MessageState { level, data }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MessageState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MessageState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn level(&self) -> DetailLevel {
        self.read().level
    }

    /// Replace the fetched data, unless a richer fetch already landed.
    ///
    /// Returns false if the update was dropped.
    pub fn hydrate(&self, level: DetailLevel, data: MessageData) -> bool {
        let mut state = self.write();
        if level < state.level {
            return false;
        }
        state.level = level;
        state.data = data;
        true
    }

    /// Copy of the current data.
    pub fn data(&self) -> MessageData {
        self.read().data.clone()
    }

    pub fn thread_id(&self) -> String {
        self.read().data.thread_id.clone()
    }

    pub fn snippet(&self) -> String {
        self.read().data.snippet.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.read().data.label_ids.clone()
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.read().data.label_ids.iter().any(|l| l == label_id)
    }

    /// Install the label set a confirmed remote write returned.
    pub fn set_labels(&self, label_ids: Vec<String>) {
        self.write().data.label_ids = label_ids;
    }

    /// First header with this name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.read()
            .data
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    }

    pub fn subject(&self) -> String {
        self.header("Subject").unwrap_or_default()
    }

    pub fn sender(&self) -> String {
        self.header("From").unwrap_or_default()
    }

    pub fn received_at(&self) -> Option<DateTime<Local>> {
        let millis = self.read().data.internal_date?;
        DateTime::from_timestamp_millis(millis).map(|d| d.with_timezone(&Local))
    }

    pub fn payload(&self) -> Option<Part> {
        self.read().data.payload.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub name: String,
    /// "system" or "user"
    pub label_type: String,
}

/// A cached label.
#[derive(Debug)]
pub struct Label {
    id: String,
    info: RwLock<LabelInfo>,
}

impl Label {
    pub fn new(id: impl Into<String>, info: LabelInfo) -> Self {
        Self {
            id: id.into(),
            info: RwLock::new(info),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_inbox(&self) -> bool {
        self.id == INBOX
    }

    pub fn info(&self) -> LabelInfo {
        self.info.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn name(&self) -> String {
        self.info().name
    }

    /// Name for display. System labels come back upper-cased ("INBOX").
    pub fn display_name(&self) -> String {
        let info = self.info();
        if info.label_type == "system" {
            to_title_case(&info.name.to_lowercase())
        } else {
            info.name
        }
    }

    pub fn update(&self, info: LabelInfo) {
        *self.info.write().unwrap_or_else(|e| e.into_inner()) = info;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub email_address: String,
    pub messages_total: i64,
    pub threads_total: i64,
    pub history_id: String,
}
