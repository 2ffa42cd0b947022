use std::sync::Arc;

use crate::models::Message;

/// One slice of a listing.
///
/// The label filter and query that produced a page never change; fetching the
/// next slice or refreshing re-issues them with a different token.
#[derive(Debug, Clone)]
pub struct Page {
    pub(crate) label: Option<String>,
    pub(crate) query: Option<String>,
    pub(crate) page_token: String,
    pub(crate) messages: Vec<Arc<Message>>,
    pub(crate) result_size_estimate: u64,
    pub(crate) next_page_token: String,
}

impl Page {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Token this page was fetched with. Empty for the first page.
    pub fn page_token(&self) -> &str {
        &self.page_token
    }

    /// Messages in listing order. Entries may be stubs that haven't been fetched.
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Approximate total across all pages of this query.
    pub fn result_size_estimate(&self) -> u64 {
        self.result_size_estimate
    }

    pub fn next_page_token(&self) -> &str {
        &self.next_page_token
    }

    pub fn has_next(&self) -> bool {
        !self.next_page_token.is_empty()
    }
}
