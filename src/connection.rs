use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ListRequest, MailApi};
use crate::auth::Authenticator;
use crate::cache::EntityCache;
use crate::config::{Config, FetchConfig};
use crate::content::{self, Content};
use crate::error::{Error, Result};
use crate::gmail::GmailApi;
use crate::models::{DetailLevel, INBOX, Label, Message, Profile, UNREAD};
use crate::page::Page;
use crate::parallel::{Apply, BatchReport, FanOut};

/// Owns the authenticated transport and the message and label caches.
///
/// Everything handed out (pages, messages, labels) is an `Arc` into the
/// caches, which live as long as the connection.
pub struct Connection {
    api: Arc<dyn MailApi>,
    messages: EntityCache<Message>,
    labels: EntityCache<Label>,
    page_size: u32,
}

impl Connection {
    pub fn new(api: Arc<dyn MailApi>, config: &FetchConfig) -> Self {
        Self {
            api,
            messages: EntityCache::new(),
            labels: EntityCache::new(),
            page_size: config.page_size,
        }
    }

    /// Authenticate, build the transport and load labels. Any failure here is fatal.
    pub async fn connect(config: &Config) -> Result<Self> {
        let secret = Authenticator::load_secret(&config.auth.credentials)
            .await
            .map_err(|e| Error::Setup(format!("{e:#}")))?;
        let auth = Authenticator::authenticate(secret)
            .await
            .map_err(|e| Error::Setup(format!("{e:#}")))?;
        let api = GmailApi::connect(auth, config.fetch.user.clone())?;

        let conn = Self::new(Arc::new(api), &config.fetch);
        conn.load_labels()
            .await
            .map_err(|e| Error::Setup(format!("cannot load labels: {e}")))?;
        Ok(conn)
    }

    pub fn api(&self) -> Arc<dyn MailApi> {
        self.api.clone()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Bulk-load every label. Already cached labels are updated in place.
    pub async fn load_labels(&self) -> Result<usize> {
        let records = self.api.list_labels().await?;
        let count = records.len();
        for record in records {
            let info = record.info.clone();
            let label = self
                .labels
                .get_or_insert(&record.id, || Label::new(record.id.clone(), record.info));
            label.update(info);
        }
        info!(count, "loaded labels");
        Ok(count)
    }

    /// Re-fetch one label.
    pub async fn refresh_label(&self, id: &str) -> Result<Arc<Label>> {
        let record = self.api.get_label(id).await?;
        let info = record.info.clone();
        let label = self
            .labels
            .get_or_insert(&record.id, || Label::new(record.id.clone(), record.info));
        label.update(info);
        Ok(label)
    }

    pub fn label(&self, id: &str) -> Option<Arc<Label>> {
        self.labels.get(id)
    }

    /// Find a label by ID, remote name or display name.
    pub fn find_label(&self, needle: &str) -> Option<Arc<Label>> {
        self.label(needle).or_else(|| {
            self.labels.values().into_iter().find(|l| {
                l.name().eq_ignore_ascii_case(needle) || l.display_name().eq_ignore_ascii_case(needle)
            })
        })
    }

    /// All labels, inbox first, the rest by display name.
    pub fn labels(&self) -> Vec<Arc<Label>> {
        let mut labels = self.labels.values();
        labels.sort_by_cached_key(|l| (!l.is_inbox(), l.display_name()));
        labels
    }

    /// Display names of the labels `msg` has, sorted.
    pub fn labeled(&self, msg: &Message) -> Vec<String> {
        let mut names: Vec<String> = msg
            .labels()
            .iter()
            .map(|id| self.label(id).map(|l| l.display_name()).unwrap_or_else(|| id.clone()))
            .collect();
        names.sort();
        names
    }

    /// Display names of the known labels `msg` lacks, sorted.
    pub fn not_labeled(&self, msg: &Message) -> Vec<String> {
        let have = msg.labels();
        let mut names: Vec<String> = self
            .labels
            .values()
            .into_iter()
            .filter(|l| !have.iter().any(|id| id == l.id()))
            .map(|l| l.display_name())
            .collect();
        names.sort();
        names
    }

    /// The cached message for `id`, creating a stub if this is the first mention.
    pub fn message(&self, id: &str) -> Arc<Message> {
        self.messages.get_or_insert(id, || Message::stub(id))
    }

    pub fn cached_messages(&self) -> usize {
        self.messages.len()
    }

    /// Issue one listing call. An empty token starts at the beginning.
    pub async fn list_messages(
        &self,
        label: Option<&str>,
        query: Option<&str>,
        page_token: &str,
    ) -> Result<Page> {
        let label = label.filter(|l| !l.is_empty()).map(str::to_string);
        let query = query.filter(|q| !q.is_empty()).map(str::to_string);
        let request = ListRequest {
            label: label.clone(),
            query: query.clone(),
            page_token: page_token.to_string(),
            max_results: self.page_size,
        };
        let response = self.api.list_messages(&request).await?;
        debug!(
            count = response.ids.len(),
            estimate = response.result_size_estimate,
            next = %response.next_page_token,
            "listed page"
        );

        Ok(Page {
            label,
            query,
            page_token: page_token.to_string(),
            messages: response.ids.iter().map(|id| self.message(id)).collect(),
            result_size_estimate: response.result_size_estimate,
            next_page_token: response.next_page_token,
        })
    }

    /// The page after `page`, or `None` once the listing is exhausted.
    pub async fn next_page(&self, page: &Page) -> Result<Option<Page>> {
        if !page.has_next() {
            return Ok(None);
        }
        self.list_messages(page.label(), page.query(), page.next_page_token())
            .await
            .map(Some)
    }

    /// Re-run the query of `page` from the beginning.
    pub async fn refresh(&self, page: &Page) -> Result<Page> {
        self.list_messages(page.label(), page.query(), "").await
    }

    /// Make sure the message is fetched to at least `level`.
    pub async fn fetch_message(&self, id: &str, level: DetailLevel) -> Result<Arc<Message>> {
        let msg = self.message(id);
        if msg.level() < level {
            self.reload(&msg, level).await?;
        }
        Ok(msg)
    }

    /// Fetch `msg` at `level` regardless of what is cached.
    pub async fn reload(&self, msg: &Message, level: DetailLevel) -> Result<()> {
        if level == DetailLevel::Empty {
            return Ok(());
        }
        let data = self.api.get_message(msg.id(), level).await?;
        msg.hydrate(level, data);
        Ok(())
    }

    /// Upgrade many messages to `level` concurrently.
    ///
    /// Messages already at `level` or better are skipped. Failures are
    /// counted in the report; the rest are still applied.
    pub async fn hydrate(&self, messages: &[Arc<Message>], level: DetailLevel) -> BatchReport {
        let mut fan = FanOut::<BatchReport>::new();
        if level > DetailLevel::Empty {
            for msg in messages.iter().filter(|m| m.level() < level) {
                let api = self.api.clone();
                let msg = msg.clone();
                fan.add(async move {
                    let result = api.get_message(msg.id(), level).await;
                    let apply: Apply<BatchReport> = match result {
                        Ok(data) => Box::new(move |report: &mut BatchReport| {
                            msg.hydrate(level, data);
                            report.record_ok(msg.id());
                        }),
                        Err(e) => Box::new(move |report: &mut BatchReport| {
                            report.record_failure(format!("Error fetching {:?}: {}", msg.id(), e));
                        }),
                    };
                    apply
                });
            }
        }
        let mut report = BatchReport::default();
        fan.run(&mut report).await;
        if !report.all_ok() {
            warn!(failed = report.failed, last_error = ?report.last_error, "hydrate incomplete");
        }
        report
    }

    /// Displayable body, fetching the full message first if needed.
    pub async fn body(&self, msg: &Message) -> Result<Content> {
        if msg.level() < DetailLevel::Full {
            self.reload(msg, DetailLevel::Full).await?;
        }
        match msg.payload() {
            Some(payload) => content::get_body(&payload),
            None => Ok(Content::Unknown),
        }
    }

    /// Decoded bytes of the text part, untouched by any charset handling.
    /// `None` if the message has no text part.
    pub async fn body_bytes(&self, msg: &Message) -> Result<Option<Vec<u8>>> {
        if msg.level() < DetailLevel::Full {
            self.reload(msg, DetailLevel::Full).await?;
        }
        match msg.payload() {
            Some(payload) => content::body_bytes(&payload),
            None => Ok(None),
        }
    }

    /// Remote label change only. Returns the new label set without touching the cache.
    pub async fn modify(&self, id: &str, add: &[String], remove: &[String]) -> Result<Vec<String>> {
        self.api.modify_message(id, add, remove).await
    }

    /// Remote trash only. Returns the new label set without touching the cache.
    pub async fn trash_remote(&self, id: &str) -> Result<Vec<String>> {
        self.api.trash_message(id).await
    }

    pub async fn add_label(&self, msg: &Message, label_id: &str) -> Result<()> {
        let labels = self.modify(msg.id(), &[label_id.to_string()], &[]).await?;
        msg.set_labels(labels);
        Ok(())
    }

    pub async fn remove_label(&self, msg: &Message, label_id: &str) -> Result<()> {
        let labels = self.modify(msg.id(), &[], &[label_id.to_string()]).await?;
        msg.set_labels(labels);
        Ok(())
    }

    pub async fn archive(&self, msg: &Message) -> Result<()> {
        self.remove_label(msg, INBOX).await
    }

    pub async fn trash(&self, msg: &Message) -> Result<()> {
        let labels = self.trash_remote(msg.id()).await?;
        msg.set_labels(labels);
        Ok(())
    }

    /// Best-effort "mark as read" in the background.
    ///
    /// Returns `None` if the message is already read. The task is detached:
    /// its errors are logged and never reach the caller. The handle is only
    /// for callers that want to wait, and may be dropped.
    pub fn mark_read_detached(&self, msg: &Arc<Message>) -> Option<JoinHandle<()>> {
        if !msg.has_label(UNREAD) {
            return None;
        }
        let api = self.api.clone();
        let msg = msg.clone();
        Some(tokio::spawn(async move {
            match api.modify_message(msg.id(), &[], &[UNREAD.to_string()]).await {
                Ok(labels) => {
                    msg.set_labels(labels);
                    debug!(id = msg.id(), "marked as read");
                }
                Err(e) => warn!(id = msg.id(), error = %e, "mark as read failed"),
            }
        }))
    }

    /// Send an RFC 2822 message.
    pub async fn send(&self, message: &str) -> Result<()> {
        self.api
            .send_message(&content::encode_body(message.as_bytes()))
            .await
    }

    pub async fn profile(&self) -> Result<Profile> {
        self.api.get_profile().await
    }
}
