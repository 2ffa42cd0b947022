use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::info;

use crate::config::Config;
use crate::connection::Connection;
use crate::content::Content;
use crate::error::Result;
use crate::models::{DetailLevel, INBOX, Message};
use crate::page::Page;
use crate::parallel::{Apply, BatchReport, FanOut};
use crate::verify::{Verification, Verifier};

/// A remote mutation applied to one message ID, yielding its new label set.
type LabelOp = dyn Fn(Arc<Connection>, String) -> BoxFuture<'static, Result<Vec<String>>> + Send + Sync;

/// Per-user mail state: the page being looked at, the selection and the mark set.
pub struct Session {
    conn: Arc<Connection>,
    verifier: Verifier,
    list_level: DetailLevel,
    allow_key_download: bool,
    page: Option<Page>,
    current: usize,
    marked: HashSet<String>,
}

impl Session {
    pub fn new(conn: Arc<Connection>, verifier: Verifier, config: &Config) -> Self {
        Self {
            conn,
            verifier,
            list_level: config.fetch.list_level,
            allow_key_download: config.verify.allow_key_download,
            page: None,
            current: 0,
            marked: HashSet::new(),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        self.page.as_ref().map(|p| p.messages()).unwrap_or_default()
    }

    /// List the first page of a query and fetch its messages at the list level.
    ///
    /// Starts a fresh selection and clears marks.
    pub async fn open_list(&mut self, label: Option<&str>, query: Option<&str>) -> Result<BatchReport> {
        let page = self.conn.list_messages(label, query, "").await?;
        self.current = 0;
        self.marked.clear();
        self.show(page).await
    }

    /// Move to the next page. Returns `None` when there is none.
    pub async fn next_page(&mut self) -> Result<Option<BatchReport>> {
        let Some(page) = &self.page else {
            return Ok(None);
        };
        match self.conn.next_page(page).await? {
            Some(next) => {
                self.current = 0;
                Ok(Some(self.show(next).await?))
            }
            None => Ok(None),
        }
    }

    /// Re-run the current query from the top, keeping selection and marks.
    pub async fn reload(&mut self) -> Result<BatchReport> {
        let Some(page) = &self.page else {
            return Ok(BatchReport::default());
        };
        let fresh = self.conn.refresh(page).await?;
        self.show(fresh).await
    }

    async fn show(&mut self, page: Page) -> Result<BatchReport> {
        let report = self.conn.hydrate(page.messages(), self.list_level).await;
        info!(
            count = page.len(),
            estimate = page.result_size_estimate(),
            "showing page"
        );
        self.page = Some(page);
        self.fix_current();
        Ok(report)
    }

    fn fix_current(&mut self) {
        let len = self.messages().len();
        if self.current >= len {
            self.current = len.saturating_sub(1);
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&Arc<Message>> {
        self.messages().get(self.current)
    }

    pub fn select(&mut self, index: usize) {
        self.current = index;
        self.fix_current();
    }

    pub fn select_next(&mut self) {
        if self.current + 1 < self.messages().len() {
            self.current += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// Toggle the mark on the current message and move down. Returns the new mark state.
    pub fn toggle_mark(&mut self) -> bool {
        let Some(id) = self.current().map(|m| m.id().to_string()) else {
            return false;
        };
        let marked = if self.marked.remove(&id) {
            false
        } else {
            self.marked.insert(id);
            true
        };
        self.select_next();
        marked
    }

    pub fn mark(&mut self, id: impl Into<String>) {
        self.marked.insert(id.into());
    }

    pub fn is_marked(&self, id: &str) -> bool {
        self.marked.contains(id)
    }

    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    /// Fetch the current message in full, mark it read in the background and
    /// return its body.
    pub async fn open_current(&mut self) -> Result<Option<(Arc<Message>, Content)>> {
        let Some(msg) = self.current().cloned() else {
            return Ok(None);
        };
        let msg = self.conn.fetch_message(msg.id(), DetailLevel::Full).await?;
        // Detached on purpose; the handle is dropped.
        let _ = self.conn.mark_read_detached(&msg);
        let body = self.conn.body(&msg).await?;
        Ok(Some((msg, body)))
    }

    /// Check the signature of a message's body.
    ///
    /// The verifier gets the signed bytes as sent, whatever their charset.
    pub async fn verify(&self, msg: &Message) -> Result<Verification> {
        let body = self.conn.body_bytes(msg).await?.unwrap_or_default();
        Ok(self.verifier.verify(&body, self.allow_key_download).await)
    }

    pub async fn archive_marked(&mut self) -> BatchReport {
        self.apply_marked("archiving", &|conn, id| {
            async move { conn.modify(&id, &[], &[INBOX.to_string()]).await }.boxed()
        })
        .await
    }

    pub async fn trash_marked(&mut self) -> BatchReport {
        self.apply_marked("trashing", &|conn, id| {
            async move { conn.trash_remote(&id).await }.boxed()
        })
        .await
    }

    pub async fn label_marked(&mut self, label_id: &str, add: bool) -> BatchReport {
        let label = label_id.to_string();
        let verb = if add { "labeling" } else { "unlabeling" };
        self.apply_marked(verb, &move |conn, id| {
            let label = vec![label.clone()];
            async move {
                if add {
                    conn.modify(&id, &label, &[]).await
                } else {
                    conn.modify(&id, &[], &label).await
                }
            }
            .boxed()
        })
        .await
    }

    /// Run `op` on every marked message concurrently.
    ///
    /// Label sets and the mark set are only touched while applying results,
    /// one message at a time. Messages that fail stay marked.
    async fn apply_marked(&mut self, verb: &'static str, op: &LabelOp) -> BatchReport {
        let mut targets: Vec<Arc<Message>> = self
            .messages()
            .iter()
            .filter(|m| self.marked.contains(m.id()))
            .cloned()
            .collect();
        let mut off_page: Vec<&String> = self
            .marked
            .iter()
            .filter(|id| !targets.iter().any(|m| m.id() == id.as_str()))
            .collect();
        off_page.sort();
        targets.extend(off_page.into_iter().map(|id| self.conn.message(id)));

        let mut fan = FanOut::<BatchReport>::new();
        for msg in targets {
            let call = op(self.conn.clone(), msg.id().to_string());
            fan.add(async move {
                let apply: Apply<BatchReport> = match call.await {
                    Ok(labels) => Box::new(move |report: &mut BatchReport| {
                        msg.set_labels(labels);
                        report.record_ok(msg.id());
                    }),
                    Err(e) => Box::new(move |report: &mut BatchReport| {
                        report.record_failure(format!("Error {} {:?}: {}", verb, msg.id(), e));
                    }),
                };
                apply
            });
        }

        let mut report = BatchReport::default();
        fan.run(&mut report).await;
        for id in &report.succeeded {
            self.marked.remove(id);
        }
        info!(verb, ok = report.ok, failed = report.failed, "batch done");
        report
    }
}
