//! In-memory mail store standing in for the REST API.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use gmshell::api::{LabelRecord, ListRequest, ListResponse, MailApi};
use gmshell::content::encode_body;
use gmshell::models::{DetailLevel, Header, INBOX, LabelInfo, MessageData, Part, Profile, TRASH};
use gmshell::{Error, Result};

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    order: Vec<String>,
    messages: HashMap<String, MessageData>,
    labels: Vec<LabelRecord>,
    fail_modify: HashSet<String>,
    fail_get: HashSet<String>,
    get_delays: HashMap<String, Duration>,
    gets: Vec<(String, DetailLevel)>,
    lists: Vec<ListRequest>,
    modifies: Vec<String>,
    sent: Vec<String>,
}

impl FakeApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.add_label(INBOX, "INBOX", "system");
        api.add_label("UNREAD", "UNREAD", "system");
        api.add_label(TRASH, "TRASH", "system");
        api
    }

    pub fn add_label(&self, id: &str, name: &str, label_type: &str) {
        self.state.lock().unwrap().labels.push(LabelRecord {
            id: id.to_string(),
            info: LabelInfo {
                name: name.to_string(),
                label_type: label_type.to_string(),
            },
        });
    }

    pub fn rename_label(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(l) = state.labels.iter_mut().find(|l| l.id == id) {
            l.info.name = name.to_string();
        }
    }

    /// Add a single-part plain-text message, newest last.
    pub fn add_message(&self, id: &str, labels: &[&str], subject: &str, body: &str) {
        let data = MessageData {
            thread_id: format!("t-{id}"),
            label_ids: labels.iter().map(|s| s.to_string()).collect(),
            snippet: body.chars().take(40).collect(),
            headers: vec![
                Header {
                    name: "From".into(),
                    value: "Alice <alice@example.com>".into(),
                },
                Header {
                    name: "Subject".into(),
                    value: subject.to_string(),
                },
            ],
            payload: Some(Part {
                mime_type: "text/plain".into(),
                data: Some(encode_body(body.as_bytes())),
                ..Default::default()
            }),
            internal_date: Some(1_700_000_000_000),
            size_estimate: Some(body.len() as i64),
        };
        self.add_message_data(id, data);
    }

    pub fn add_message_data(&self, id: &str, data: MessageData) {
        let mut state = self.state.lock().unwrap();
        state.order.push(id.to_string());
        state.messages.insert(id.to_string(), data);
    }

    pub fn fail_modify(&self, id: &str) {
        self.state.lock().unwrap().fail_modify.insert(id.to_string());
    }

    pub fn fail_get(&self, id: &str) {
        self.state.lock().unwrap().fail_get.insert(id.to_string());
    }

    pub fn delay_get(&self, id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .get_delays
            .insert(id.to_string(), delay);
    }

    pub fn labels_of(&self, id: &str) -> Vec<String> {
        self.state.lock().unwrap().messages[id].label_ids.clone()
    }

    pub fn gets(&self) -> Vec<(String, DetailLevel)> {
        self.state.lock().unwrap().gets.clone()
    }

    pub fn lists(&self) -> Vec<ListRequest> {
        self.state.lock().unwrap().lists.clone()
    }

    pub fn modifies(&self) -> Vec<String> {
        self.state.lock().unwrap().modifies.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }
}

fn trimmed(data: &MessageData, level: DetailLevel) -> MessageData {
    let mut out = MessageData {
        thread_id: data.thread_id.clone(),
        label_ids: data.label_ids.clone(),
        ..Default::default()
    };
    if level >= DetailLevel::Metadata {
        out.headers = data.headers.clone();
        out.snippet = data.snippet.clone();
        out.internal_date = data.internal_date;
    }
    if level >= DetailLevel::Full {
        out.payload = data.payload.clone();
        out.size_estimate = data.size_estimate;
    }
    out
}

#[async_trait]
impl MailApi for FakeApi {
    async fn list_messages(&self, request: &ListRequest) -> Result<ListResponse> {
        let mut state = self.state.lock().unwrap();
        state.lists.push(request.clone());
        let matching: Vec<String> = state
            .order
            .iter()
            .rev()
            .filter(|id| {
                let data = &state.messages[*id];
                let label_ok = request
                    .label
                    .as_ref()
                    .map_or(true, |l| data.label_ids.contains(l));
                let query_ok = request.query.as_ref().map_or(true, |q| {
                    data.headers.iter().any(|h| h.value.contains(q.as_str()))
                        || data.snippet.contains(q.as_str())
                });
                label_ok && query_ok
            })
            .cloned()
            .collect();

        let start: usize = if request.page_token.is_empty() {
            0
        } else {
            request
                .page_token
                .parse()
                .map_err(|e| Error::transport("listing messages", anyhow::anyhow!("bad token: {e}")))?
        };
        let end = (start + request.max_results as usize).min(matching.len());
        let next_page_token = if end < matching.len() {
            end.to_string()
        } else {
            String::new()
        };
        Ok(ListResponse {
            ids: matching[start.min(end)..end].to_vec(),
            result_size_estimate: matching.len() as u64,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str, level: DetailLevel) -> Result<MessageData> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.gets.push((id.to_string(), level));
            state.get_delays.get(id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.fail_get.contains(id) {
            return Err(Error::transport(
                format!("Failed to get message {id}"),
                anyhow::anyhow!("503 Service Unavailable"),
            ));
        }
        state
            .messages
            .get(id)
            .map(|data| trimmed(data, level))
            .ok_or_else(|| {
                Error::transport(format!("Failed to get message {id}"), anyhow::anyhow!("404 Not Found"))
            })
    }

    async fn modify_message(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.modifies.push(id.to_string());
        if state.fail_modify.contains(id) {
            return Err(Error::transport(
                format!("Failed to modify message {id}"),
                anyhow::anyhow!("500 Backend Error"),
            ));
        }
        let data = state.messages.get_mut(id).ok_or_else(|| {
            Error::transport(format!("Failed to modify message {id}"), anyhow::anyhow!("404 Not Found"))
        })?;
        data.label_ids.retain(|l| !remove.contains(l));
        for l in add {
            if !data.label_ids.contains(l) {
                data.label_ids.push(l.clone());
            }
        }
        Ok(data.label_ids.clone())
    }

    async fn trash_message(&self, id: &str) -> Result<Vec<String>> {
        self.modify_message(id, &[TRASH.to_string()], &[INBOX.to_string()])
            .await
    }

    async fn send_message(&self, raw: &str) -> Result<()> {
        self.state.lock().unwrap().sent.push(raw.to_string());
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelRecord>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn get_label(&self, id: &str) -> Result<LabelRecord> {
        self.state
            .lock()
            .unwrap()
            .labels
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::transport(format!("Failed to get label {id}"), anyhow::anyhow!("404 Not Found")))
    }

    async fn get_profile(&self) -> Result<Profile> {
        let state = self.state.lock().unwrap();
        Ok(Profile {
            email_address: "me@example.com".into(),
            messages_total: state.messages.len() as i64,
            threads_total: state.messages.len() as i64,
            history_id: "4242".into(),
        })
    }
}
