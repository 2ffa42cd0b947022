use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::{MessagePart, MessagePartHeader, ModifyMessageRequest};
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use tracing::{debug, info};

use crate::api::{LabelRecord, ListRequest, ListResponse, MailApi};
use crate::auth::GmailAuthenticator;
use crate::content;
use crate::error::{Error, Result};
use crate::models::{DetailLevel, Header, LabelInfo, MessageData, Part, Profile};

/// Only what a listing needs; bodies come from per-message fetches.
const LIST_FIELDS: &str = "messages,resultSizeEstimate,nextPageToken";

/// [`MailApi`] over the Gmail REST API.
#[derive(Clone)]
pub struct GmailApi {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    user: String,
}

impl GmailApi {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>, user: impl Into<String>) -> Self {
        Self {
            hub,
            user: user.into(),
        }
    }

    /// Build the HTTPS hub around an authenticator.
    pub fn connect(auth: GmailAuthenticator, user: impl Into<String>) -> Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| Error::Setup(format!("Failed to load native roots: {e}")))?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);
        Ok(Self::new(hub, user))
    }
}

#[async_trait]
impl MailApi for GmailApi {
    async fn list_messages(&self, request: &ListRequest) -> Result<ListResponse> {
        let mut req = self
            .hub
            .users()
            .messages_list(&self.user)
            .max_results(request.max_results)
            .param("fields", LIST_FIELDS);

        if !request.page_token.is_empty() {
            req = req.page_token(&request.page_token);
        }
        if let Some(query) = &request.query {
            req = req.q(query);
        }
        if let Some(label) = &request.label {
            req = req.add_label_ids(label);
        }

        let (_, list) = req
            .doit()
            .await
            .map_err(|e| Error::transport("listing messages", e))?;

        let next_page_token = list.next_page_token.unwrap_or_default();
        info!(next_page_token = %next_page_token, "listed messages");

        Ok(ListResponse {
            ids: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect(),
            result_size_estimate: list.result_size_estimate.unwrap_or_default() as u64,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str, level: DetailLevel) -> Result<MessageData> {
        let mut req = self.hub.users().messages_get(&self.user, id);
        if let Some(format) = level.as_format() {
            req = req.format(format);
        }
        let (_, msg) = req
            .doit()
            .await
            .map_err(|e| Error::transport(format!("Failed to get message {id}"), e))?;

        let headers = msg
            .payload
            .as_ref()
            .map(|p| convert_headers(p.headers.clone()))
            .unwrap_or_default();

        Ok(MessageData {
            thread_id: msg.thread_id.unwrap_or_default(),
            label_ids: msg.label_ids.unwrap_or_default(),
            snippet: msg.snippet.unwrap_or_default(),
            headers,
            payload: msg.payload.map(convert_part),
            internal_date: msg.internal_date.map(i64::from),
            size_estimate: msg.size_estimate.map(i64::from),
        })
    }

    async fn modify_message(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<Vec<String>> {
        debug!(id, ?add, ?remove, "modifying labels");
        let req = ModifyMessageRequest {
            add_label_ids: (!add.is_empty()).then(|| add.to_vec()),
            remove_label_ids: (!remove.is_empty()).then(|| remove.to_vec()),
        };
        let (_, msg) = self
            .hub
            .users()
            .messages_modify(req, &self.user, id)
            .doit()
            .await
            .map_err(|e| Error::transport(format!("Failed to modify message {id}"), e))?;
        Ok(msg.label_ids.unwrap_or_default())
    }

    async fn trash_message(&self, id: &str) -> Result<Vec<String>> {
        debug!(id, "trashing message");
        let (_, msg) = self
            .hub
            .users()
            .messages_trash(&self.user, id)
            .doit()
            .await
            .map_err(|e| Error::transport(format!("Failed to trash message {id}"), e))?;
        Ok(msg.label_ids.unwrap_or_default())
    }

    async fn send_message(&self, raw: &str) -> Result<()> {
        let bytes = content::decode_bytes(raw)?;
        debug!(len = bytes.len(), "sending message");
        let mime_type = "message/rfc822"
            .parse()
            .map_err(|e| Error::transport("Failed to send message", e))?;
        self.hub
            .users()
            .messages_send(google_gmail1::api::Message::default(), &self.user)
            .upload(std::io::Cursor::new(bytes), mime_type)
            .await
            .map_err(|e| Error::transport("Failed to send message", e))?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelRecord>> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list(&self.user)
            .doit()
            .await
            .map_err(|e| Error::transport("Failed to list labels", e))?;

        Ok(label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(convert_label)
            .collect())
    }

    async fn get_label(&self, id: &str) -> Result<LabelRecord> {
        let (_, label) = self
            .hub
            .users()
            .labels_get(&self.user, id)
            .doit()
            .await
            .map_err(|e| Error::transport(format!("Failed to get label {id}"), e))?;
        Ok(convert_label(label))
    }

    async fn get_profile(&self) -> Result<Profile> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile(&self.user)
            .doit()
            .await
            .map_err(|e| Error::transport("Failed to get profile", e))?;
        Ok(Profile {
            email_address: profile.email_address.unwrap_or_default(),
            messages_total: profile.messages_total.map(i64::from).unwrap_or_default(),
            threads_total: profile.threads_total.map(i64::from).unwrap_or_default(),
            history_id: profile
                .history_id
                .map(|h| h.to_string())
                .unwrap_or_default(),
        })
    }
}

fn convert_label(l: google_gmail1::api::Label) -> LabelRecord {
    LabelRecord {
        id: l.id.unwrap_or_default(),
        info: LabelInfo {
            name: l.name.unwrap_or_default(),
            label_type: l.type_.unwrap_or_default(),
        },
    }
}

fn convert_headers(headers: Option<Vec<MessagePartHeader>>) -> Vec<Header> {
    headers
        .unwrap_or_default()
        .into_iter()
        .map(|h| Header {
            name: h.name.unwrap_or_default(),
            value: h.value.unwrap_or_default(),
        })
        .collect()
}

// The hub hands body data back already decoded. Re-encode it so the content
// pipeline sees the wire form and owns decoding.
fn convert_part(part: MessagePart) -> Part {
    Part {
        mime_type: part.mime_type.unwrap_or_default(),
        filename: part.filename.filter(|f| !f.is_empty()),
        headers: convert_headers(part.headers),
        data: part
            .body
            .and_then(|b| b.data)
            .map(|d| content::encode_body(&d)),
        parts: part
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(convert_part)
            .collect(),
    }
}
