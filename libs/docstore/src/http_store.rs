//! Blocking HTTP client for the document store.
//!
//! Only the calls the bootstrap and the session types need are implemented:
//!
//! | operation | request |
//! |---|---|
//! | list databases | `GET {url}/databases?pageSize=n` |
//! | ensure database | `GET {url}/admin/databases/{name}`, then `PUT` on 404 |
//! | load | `GET {url}/databases/{db}/docs/{id}` |
//! | save changes | `POST {url}/databases/{db}/bulk_docs` |
//!
//! Without a database the system database paths (`/docs`, `/bulk_docs`) are used.

use crate::conventions::DocumentType;
use crate::error::StoreError;
use crate::store::{DocumentSession, DocumentStore, StoreConfiguration, StoreFactory};
use base64::Engine as _;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-request timeout applied by [`HttpStoreFactory::default`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates [`HttpDocumentStore`] handles.
#[derive(Debug, Clone)]
pub struct HttpStoreFactory {
    timeout: Duration,
}

impl HttpStoreFactory {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpStoreFactory {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl StoreFactory for HttpStoreFactory {
    fn create(&self, config: StoreConfiguration) -> Arc<dyn DocumentStore> {
        Arc::new(HttpDocumentStore::new(config, self.timeout))
    }
}

/// Request plumbing shared by the store and its sessions.
#[derive(Clone)]
struct Transport {
    agent: ureq::Agent,
    config: Arc<StoreConfiguration>,
    authorization: Option<String>,
}

impl Transport {
    fn new(config: StoreConfiguration, timeout: Duration) -> Self {
        let authorization = config.credentials().map(|c| {
            let token = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", c.user, c.password));
            format!("Basic {token}")
        });
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            config: Arc::new(config),
            authorization,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<String, StoreError> {
        let base = self.config.url();
        let mut url = url::Url::parse(base)
            .map_err(|e| StoreError::InvalidOperation(format!("invalid store url '{base}': {e}")))?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                StoreError::InvalidOperation(format!("store url '{base}' cannot be a base"))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url.into())
    }

    /// Path under the database, or under the system database when there is none.
    fn database_endpoint(
        &self,
        database: Option<&str>,
        rest: &[&str],
    ) -> Result<String, StoreError> {
        let mut segments = Vec::with_capacity(rest.len() + 2);
        if let Some(db) = database {
            segments.extend(["databases", db]);
        }
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut req = self
            .agent
            .request(method, url)
            .set("Accept", "application/json");
        if !self.config.compression_enabled() {
            req = req.set("Accept-Encoding", "identity");
        }
        if let Some(auth) = &self.authorization {
            req = req.set("Authorization", auth);
        }
        req
    }
}

fn send(
    req: ureq::Request,
    body: Option<&serde_json::Value>,
) -> Result<ureq::Response, StoreError> {
    let url = req.url().to_owned();
    tracing::debug!(method = req.method(), url = %url, "document store request");
    let res = match body {
        Some(b) => req.send_json(b),
        None => req.call(),
    };
    res.map_err(|e| map_error(url, e))
}

fn map_error(url: String, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, _) => StoreError::Status { url, status },
        ureq::Error::Transport(t) => StoreError::Unreachable {
            url,
            reason: t.to_string(),
        },
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    url: &str,
    resp: ureq::Response,
) -> Result<T, StoreError> {
    resp.into_json::<T>().map_err(|e| StoreError::Decode {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Document store reached over HTTP.
pub struct HttpDocumentStore {
    transport: Transport,
    initialized: AtomicBool,
}

impl HttpDocumentStore {
    #[must_use]
    pub fn new(config: StoreConfiguration, timeout: Duration) -> Self {
        Self {
            transport: Transport::new(config, timeout),
            initialized: AtomicBool::new(false),
        }
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::InvalidOperation(
                "document store has not been initialized".to_owned(),
            ))
        }
    }
}

impl DocumentStore for HttpDocumentStore {
    fn configuration(&self) -> &StoreConfiguration {
        &self.transport.config
    }

    fn initialize(&self) -> Result<(), StoreError> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            tracing::debug!(store = %self.transport.config, "document store initialized");
        }
        Ok(())
    }

    fn list_databases(&self, page_size: usize) -> Result<Vec<String>, StoreError> {
        self.ensure_initialized()?;
        let url = self.transport.endpoint(&["databases"])?;
        let req = self
            .transport
            .request("GET", &url)
            .query("pageSize", &page_size.to_string());
        let resp = send(req, None)?;
        decode(&url, resp)
    }

    fn ensure_database_exists(&self, name: &str) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        let url = self.transport.endpoint(&["admin", "databases", name])?;

        match send(self.transport.request("GET", &url), None) {
            Ok(_) => {
                tracing::debug!(database = name, "database already exists");
                return Ok(());
            }
            Err(StoreError::Status { status: 404, .. }) => {}
            Err(e) => return Err(e),
        }

        let document = serde_json::json!({
            "Settings": { "Raven/DataDir": format!("~/Databases/{name}") },
        });
        send(self.transport.request("PUT", &url), Some(&document))?;
        tracing::info!(database = name, url = self.transport.config.url(), "created database");
        Ok(())
    }

    fn open_session(&self) -> Result<Box<dyn DocumentSession>, StoreError> {
        self.ensure_initialized()?;
        Ok(Box::new(HttpSession {
            transport: self.transport.clone(),
            requests: 0,
            pending: Vec::new(),
        }))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "Method")]
enum Command {
    #[serde(rename = "PUT")]
    Put {
        #[serde(rename = "Key")]
        key: String,
        #[serde(rename = "Document")]
        document: serde_json::Value,
        #[serde(rename = "Metadata")]
        metadata: serde_json::Value,
    },
    #[serde(rename = "DELETE")]
    Delete {
        #[serde(rename = "Key")]
        key: String,
    },
}

struct HttpSession {
    transport: Transport,
    requests: u32,
    pending: Vec<Command>,
}

impl HttpSession {
    fn track_request(&mut self) -> Result<(), StoreError> {
        let max = self.transport.config.max_requests_per_session();
        if self.requests >= max {
            return Err(StoreError::InvalidOperation(format!(
                "session exceeded the maximum of {max} requests"
            )));
        }
        self.requests += 1;
        Ok(())
    }
}

impl DocumentSession for HttpSession {
    fn database(&self) -> Option<&str> {
        self.transport.config.database()
    }

    fn load(&mut self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.track_request()?;
        let url = self
            .transport
            .database_endpoint(self.transport.config.database(), &["docs", id])?;
        match send(self.transport.request("GET", &url), None) {
            Ok(resp) => decode(&url, resp).map(Some),
            Err(StoreError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store(&mut self, id: &str, ty: &DocumentType<'_>, body: serde_json::Value) {
        let metadata = match self.transport.config.tag_for(ty) {
            Some(tag) => serde_json::json!({ "Raven-Entity-Name": tag }),
            None => serde_json::json!({}),
        };
        self.pending.push(Command::Put {
            key: id.to_owned(),
            document: body,
            metadata,
        });
    }

    fn delete(&mut self, id: &str) {
        self.pending.push(Command::Delete { key: id.to_owned() });
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn save_changes(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.track_request()?;
        let url = self
            .transport
            .database_endpoint(self.transport.config.database(), &["bulk_docs"])?;
        let batch = serde_json::to_value(&self.pending).map_err(|e| StoreError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        send(self.transport.request("POST", &url), Some(&batch))?;
        tracing::debug!(commands = self.pending.len(), url = %url, "saved session changes");
        self.pending.clear();
        Ok(())
    }

    fn request_count(&self) -> u32 {
        self.requests
    }
}
