//! Zotero Web API v3 acquirer.
//!
//! Fetches the complete item list for a library, 100 records per page, and
//! folds it into a [`Snapshot`]. Attachment items become attachment records;
//! notes and annotations are skipped; everything else becomes an item
//! record. Order within the snapshot follows the API's own item order.

use crate::CatalogAcquirer;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use zotcopy_catalog::{RawAttachment, RawItem, Snapshot, SnapshotSource};

const DEFAULT_BASE_URL: &str = "https://api.zotero.org";
/// Page size; 100 is the API's maximum.
const PAGE_SIZE: usize = 100;

/// The library a remote acquirer reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Library {
    /// A personal library, identified by user ID.
    User(String),
    /// A shared group library, identified by group ID.
    Group(String),
}

impl Library {
    fn segment(&self) -> &'static str {
        match self {
            Self::User(_) => "users",
            Self::Group(_) => "groups",
        }
    }

    fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }
}

/// One item as returned by the API. Only the `data` envelope matters to us.
#[derive(Debug, Deserialize)]
struct ApiItem {
    data: ApiItemData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiItemData {
    key: String,
    item_type: String,
    title: String,
    parent_item: Option<String>,
    filename: Option<String>,
    /// Absolute path, present for linked-file attachments only.
    path: Option<String>,
    md5: Option<String>,
    content_type: Option<String>,
    link_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyInfo {
    #[serde(rename = "userID")]
    user_id: u64,
}

/// Catalog acquirer backed by the Zotero Web API v3.
pub struct RemoteAcquirer {
    client: Client,
    api_key: String,
    library: Library,
    base_url: String,
}

impl RemoteAcquirer {
    /// Build an acquirer for the given library.
    pub fn new(api_key: impl Into<String>, library: Library) -> Result<Self> {
        Ok(Self {
            client: Self::build_client()?,
            api_key: api_key.into(),
            library,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Build an acquirer for the personal library belonging to the API key,
    /// discovering the user ID from the key itself via `/keys/{key}`.
    pub async fn discover(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let client = Self::build_client()?;
        let url = format!("{DEFAULT_BASE_URL}/keys/{api_key}");
        let response = client.get(&url).send().await.map_err(Self::map_transport_error)?;
        let response = Self::check_status(response)?;
        let info: ApiKeyInfo =
            response.json().await.or_raise(|| ErrorKind::Malformed("key info response".to_string()))?;
        debug!(user_id = info.user_id, "discovered library id from API key");
        Ok(Self {
            client,
            api_key,
            library: Library::User(info.user_id.to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the API base URL. Intended for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_client() -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert("Zotero-API-Version", HeaderValue::from_static("3"));
        Client::builder()
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::Unreachable("could not construct HTTP client".to_string()))
    }

    fn map_transport_error(err: reqwest::Error) -> ErrorKind {
        ErrorKind::Unreachable(err.to_string())
    }

    /// Translate HTTP status codes into the acquisition taxonomy. The API
    /// uses 403 for both bad keys and keys without library access.
    fn check_status(response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => exn::bail!(ErrorKind::Auth),
            status if !status.is_success() => {
                exn::bail!(ErrorKind::Unreachable(format!("unexpected HTTP status {status}")))
            },
            _ => Ok(response),
        }
    }

    async fn fetch_page(&self, start: usize) -> Result<Vec<ApiItem>> {
        let url = format!("{}/{}/{}/items", self.base_url, self.library.segment(), self.library.id());
        let limit = PAGE_SIZE.to_string();
        let start_param = start.to_string();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("format", "json"), ("limit", limit.as_str()), ("start", start_param.as_str())])
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        let response = Self::check_status(response)?;
        Ok(response.json().await.or_raise(|| ErrorKind::Malformed(format!("items page at offset {start}")))?)
    }
}

#[async_trait]
impl CatalogAcquirer for RemoteAcquirer {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::Remote
    }

    #[instrument(skip_all, fields(library = self.library.id()))]
    async fn acquire(&self) -> Result<Snapshot> {
        let mut items = Vec::new();
        let mut attachments = Vec::new();
        let mut start = 0;
        loop {
            let page = self.fetch_page(start).await?;
            let len = page.len();
            for item in page {
                fold_record(item.data, &mut items, &mut attachments);
            }
            if len < PAGE_SIZE {
                break;
            }
            start += len;
        }
        debug!(items = items.len(), attachments = attachments.len(), "acquired remote catalog");
        Ok(Snapshot::new(SnapshotSource::Remote, items, attachments))
    }
}

/// Sort one API record into the item or attachment list, or drop it.
///
/// Dropped records: notes and annotations (no files), URL-mode attachments
/// (nothing on disk to copy), and standalone attachments with no parent item
/// (the data model requires exactly one owner).
fn fold_record(data: ApiItemData, items: &mut Vec<RawItem>, attachments: &mut Vec<RawAttachment>) {
    match data.item_type.as_str() {
        "note" | "annotation" => {},
        "attachment" => {
            if matches!(data.link_mode.as_deref(), Some("linked_url") | Some("imported_url")) && data.filename.is_none()
            {
                return;
            }
            let Some(parent) = data.parent_item else {
                warn!(key = %data.key, "skipping standalone attachment with no parent item");
                return;
            };
            let path_hint = data.path.as_deref().map(PathBuf::from);
            let filename = match data.filename {
                Some(name) if !name.is_empty() => name,
                // Linked files carry no filename field; fall back to the
                // last component of the recorded path.
                _ => match path_hint.as_deref().and_then(Path::file_name) {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => {
                        warn!(key = %data.key, "skipping attachment with no usable filename");
                        return;
                    },
                },
            };
            attachments.push(RawAttachment {
                key: data.key,
                parent,
                filename,
                path_hint,
                recorded_md5: data.md5,
                content_type: data.content_type,
            });
        },
        _ => items.push(RawItem { key: data.key, title: data.title }),
    }
}
