use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use super::auth::{JwtTokenSource, ServiceAccount, TokenCache, TokenSource};
use super::{DocumentStore, StoreError, decode, encode};
use crate::document::Document;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const MULTIPART_BOUNDARY: &str = "tabsheet-upload-boundary";
const JSON_MIME: &str = "application/json";

/// The handful of Drive file calls the remote store needs.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Id of the first file with this exact name, if any.
    async fn find_file(&self, token: &str, name: &str) -> Result<Option<String>, StoreError>;

    /// Create a file under `parent` with the given content and return its id.
    async fn create_file(
        &self,
        token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<String, StoreError>;

    async fn download(&self, token: &str, file_id: &str) -> Result<String, StoreError>;

    async fn upload(&self, token: &str, file_id: &str, content: &str) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Deserialize)]
struct FileRef {
    id: String,
}

/// [`DriveApi`] over the Drive v3 REST endpoints.
#[derive(Clone)]
pub struct HttpDriveApi {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl HttpDriveApi {
    pub fn new(http: reqwest::Client) -> Self {
        HttpDriveApi {
            http,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }

    /// Point the client at another host, e.g. a local emulator.
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }
}

async fn check_status(
    response: reqwest::Response,
    file_id: Option<&str>,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        if let Some(file_id) = file_id {
            return Err(StoreError::FileNotFound {
                file_id: file_id.to_string(),
            });
        }
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn name_query(name: &str) -> String {
    format!("name = '{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn find_file(&self, token: &str, name: &str) -> Result<Option<String>, StoreError> {
        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("q", name_query(name).as_str()), ("fields", "files(id, name)")])
            .send()
            .await?;
        let list: FileList = check_status(response, None).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_file(
        &self,
        token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<String, StoreError> {
        let metadata = json!({
            "name": name,
            "mimeType": JSON_MIME,
            "parents": [parent],
        });
        let body = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{b}\r\nContent-Type: {JSON_MIME}\r\n\r\n{content}\r\n--{b}--",
            b = MULTIPART_BOUNDARY,
        );
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id, parents")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let created: FileRef = check_status(response, None).await?.json().await?;
        Ok(created.id)
    }

    async fn download(&self, token: &str, file_id: &str) -> Result<String, StoreError> {
        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        Ok(check_status(response, Some(file_id)).await?.text().await?)
    }

    async fn upload(&self, token: &str, file_id: &str, content: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(token)
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, JSON_MIME)
            .body(content.to_string())
            .send()
            .await?;
        check_status(response, Some(file_id)).await?;
        Ok(())
    }
}

/// Where the remote document lives and how long a remote call may take.
#[derive(Debug, Clone)]
pub struct DriveSettings {
    pub file_name: String,
    pub parent_folder: String,
    pub timeout: Duration,
}

/// Document stored as a single JSON file in Drive.
///
/// The file is looked up by name on first use and created (as `{}`) when
/// missing. Its id is then cached for the life of the store; if the file is
/// deleted remotely, later calls fail with [`StoreError::FileNotFound`].
pub struct DriveStore<A, S> {
    api: A,
    tokens: TokenCache<S>,
    settings: DriveSettings,
    file_id: Mutex<Option<String>>,
}

impl DriveStore<HttpDriveApi, JwtTokenSource> {
    /// Store talking to the real Drive and token endpoints.
    pub fn connect(account: ServiceAccount, settings: DriveSettings) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(DriveStore::new(
            HttpDriveApi::new(http.clone()),
            JwtTokenSource::new(account, http),
            settings,
        ))
    }
}

impl<A: DriveApi, S: TokenSource> DriveStore<A, S> {
    pub fn new(api: A, source: S, settings: DriveSettings) -> Self {
        DriveStore {
            api,
            tokens: TokenCache::new(source),
            settings,
            file_id: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn tokens(&self) -> &TokenCache<S> {
        &self.tokens
    }

    pub async fn cached_file_id(&self) -> Option<String> {
        self.file_id.lock().await.clone()
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.settings.timeout,
            }),
        }
    }

    async fn resolve_file_id(&self, token: &str) -> Result<String, StoreError> {
        let mut cached = self.file_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let name = &self.settings.file_name;
        let id = match self.api.find_file(token, name).await? {
            Some(id) => {
                log::info!("Found remote file {name} ({id})");
                id
            }
            None => {
                log::info!("No remote file named {name}, creating one");
                let id = self
                    .api
                    .create_file(token, name, &self.settings.parent_folder, "{}")
                    .await?;
                log::info!("Created remote file {name} ({id})");
                id
            }
        };
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn authorize(&self) -> Result<(String, String), StoreError> {
        let token = self.timed("authentication", self.tokens.token()).await?;
        let file_id = self
            .timed("file lookup", self.resolve_file_id(&token))
            .await?;
        Ok((token, file_id))
    }
}

#[async_trait]
impl<A: DriveApi, S: TokenSource> DocumentStore for DriveStore<A, S> {
    async fn load(&self) -> Result<Document, StoreError> {
        let (token, file_id) = self.authorize().await?;
        let content = self
            .timed("download", self.api.download(&token, &file_id))
            .await?;
        decode(&content)
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let content = encode(document)?;
        let (token, file_id) = self.authorize().await?;
        self.timed("upload", self.api.upload(&token, &file_id, &content))
            .await?;
        log::debug!("Uploaded document to remote file {file_id}");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("drive file {}", self.settings.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_query_escapes_quotes() {
        assert_eq!(name_query("app.json"), "name = 'app.json'");
        assert_eq!(name_query("bob's.json"), "name = 'bob\\'s.json'");
    }
}
