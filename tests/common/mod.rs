#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tabsheet::store::drive::DriveSettings;
use tabsheet::store::{AccessToken, DriveApi, TokenSource};
use tabsheet::{Document, DocumentStore, StoreError};

/// In-memory store that counts saves and can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    content: Mutex<Option<String>>,
    pub saves: AtomicUsize,
    pub fail_loads: AtomicBool,
    pub fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn with_content(content: &str) -> Self {
        let store = MemoryStore::default();
        *store.content.lock().unwrap() = Some(content.to_string());
        store
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

fn unavailable() -> StoreError {
    StoreError::Remote {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self) -> Result<Document, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        match self.content() {
            Some(content) => {
                serde_json::from_str(&content).map_err(|source| StoreError::Malformed { source })
            }
            None => Ok(Document::new()),
        }
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let content = serde_json::to_string_pretty(document).unwrap();
        *self.content.lock().unwrap() = Some(content);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Token source handing out one-hour tokens.
#[derive(Default)]
pub struct StaticTokens {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenSource for StaticTokens {
    async fn fetch_token(&self) -> Result<AccessToken, StoreError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            token: format!("token-{n}"),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }
}

#[derive(Clone, Debug)]
pub struct FakeFile {
    pub name: String,
    pub parent: Option<String>,
    pub content: String,
}

/// Drive double keeping files in a map.
#[derive(Default)]
pub struct FakeDrive {
    files: Mutex<HashMap<String, FakeFile>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub uploads: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeDrive {
    pub fn with_file(id: &str, name: &str, content: &str) -> Self {
        let drive = FakeDrive::default();
        drive.files.lock().unwrap().insert(
            id.to_string(),
            FakeFile {
                name: name.to_string(),
                parent: None,
                content: content.to_string(),
            },
        );
        drive
    }

    pub fn file(&self, id: &str) -> Option<FakeFile> {
        self.files.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.files.lock().unwrap().remove(id);
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn find_file(&self, token: &str, name: &str) -> Result<Option<String>, StoreError> {
        assert!(token.starts_with("token-"));
        self.pause().await;
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_file(
        &self,
        _token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<String, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.files.lock().unwrap().insert(
            id.clone(),
            FakeFile {
                name: name.to_string(),
                parent: Some(parent.to_string()),
                content: content.to_string(),
            },
        );
        Ok(id)
    }

    async fn download(&self, _token: &str, file_id: &str) -> Result<String, StoreError> {
        self.pause().await;
        self.file(file_id)
            .map(|f| f.content)
            .ok_or_else(|| StoreError::FileNotFound {
                file_id: file_id.to_string(),
            })
    }

    async fn upload(&self, _token: &str, file_id: &str, content: &str) -> Result<(), StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        match files.get_mut(file_id) {
            Some(file) => {
                file.content = content.to_string();
                Ok(())
            }
            None => Err(StoreError::FileNotFound {
                file_id: file_id.to_string(),
            }),
        }
    }
}

pub fn drive_settings() -> DriveSettings {
    DriveSettings {
        file_name: "app.json".to_string(),
        parent_folder: "folder-1".to_string(),
        timeout: Duration::from_secs(5),
    }
}

pub fn document(value: serde_json::Value) -> Document {
    serde_json::from_value(value).unwrap()
}

/// Equal content in the same tab, column and row-key order.
pub fn assert_same_layout(left: &Document, right: &Document) {
    assert_eq!(left, right);
    assert_eq!(
        left.tab_names().collect::<Vec<_>>(),
        right.tab_names().collect::<Vec<_>>()
    );
    for name in left.tab_names() {
        let (l, r) = (left.tab(name).unwrap(), right.tab(name).unwrap());
        assert_eq!(l.columns(), r.columns(), "columns of {name}");
        for (lr, rr) in l.rows().iter().zip(r.rows()) {
            assert!(lr.keys().eq(rr.keys()), "row key order in {name}");
        }
    }
}
