#![cfg(feature = "web")]

mod common;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use common::{StaticTokens, drive_settings};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tabsheet::store::{DriveApi, HttpDriveApi};
use tabsheet::{DocumentStore, DriveStore, StoreError};
use tokio::net::TcpListener;

/// One request as the Drive server saw it.
#[derive(Clone, Debug)]
struct Seen {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    content_type: Option<String>,
    authorization: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Seen>>>;

const STORED: &str = r#"{"tasks":[{"id":1,"name":"Write"}]}"#;

async fn drive_server(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let path = uri.path().to_string();
    log.lock().unwrap().push(Seen {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        content_type: header_value(header::CONTENT_TYPE),
        authorization: header_value(header::AUTHORIZATION),
        body,
    });

    let q = query.get("q").map(String::as_str).unwrap_or_default();
    match (method.as_str(), path.as_str()) {
        ("GET", "/files") if q.contains("broken.json") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "backend down").into_response()
        }
        ("GET", "/files") if q.contains("app.json") => {
            Json(json!({"files": [{"id": "file-1", "name": "app.json"}]})).into_response()
        }
        ("GET", "/files") => Json(json!({"files": []})).into_response(),
        ("POST", "/upload/files") => {
            Json(json!({"id": "file-2", "parents": ["folder-1"]})).into_response()
        }
        (_, p) if p.ends_with("/gone") => (StatusCode::NOT_FOUND, "File not found").into_response(),
        ("GET", "/files/file-1") => STORED.into_response(),
        ("PATCH", "/upload/files/file-1") => StatusCode::OK.into_response(),
        _ => (StatusCode::BAD_REQUEST, "unexpected request").into_response(),
    }
}

async fn start() -> (HttpDriveApi, Log) {
    let log = Log::default();
    let app = Router::new()
        .fallback(drive_server)
        .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let api = HttpDriveApi::new(reqwest::Client::new()).with_base_urls(
        &format!("http://{addr}/"),
        &format!("http://{addr}/upload"),
    );
    (api, log)
}

fn last(log: &Log) -> Seen {
    log.lock().unwrap().last().cloned().unwrap()
}

#[tokio::test]
async fn find_file_queries_by_exact_name() {
    let (api, log) = start().await;

    assert_eq!(
        api.find_file("tok", "app.json").await.unwrap().as_deref(),
        Some("file-1")
    );
    let seen = last(&log);
    assert_eq!(seen.method, Method::GET);
    assert_eq!(seen.path, "/files");
    assert_eq!(seen.query["q"], "name = 'app.json'");
    assert_eq!(seen.query["fields"], "files(id, name)");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer tok"));

    assert_eq!(api.find_file("tok", "other.json").await.unwrap(), None);
}

#[tokio::test]
async fn create_file_sends_multipart_related_body() {
    let (api, log) = start().await;

    let id = api
        .create_file("tok", "app.json", "folder-1", "{}")
        .await
        .unwrap();
    assert_eq!(id, "file-2");

    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/upload/files");
    assert_eq!(seen.query["uploadType"], "multipart");

    let content_type = seen.content_type.unwrap();
    let boundary = content_type
        .strip_prefix("multipart/related; boundary=")
        .unwrap();
    let parts: Vec<&str> = seen.body.split(&format!("--{boundary}")).collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[3], "--");

    let (meta_headers, metadata) = parts[1].split_once("\r\n\r\n").unwrap();
    assert!(meta_headers.contains("application/json"));
    let metadata: serde_json::Value = serde_json::from_str(metadata.trim()).unwrap();
    assert_eq!(
        metadata,
        json!({"name": "app.json", "mimeType": "application/json", "parents": ["folder-1"]})
    );
    let (_, content) = parts[2].split_once("\r\n\r\n").unwrap();
    assert_eq!(content, "{}\r\n");
}

#[tokio::test]
async fn download_and_upload_use_media_endpoints() {
    let (api, log) = start().await;

    assert_eq!(api.download("tok", "file-1").await.unwrap(), STORED);
    let seen = last(&log);
    assert_eq!((seen.method, seen.path.as_str()), (Method::GET, "/files/file-1"));
    assert_eq!(seen.query["alt"], "media");

    api.upload("tok", "file-1", "{\"a\": []}").await.unwrap();
    let seen = last(&log);
    assert_eq!(
        (seen.method, seen.path.as_str()),
        (Method::PATCH, "/upload/files/file-1")
    );
    assert_eq!(seen.query["uploadType"], "media");
    assert_eq!(seen.content_type.as_deref(), Some("application/json"));
    assert_eq!(seen.body, "{\"a\": []}");
}

#[tokio::test]
async fn missing_file_maps_to_file_not_found() {
    let (api, _) = start().await;

    assert!(matches!(
        api.download("tok", "gone").await,
        Err(StoreError::FileNotFound { file_id }) if file_id == "gone"
    ));
    assert!(matches!(
        api.upload("tok", "gone", "{}").await,
        Err(StoreError::FileNotFound { file_id }) if file_id == "gone"
    ));
}

#[tokio::test]
async fn other_failures_keep_status_and_body() {
    let (api, _) = start().await;

    match api.find_file("tok", "broken.json").await {
        Err(StoreError::Remote { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "backend down");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn drive_store_over_http() {
    let (api, log) = start().await;
    let store = DriveStore::new(api, StaticTokens::default(), drive_settings());

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.tab_names().collect::<Vec<_>>(), ["tasks"]);
    store.save(&loaded).await.unwrap();

    let seen: Vec<(Method, String)> = log
        .lock()
        .unwrap()
        .iter()
        .map(|s| (s.method.clone(), s.path.clone()))
        .collect();
    assert_eq!(
        seen,
        [
            (Method::GET, "/files".to_string()),
            (Method::GET, "/files/file-1".to_string()),
            (Method::PATCH, "/upload/files/file-1".to_string()),
        ]
    );
}
