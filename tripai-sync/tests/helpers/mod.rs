//! Fake analyze server for integration tests
//!
//! Serves `POST /api/analyze` and `GET /api/health` on an ephemeral port and
//! records every upload it receives.

#![allow(dead_code)]

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Success,
    /// Model output spread into the reply as-is: nulls, numbers and extra keys
    RawModel,
    ServerError,
    Malformed,
}

/// One multipart request as the server saw it
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub image: Vec<u8>,
    pub fields: HashMap<String, String>,
}

pub struct FakeServer {
    mode: Mutex<Mode>,
    healthy: Mutex<bool>,
    next_id: Mutex<i64>,
    uploads: Mutex<Vec<Upload>>,
}

impl FakeServer {
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    fn next_id(&self) -> i64 {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        *next_id
    }
}

/// Language of the latest upload, echoed the way the server does
fn upload_language(server: &FakeServer) -> String {
    server
        .uploads
        .lock()
        .unwrap()
        .last()
        .and_then(|u| u.fields.get("language").cloned())
        .unwrap_or_else(|| "en".to_string())
}

/// Start the fake server; returns its base URL
pub async fn start_server() -> (String, Arc<FakeServer>) {
    let server = Arc::new(FakeServer {
        mode: Mutex::new(Mode::Success),
        healthy: Mutex::new(true),
        next_id: Mutex::new(100),
        uploads: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/analyze", post(analyze))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), server)
}

/// Base URL nothing is listening on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Write a solid-color PNG of the given size
pub fn write_photo(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([30, 144, 255]))
        .save(&path)
        .unwrap();
    path
}

async fn health(State(server): State<Arc<FakeServer>>) -> Response {
    if *server.healthy.lock().unwrap() {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn analyze(State(server): State<Arc<FakeServer>>, mut multipart: Multipart) -> Response {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            upload.file_name = field.file_name().map(str::to_string);
            upload.content_type = field.content_type().map(str::to_string);
            upload.image = field.bytes().await.unwrap().to_vec();
        } else {
            let value = field.text().await.unwrap();
            upload.fields.insert(name, value);
        }
    }
    server.uploads.lock().unwrap().push(upload);

    let mode = *server.mode.lock().unwrap();
    match mode {
        Mode::Success => {
            let id = server.next_id();
            Json(json!({
                "id": id,
                "name": "Eiffel Tower",
                "location": "Paris, France",
                "year_built": "1889",
                "status": "Landmark",
                "architect": "Gustave Eiffel",
                "capacity": "N/A",
                "narrative_p1": "A wrought-iron lattice tower.",
                "narrative_quote": "",
                "narrative_p2": "",
                "nearby1_name": "Trocadero",
                "nearby1_category": "Viewpoint"
            }))
            .into_response()
        }
        Mode::RawModel => {
            let id = server.next_id();
            let language = upload_language(&server);
            Json(json!({
                "id": id,
                "latitude": null,
                "longitude": null,
                "language": language,
                "name": "Wembley Stadium",
                "location": "London, England",
                "year_built": 2007,
                "status": null,
                "architect": "Foster + Partners",
                "capacity": 90000,
                "narrative_p1": "Home of English football.",
                "nearby1_name": "Wembley Arena",
                "nearby1_category": null,
                "is_unesco": false
            }))
            .into_response()
        }
        Mode::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Analysis failed", "message": "quota exceeded" })),
        )
            .into_response(),
        Mode::Malformed => (StatusCode::OK, "<html>gateway</html>").into_response(),
    }
}
