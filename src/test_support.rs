//! Local HTTP fixture shared by the async tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        Response, StatusCode, Uri,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    serve,
};
use tokio::net::TcpListener;

#[derive(Default)]
struct Shared {
    files: Mutex<HashMap<String, Vec<u8>>>,
    hits: AtomicUsize,
}

/// Serves registered paths from memory and counts every request.
pub(crate) struct TestHttpServer {
    base: String,
    shared: Arc<Shared>,
}

impl TestHttpServer {
    pub(crate) async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());

        let router = Router::new()
            .fallback(serve_file)
            .with_state(shared.clone());

        tokio::spawn(async move {
            let _ = serve(listener, router).await;
        });

        Self {
            base: format!("http://{addr}"),
            shared,
        }
    }

    pub(crate) fn with_file(self, path: &str, body: Vec<u8>) -> Self {
        self.shared
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub(crate) fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }
}

async fn serve_file(State(shared): State<Arc<Shared>>, uri: Uri) -> Response<Body> {
    shared.hits.fetch_add(1, Ordering::SeqCst);
    let body = shared.files.lock().unwrap().get(uri.path()).cloned();
    match body {
        Some(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}
