//! Test-only helpers shared across modules.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};
use warp::{
    http::{Method, Response, StatusCode},
    hyper::body::Bytes,
    path::FullPath,
    Filter,
};

/// A request seen by [`serve_recording`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

type Routes = Arc<HashMap<&'static str, Vec<u8>>>;

/// Serve fixed bodies keyed by request path (query string ignored).
/// Unknown paths get a 404.
pub async fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> String {
    serve_recording(routes).await.0
}

pub async fn serve_recording(routes: Vec<(&'static str, Vec<u8>)>) -> (String, Seen) {
    spawn_server(routes, None)
}

/// Like [`serve`], but requests to `stalled` are accepted and never answered.
pub async fn serve_stalling(routes: Vec<(&'static str, Vec<u8>)>, stalled: &'static str) -> String {
    spawn_server(routes, Some(stalled)).0
}

fn spawn_server(
    routes: Vec<(&'static str, Vec<u8>)>,
    stalled: Option<&'static str>,
) -> (String, Seen) {
    let routes: Routes = Arc::new(routes.into_iter().collect());
    let seen: Seen = Arc::default();

    let recorder = seen.clone();
    let handler = warp::method()
        .and(warp::path::full())
        .and(warp::body::bytes())
        .and_then(move |method: Method, path: FullPath, body: Bytes| {
            let routes = routes.clone();
            let seen = recorder.clone();
            async move {
                seen.lock().unwrap().push(SeenRequest {
                    method: method.to_string(),
                    path: path.as_str().to_string(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
                if stalled == Some(path.as_str()) {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok::<_, Infallible>(reply(&routes, path.as_str()))
            }
        });

    let (addr, server) = warp::serve(handler).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (format!("http://{}", addr), seen)
}

fn reply(routes: &Routes, path: &str) -> Response<Vec<u8>> {
    let (status, body) = match routes.get(path) {
        Some(body) => (StatusCode::OK, body.clone()),
        None => (
            StatusCode::NOT_FOUND,
            br#"{"error":{"message":"Not found"}}"#.to_vec(),
        ),
    };
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}
