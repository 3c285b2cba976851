//! `fetch`-backed implementations of the catalog and repository ports.

use async_trait::async_trait;
use puzzle_core::catalog::RemoteCatalog;
use puzzle_core::error::RemoteError;
use puzzle_core::models::{Puzzle, PuzzleSummary};
use puzzle_core::remote::{
    ContentRepository, ContentsFile, INDEX_PATH, RepoConfig, UploadReceipt, classify_status,
    manifest_path,
};
use tracing::debug;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, Response, Window};

use crate::utils::{asset_url, fetch_text_with_fallbacks};

fn js_message(e: JsValue) -> String {
    match e.dyn_ref::<js_sys::Error>() {
        Some(err) => String::from(err.message()),
        None => format!("{e:?}"),
    }
}

fn network(e: JsValue) -> RemoteError {
    RemoteError::network(js_message(e))
}

/// One HTTP exchange; returns the status and body text.
async fn send(
    window: &Window,
    method: &str,
    url: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> Result<(u16, String), RemoteError> {
    let headers = Headers::new().map_err(network)?;
    headers
        .set("Accept", "application/vnd.github+json")
        .map_err(network)?;
    if let Some(token) = token {
        headers
            .set("Authorization", &format!("Bearer {token}"))
            .map_err(network)?;
    }
    let init = RequestInit::new();
    init.set_method(method);
    if let Some(body) = body {
        headers
            .set("Content-Type", "application/json")
            .map_err(network)?;
        init.set_body(&JsValue::from_str(body));
    }
    init.set_headers(&headers);
    let request = Request::new_with_str_and_init(url, &init).map_err(network)?;
    let resp: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(network)?
        .dyn_into()
        .map_err(network)?;
    let text = JsFuture::from(resp.text().map_err(network)?)
        .await
        .map_err(network)?
        .as_string()
        .unwrap_or_default();
    debug!(method, url, status = resp.status(), "request done");
    Ok((resp.status(), text))
}

/// Puzzles shipped with the site under `puzzles/`.
pub struct StaticCatalog {
    window: Window,
}

impl StaticCatalog {
    pub fn new(window: Window) -> Self {
        StaticCatalog { window }
    }
}

#[async_trait(?Send)]
impl RemoteCatalog for StaticCatalog {
    async fn index(&self) -> Result<Vec<PuzzleSummary>, RemoteError> {
        let primary = asset_url(INDEX_PATH);
        let fallback = format!("/{INDEX_PATH}");
        let text = fetch_text_with_fallbacks(&self.window, &[&primary, &fallback])
            .await
            .ok_or_else(|| RemoteError::network("puzzle index unreachable"))?;
        serde_json::from_str(&text).map_err(RemoteError::decode)
    }

    async fn puzzle(&self, id: &str) -> Result<Option<Puzzle>, RemoteError> {
        let (status, body) = send(&self.window, "GET", &asset_url(&manifest_path(id)), None, None).await?;
        if status == 404 {
            return Ok(None);
        }
        classify_status(status, &body)?;
        let mut puzzle: Puzzle = serde_json::from_str(&body).map_err(RemoteError::decode)?;
        // Relative image paths are relative to the site root.
        puzzle.image_src = asset_url(&puzzle.image_src);
        Ok(Some(puzzle))
    }
}

/// GitHub contents API client for publishing.
pub struct GithubRepository {
    window: Window,
    config: RepoConfig,
}

impl GithubRepository {
    pub fn new(window: Window, config: RepoConfig) -> Self {
        GithubRepository { window, config }
    }

    /// Current file, or `None` when the path does not exist yet.
    async fn read(&self, token: &str, path: &str) -> Result<Option<ContentsFile>, RemoteError> {
        let url = self.config.contents_ref_url(path);
        let (status, body) = send(&self.window, "GET", &url, Some(token), None).await?;
        if status == 404 {
            return Ok(None);
        }
        classify_status(status, &body)?;
        ContentsFile::parse(&body).map(Some)
    }
}

#[async_trait(?Send)]
impl ContentRepository for GithubRepository {
    async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<UploadReceipt, RemoteError> {
        let sha = self.read(token, path).await?.map(|f| f.sha);
        let body = self.config.put_body(message, bytes, sha.as_deref());
        let url = self.config.contents_url(path);
        let (status, text) = send(&self.window, "PUT", &url, Some(token), Some(&body)).await?;
        classify_status(status, &text)?;
        Ok(UploadReceipt::from_put_response(&text))
    }

    async fn delete(&self, token: &str, path: &str, message: &str) -> Result<(), RemoteError> {
        let Some(file) = self.read(token, path).await? else {
            return Ok(());
        };
        let body = self.config.delete_body(message, &file.sha);
        let url = self.config.contents_url(path);
        let (status, text) = send(&self.window, "DELETE", &url, Some(token), Some(&body)).await?;
        if status == 404 {
            return Ok(());
        }
        classify_status(status, &text)
    }

    async fn list_index(&self, token: &str) -> Result<Vec<PuzzleSummary>, RemoteError> {
        match self.read(token, INDEX_PATH).await? {
            Some(file) => serde_json::from_slice(&file.decode()?).map_err(RemoteError::decode),
            None => Ok(Vec::new()),
        }
    }
}
