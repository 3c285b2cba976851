//! Content repository port and the publisher built on it.
//!
//! The repository is addressed the way the GitHub contents API lays it out:
//! one file per path, writes carry a commit message and base64 content, and
//! updates or deletes of an existing file must name its current blob `sha`.
//! Request bodies and status handling live here so the browser client only
//! moves bytes.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PuzzleError, RemoteError};
use crate::geometry::validate_puzzle;
use crate::models::{CustomPuzzle, Puzzle, PuzzleSummary};
use crate::store::{CredentialStore, KeyValueStore, REPO_CONFIG_KEY, get_json, set_json};

pub const PUZZLE_DIR: &str = "puzzles";
pub const INDEX_PATH: &str = "puzzles/index.json";
const API_ROOT: &str = "https://api.github.com";
const RAW_ROOT: &str = "https://raw.githubusercontent.com";

pub fn manifest_path(id: &str) -> String {
    format!("{PUZZLE_DIR}/{id}.json")
}

pub fn image_path(id: &str) -> String {
    format!("{PUZZLE_DIR}/images/{id}.png")
}

fn default_branch() -> String {
    "main".to_string()
}

/// Where published puzzles go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl RepoConfig {
    pub fn new(owner: &str, repo: &str, branch: Option<&str>) -> Result<Self, PuzzleError> {
        let owner = owner.trim();
        let repo = repo.trim();
        if owner.is_empty() || repo.is_empty() {
            return Err(PuzzleError::invalid("repository owner and name are required"));
        }
        let branch = branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map_or_else(default_branch, str::to_string);
        Ok(RepoConfig {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
        })
    }

    pub fn load(kv: &impl KeyValueStore) -> Result<Option<Self>, PuzzleError> {
        Ok(get_json(kv, REPO_CONFIG_KEY)?)
    }

    pub fn save(&self, kv: &impl KeyValueStore) -> Result<(), PuzzleError> {
        Ok(set_json(kv, REPO_CONFIG_KEY, self)?)
    }

    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{API_ROOT}/repos/{}/{}/contents/{}",
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// Contents URL pinned to the configured branch, for reads.
    pub fn contents_ref_url(&self, path: &str) -> String {
        format!("{}?ref={}", self.contents_url(path), self.branch)
    }

    /// Public URL of a committed file.
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{RAW_ROOT}/{}/{}/{}/{}",
            self.owner,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }

    /// JSON body for creating or replacing a file.
    pub fn put_body(&self, message: &str, bytes: &[u8], sha: Option<&str>) -> String {
        #[derive(Serialize)]
        struct Put<'a> {
            message: &'a str,
            content: String,
            branch: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            sha: Option<&'a str>,
        }
        json_body(&Put {
            message,
            content: STANDARD.encode(bytes),
            branch: &self.branch,
            sha,
        })
    }

    pub fn delete_body(&self, message: &str, sha: &str) -> String {
        #[derive(Serialize)]
        struct Delete<'a> {
            message: &'a str,
            sha: &'a str,
            branch: &'a str,
        }
        json_body(&Delete {
            message,
            sha,
            branch: &self.branch,
        })
    }
}

fn json_body(body: &impl Serialize) -> String {
    // Plain string/struct fields cannot fail to serialize.
    serde_json::to_string(body).unwrap_or_default()
}

/// A file as returned by a contents read.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContentsFile {
    pub sha: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentsFile {
    pub fn parse(body: &str) -> Result<Self, RemoteError> {
        serde_json::from_str(body).map_err(RemoteError::decode)
    }

    /// File bytes; the service wraps base64 at 60 columns.
    pub fn decode(&self) -> Result<Vec<u8>, RemoteError> {
        let packed: String = self.content.split_whitespace().collect();
        STANDARD.decode(packed).map_err(RemoteError::decode)
    }
}

/// Result of a successful write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: Option<String>,
}

impl UploadReceipt {
    /// Receipt from a write response; a body without file details is still a
    /// successful write.
    pub fn from_put_response(body: &str) -> Self {
        #[derive(Deserialize)]
        struct PutResponse {
            content: Option<ContentsFile>,
        }
        let url = serde_json::from_str::<PutResponse>(body)
            .ok()
            .and_then(|r| r.content)
            .and_then(|c| c.download_url);
        UploadReceipt { url }
    }
}

/// Maps an HTTP status and body onto the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> Result<(), RemoteError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let message = error_message(body);
    match status {
        401 => Err(RemoteError::Unauthorized(message)),
        _ => Err(RemoteError::Api { status, message }),
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiMessage {
        message: String,
    }
    match serde_json::from_str::<ApiMessage>(body) {
        Ok(m) => m.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Write side of the hosted content repository.
#[async_trait(?Send)]
pub trait ContentRepository {
    async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<UploadReceipt, RemoteError>;

    /// Deleting a missing file is not an error.
    async fn delete(&self, token: &str, path: &str, message: &str) -> Result<(), RemoteError>;

    /// The published index; empty when none has been written yet.
    async fn list_index(&self, token: &str) -> Result<Vec<PuzzleSummary>, RemoteError>;
}

/// Publishes custom puzzles with the stored credential.
pub struct Publisher<R, C> {
    repo: R,
    credentials: C,
}

impl<R: ContentRepository, C: CredentialStore> Publisher<R, C> {
    pub fn new(repo: R, credentials: C) -> Self {
        Publisher { repo, credentials }
    }

    fn token(&self) -> Result<String, RemoteError> {
        self.credentials
            .token()
            .ok_or(RemoteError::MissingCredential)
    }

    fn check<T>(&self, result: Result<T, RemoteError>) -> Result<T, RemoteError> {
        if let Err(RemoteError::Unauthorized(message)) = &result {
            warn!(%message, "credential rejected, clearing it");
            self.credentials.clear_token();
        }
        result
    }

    pub async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<UploadReceipt, RemoteError> {
        let token = self.token()?;
        let result = self.repo.upload(&token, path, bytes, message).await;
        self.check(result)
    }

    pub async fn delete(&self, path: &str, message: &str) -> Result<(), RemoteError> {
        let token = self.token()?;
        let result = self.repo.delete(&token, path, message).await;
        self.check(result)
    }

    pub async fn list_index(&self) -> Result<Vec<PuzzleSummary>, RemoteError> {
        let token = self.token()?;
        let result = self.repo.list_index(&token).await;
        self.check(result)
    }

    /// Uploads the image, then the manifest pointing at it, then rewrites the
    /// index. `png` is the already compressed image.
    pub async fn publish(
        &self,
        custom: &CustomPuzzle,
        png: &[u8],
    ) -> Result<UploadReceipt, PuzzleError> {
        validate_puzzle(&custom.puzzle)?;
        let id = custom.puzzle.id.as_str();
        let image = self
            .upload(&image_path(id), png, &format!("Add image for {id}"))
            .await?;

        let manifest = Puzzle {
            image_src: image.url.unwrap_or_else(|| image_path(id)),
            ..custom.puzzle.clone()
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(RemoteError::decode)?;
        let receipt = self
            .upload(&manifest_path(id), &json, &format!("Publish puzzle {id}"))
            .await?;

        let mut index = self.list_index().await?;
        let summary = manifest.summary(false);
        match index.iter_mut().find(|s| s.id == summary.id) {
            Some(slot) => *slot = summary,
            None => index.push(summary),
        }
        self.write_index(&index, &format!("Index puzzle {id}")).await?;
        info!(id, "puzzle published");
        Ok(receipt)
    }

    /// Removes the manifest, image and index entry of a published puzzle.
    pub async fn unpublish(&self, id: &str) -> Result<(), PuzzleError> {
        let mut index = self.list_index().await?;
        let before = index.len();
        index.retain(|s| s.id != id);
        if index.len() == before {
            return Err(PuzzleError::not_found("published puzzle", id));
        }
        self.write_index(&index, &format!("Unindex puzzle {id}"))
            .await?;
        self.delete(&manifest_path(id), &format!("Unpublish puzzle {id}"))
            .await?;
        self.delete(&image_path(id), &format!("Remove image for {id}"))
            .await?;
        info!(id, "puzzle unpublished");
        Ok(())
    }

    async fn write_index(&self, index: &[PuzzleSummary], message: &str) -> Result<(), RemoteError> {
        let json = serde_json::to_vec_pretty(index).map_err(RemoteError::decode)?;
        debug!(entries = index.len(), "writing puzzle index");
        self.upload(INDEX_PATH, &json, message).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CircleSize, Position, Target};
    use crate::store::{KvCredentialStore, MemoryStore, MockCredentialStore, TOKEN_KEY};
    use chrono::DateTime;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeRepo {
        files: RefCell<BTreeMap<String, Vec<u8>>>,
        tokens_seen: RefCell<Vec<String>>,
        reject: bool,
    }

    impl FakeRepo {
        fn file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.borrow().get(path).cloned()
        }
    }

    #[async_trait(?Send)]
    impl ContentRepository for FakeRepo {
        async fn upload(
            &self,
            token: &str,
            path: &str,
            bytes: &[u8],
            _message: &str,
        ) -> Result<UploadReceipt, RemoteError> {
            self.tokens_seen.borrow_mut().push(token.to_string());
            if self.reject {
                return Err(RemoteError::Unauthorized("Bad credentials".into()));
            }
            self.files
                .borrow_mut()
                .insert(path.to_string(), bytes.to_vec());
            Ok(UploadReceipt {
                url: Some(format!("https://cdn.test/{path}")),
            })
        }

        async fn delete(&self, _token: &str, path: &str, _message: &str) -> Result<(), RemoteError> {
            self.files.borrow_mut().remove(path);
            Ok(())
        }

        async fn list_index(&self, _token: &str) -> Result<Vec<PuzzleSummary>, RemoteError> {
            match self.file(INDEX_PATH) {
                Some(bytes) => serde_json::from_slice(&bytes).map_err(RemoteError::decode),
                None => Ok(Vec::new()),
            }
        }
    }

    fn custom(id: &str) -> CustomPuzzle {
        CustomPuzzle {
            puzzle: Puzzle {
                id: id.into(),
                name: "Farm".into(),
                image_src: String::new(),
                targets: vec![Target {
                    title: "pig".into(),
                    positions: vec![Position::circle(100.0, 200.0, CircleSize::Large)],
                }],
            },
            image_data: "data:image/png;base64,AAAA".into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn with_token(token: &str) -> KvCredentialStore<Rc<MemoryStore>> {
        let creds = KvCredentialStore::new(Rc::new(MemoryStore::new()));
        creds.set_token(token).unwrap();
        creds
    }

    #[test]
    fn urls_and_bodies_follow_the_contents_api() {
        let cfg = RepoConfig::new(" kids ", "puzzles", None).unwrap();
        assert_eq!(cfg.branch, "main");
        assert_eq!(
            cfg.contents_url("/puzzles/farm.json"),
            "https://api.github.com/repos/kids/puzzles/contents/puzzles/farm.json"
        );
        assert_eq!(
            cfg.contents_ref_url(INDEX_PATH),
            "https://api.github.com/repos/kids/puzzles/contents/puzzles/index.json?ref=main"
        );
        assert_eq!(
            cfg.raw_url(&image_path("farm")),
            "https://raw.githubusercontent.com/kids/puzzles/main/puzzles/images/farm.png"
        );

        let body: serde_json::Value = serde_json::from_str(&cfg.put_body("m", b"hi", None)).unwrap();
        assert_eq!(body["content"], "aGk=");
        assert_eq!(body["branch"], "main");
        assert!(body.get("sha").is_none());
        let body: serde_json::Value =
            serde_json::from_str(&cfg.put_body("m", b"hi", Some("abc"))).unwrap();
        assert_eq!(body["sha"], "abc");
        let body: serde_json::Value = serde_json::from_str(&cfg.delete_body("m", "abc")).unwrap();
        assert_eq!(body["sha"], "abc");

        assert!(RepoConfig::new("", "x", None).is_err());
    }

    #[test]
    fn repo_config_persists() {
        let kv = MemoryStore::new();
        assert_eq!(RepoConfig::load(&kv).unwrap(), None);
        let cfg = RepoConfig::new("kids", "puzzles", Some("pages")).unwrap();
        cfg.save(&kv).unwrap();
        assert_eq!(RepoConfig::load(&kv).unwrap(), Some(cfg));
    }

    #[test]
    fn contents_reads_decode_wrapped_base64() {
        let file = ContentsFile::parse(r#"{"sha":"s1","content":"aGVs\nbG8=\n"}"#).unwrap();
        assert_eq!(file.decode().unwrap(), b"hello");
        assert!(ContentsFile::parse("[]").is_err());
    }

    #[test]
    fn write_responses_yield_the_download_url() {
        let r = UploadReceipt::from_put_response(
            r#"{"content":{"sha":"s","download_url":"https://raw.test/a.png"}}"#,
        );
        assert_eq!(r.url.as_deref(), Some("https://raw.test/a.png"));
        assert_eq!(UploadReceipt::from_put_response("{}"), UploadReceipt::default());
    }

    #[test]
    fn statuses_map_to_errors() {
        assert_eq!(classify_status(201, ""), Ok(()));
        assert_eq!(
            classify_status(401, r#"{"message":"Bad credentials"}"#),
            Err(RemoteError::Unauthorized("Bad credentials".into()))
        );
        assert_eq!(
            classify_status(422, "sha wasn't supplied\n"),
            Err(RemoteError::Api {
                status: 422,
                message: "sha wasn't supplied".into()
            })
        );
    }

    #[tokio::test]
    async fn missing_credential_never_reaches_the_repository() {
        let mut creds = MockCredentialStore::new();
        creds.expect_token().return_const(None::<String>);
        creds.expect_clear_token().never();
        let publisher = Publisher::new(FakeRepo::default(), creds);
        let err = publisher.upload("a", b"x", "m").await.unwrap_err();
        assert_eq!(err, RemoteError::MissingCredential);
    }

    #[tokio::test]
    async fn rejected_credential_is_cleared() {
        let mut creds = MockCredentialStore::new();
        creds.expect_token().return_const(Some("stale".to_string()));
        creds.expect_clear_token().times(1).return_const(());
        let repo = FakeRepo {
            reject: true,
            ..FakeRepo::default()
        };
        let publisher = Publisher::new(repo, creds);
        let err = publisher.upload("a", b"x", "m").await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn publish_writes_image_manifest_and_index() {
        let publisher = Publisher::new(FakeRepo::default(), with_token("t0k"));
        let receipt = publisher.publish(&custom("farm"), b"png-bytes").await.unwrap();
        assert_eq!(
            receipt.url.as_deref(),
            Some("https://cdn.test/puzzles/farm.json")
        );

        let repo = &publisher.repo;
        assert_eq!(repo.file("puzzles/images/farm.png").unwrap(), b"png-bytes");
        let manifest: Puzzle =
            serde_json::from_slice(&repo.file("puzzles/farm.json").unwrap()).unwrap();
        assert_eq!(manifest.image_src, "https://cdn.test/puzzles/images/farm.png");
        assert_eq!(manifest.targets.len(), 1);
        let index = publisher.list_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].position_count, 1);
        assert!(repo.tokens_seen.borrow().iter().all(|t| t == "t0k"));

        // Republishing replaces the index entry.
        publisher.publish(&custom("farm"), b"png-2").await.unwrap();
        publisher.publish(&custom("barn"), b"png-3").await.unwrap();
        let ids: Vec<_> = publisher
            .list_index()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["farm", "barn"]);
    }

    #[tokio::test]
    async fn unpublish_removes_every_file() {
        let publisher = Publisher::new(FakeRepo::default(), with_token("t0k"));
        publisher.publish(&custom("farm"), b"png").await.unwrap();
        publisher.unpublish("farm").await.unwrap();
        let repo = &publisher.repo;
        assert!(repo.file("puzzles/farm.json").is_none());
        assert!(repo.file("puzzles/images/farm.png").is_none());
        assert!(publisher.list_index().await.unwrap().is_empty());
        assert!(publisher.unpublish("farm").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn invalid_puzzles_are_not_published() {
        let publisher = Publisher::new(FakeRepo::default(), with_token("t0k"));
        let mut bad = custom("farm");
        bad.puzzle.targets.clear();
        assert!(matches!(
            publisher.publish(&bad, b"png").await,
            Err(PuzzleError::Invalid(_))
        ));
        assert!(publisher.repo.files.borrow().is_empty());
    }

    #[test]
    fn token_key_is_shared_with_the_store() {
        let kv = Rc::new(MemoryStore::new());
        let creds = KvCredentialStore::new(kv.clone());
        creds.set_token("abc").unwrap();
        assert_eq!(kv.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));
    }
}
