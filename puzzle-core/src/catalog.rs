//! Puzzle source: the hosted catalog merged with puzzles made in the editor.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{PuzzleError, RemoteError};
use crate::geometry::validate_puzzle;
use crate::models::{CustomPuzzle, Puzzle, PuzzleSummary};
use crate::store::{
    CustomPuzzleStore, KeyValueStore, KvProgressStore, LargeObjectStore, ProgressStore,
};

/// Read side of the hosted puzzle catalog.
#[async_trait(?Send)]
pub trait RemoteCatalog {
    async fn index(&self) -> Result<Vec<PuzzleSummary>, RemoteError>;
    /// `Ok(None)` when the catalog has no puzzle with that id.
    async fn puzzle(&self, id: &str) -> Result<Option<Puzzle>, RemoteError>;
}

/// Custom puzzles live in the large-object tier `B`; their progress sits
/// with every other puzzle's in the key-value store `K`.
pub struct PuzzleLibrary<R, K, B> {
    remote: R,
    custom: CustomPuzzleStore<B>,
    progress: KvProgressStore<K>,
}

impl<R: RemoteCatalog, K: KeyValueStore, B: LargeObjectStore> PuzzleLibrary<R, K, B> {
    pub fn new(remote: R, kv: K, objects: B) -> Self {
        PuzzleLibrary {
            remote,
            custom: CustomPuzzleStore::new(objects),
            progress: KvProgressStore::new(kv),
        }
    }

    /// Hosted puzzles followed by custom ones. A catalog failure only costs
    /// the hosted part of the list.
    pub async fn list_puzzles(&self) -> Result<Vec<PuzzleSummary>, PuzzleError> {
        let mut out = match self.remote.index().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "puzzle catalog unavailable, listing custom puzzles only");
                Vec::new()
            }
        };
        out.extend(self.custom.list().await?.iter().map(|c| c.puzzle.summary(true)));
        Ok(out)
    }

    /// Custom puzzles are looked up first, then the hosted catalog. Hosted
    /// manifests are validated before they reach play.
    pub async fn get_puzzle(&self, id: &str) -> Result<Puzzle, PuzzleError> {
        if let Some(custom) = self.custom.get(id).await? {
            debug!(id, "loading custom puzzle");
            return Ok(custom.playable());
        }
        let mut puzzle = self
            .remote
            .puzzle(id)
            .await?
            .ok_or_else(|| PuzzleError::not_found("puzzle", id))?;
        if puzzle.id.is_empty() {
            puzzle.id = id.to_string();
        }
        if let Err(e) = validate_puzzle(&puzzle) {
            warn!(id, error = %e, "hosted puzzle rejected");
            return Err(e);
        }
        Ok(puzzle)
    }

    pub async fn custom_puzzles(&self) -> Result<Vec<CustomPuzzle>, PuzzleError> {
        Ok(self.custom.list().await?)
    }

    pub async fn get_custom(&self, id: &str) -> Result<CustomPuzzle, PuzzleError> {
        self.custom
            .get(id)
            .await?
            .ok_or_else(|| PuzzleError::not_found("custom puzzle", id))
    }

    pub async fn save_custom(&self, puzzle: &CustomPuzzle) -> Result<(), PuzzleError> {
        validate_puzzle(&puzzle.puzzle)?;
        self.custom.save(puzzle).await?;
        Ok(())
    }

    /// Removes a custom puzzle together with its progress.
    pub async fn delete_custom(&self, id: &str) -> Result<(), PuzzleError> {
        if !self.custom.delete(id).await? {
            return Err(PuzzleError::not_found("custom puzzle", id));
        }
        self.progress.delete(id)?;
        debug!(id, "custom puzzle deleted");
        Ok(())
    }
}
