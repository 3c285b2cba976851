//! Find state machine: which answers of the active puzzle have been found.
//!
//! `NoPuzzle → Playing → Completed`. Every change is written through to the
//! [`ProgressStore`] as a full snapshot of the in-memory state, which stays
//! authoritative when a write fails.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PuzzleError, StorageError};
use crate::models::{Point, PositionKey, Progress, Puzzle};
use crate::store::ProgressStore;

/// Source of "now" for `lastPlayed` stamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FindPhase {
    NoPuzzle,
    Playing,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Newly found; `completed` tells whether this was the last one.
    Found { completed: bool },
    AlreadyFound,
}

#[derive(Debug)]
struct ActivePuzzle {
    puzzle: Puzzle,
    found: BTreeSet<PositionKey>,
    completed: bool,
}

impl ActivePuzzle {
    fn refresh_completion(&mut self) {
        self.completed = self.found.len() >= self.puzzle.total_position_count();
    }
}

pub struct FindMachine<S, C = SystemClock> {
    store: S,
    clock: C,
    active: Option<ActivePuzzle>,
}

impl<S: ProgressStore> FindMachine<S, SystemClock> {
    pub fn new(store: S) -> Self {
        FindMachine::with_clock(store, SystemClock)
    }
}

impl<S: ProgressStore, C: Clock> FindMachine<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        FindMachine {
            store,
            clock,
            active: None,
        }
    }

    /// Make `puzzle` the active puzzle and restore its saved progress.
    ///
    /// Keys that no longer name a position (renamed targets) are dropped. If
    /// the saved record cannot be read the puzzle is still loaded, with
    /// nothing found, and the storage error is returned.
    pub fn load(&mut self, puzzle: Puzzle) -> Result<FindPhase, PuzzleError> {
        let restored = self.store.load(&puzzle.id);
        let mut found = BTreeSet::new();
        let mut failure = None;
        match restored {
            Ok(Some(progress)) => {
                let valid: BTreeSet<PositionKey> = puzzle.positions().map(|p| p.key).collect();
                let total = progress.found_positions.len();
                found.extend(
                    progress
                        .found_positions
                        .into_iter()
                        .filter(|k| valid.contains(k)),
                );
                if found.len() < total {
                    debug!(puzzle = %puzzle.id, dropped = total - found.len(), "ignoring orphaned position keys");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(puzzle = %puzzle.id, error = %e, "could not restore progress");
                failure = Some(e);
            }
        }
        let mut active = ActivePuzzle {
            puzzle,
            found,
            completed: false,
        };
        active.refresh_completion();
        debug!(puzzle = %active.puzzle.id, found = active.found.len(), completed = active.completed, "puzzle loaded");
        self.active = Some(active);
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(self.phase()),
        }
    }

    pub fn unload(&mut self) {
        self.active = None;
    }

    pub fn phase(&self) -> FindPhase {
        match &self.active {
            None => FindPhase::NoPuzzle,
            Some(a) if a.completed => FindPhase::Completed,
            Some(_) => FindPhase::Playing,
        }
    }

    pub fn puzzle(&self) -> Option<&Puzzle> {
        self.active.as_ref().map(|a| &a.puzzle)
    }

    pub fn found(&self) -> Option<&BTreeSet<PositionKey>> {
        self.active.as_ref().map(|a| &a.found)
    }

    pub fn is_found(&self, key: &PositionKey) -> bool {
        self.active.as_ref().is_some_and(|a| a.found.contains(key))
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == FindPhase::Completed
    }

    /// `(found, total)` for the active puzzle.
    pub fn counts(&self) -> (usize, usize) {
        self.active.as_ref().map_or((0, 0), |a| {
            (a.found.len(), a.puzzle.total_position_count())
        })
    }

    /// First unfound position containing `p`, in target/position order.
    /// Always `None` once the puzzle is completed.
    pub fn check_hit(&self, p: Point) -> Option<PositionKey> {
        let active = self.active.as_ref()?;
        if active.completed {
            return None;
        }
        active
            .puzzle
            .positions()
            .filter(|pos| !active.found.contains(&pos.key))
            .find(|pos| pos.position.contains(p))
            .map(|pos| pos.key)
    }

    /// Record a find. Marking a key twice is a no-op and writes nothing.
    ///
    /// On a storage failure the key stays found in memory and the error is
    /// returned so the UI can warn that progress is not being saved.
    pub fn mark_found(&mut self, key: &PositionKey) -> Result<MarkOutcome, PuzzleError> {
        let active = self.active.as_mut().ok_or(PuzzleError::NoPuzzleLoaded)?;
        if active.puzzle.position(key).is_none() {
            return Err(PuzzleError::UnknownPosition(key.to_string()));
        }
        if !active.found.insert(key.clone()) {
            return Ok(MarkOutcome::AlreadyFound);
        }
        active.refresh_completion();
        let completed = active.completed;
        debug!(%key, completed, "position found");
        self.persist()?;
        Ok(MarkOutcome::Found { completed })
    }

    /// Hit test and mark in one step.
    pub fn find_at(&mut self, p: Point) -> Result<Option<PositionKey>, PuzzleError> {
        let Some(key) = self.check_hit(p) else {
            return Ok(None);
        };
        self.mark_found(&key)?;
        Ok(Some(key))
    }

    /// Forget every find of the active puzzle and persist the empty record.
    pub fn reset(&mut self) -> Result<(), PuzzleError> {
        let active = self.active.as_mut().ok_or(PuzzleError::NoPuzzleLoaded)?;
        active.found.clear();
        active.refresh_completion();
        debug!(puzzle = %active.puzzle.id, "progress reset");
        self.persist()?;
        Ok(())
    }

    /// Snapshot of the active puzzle's progress, stamped with the current time.
    pub fn progress(&self) -> Option<Progress> {
        self.active.as_ref().map(|a| Progress {
            puzzle_id: a.puzzle.id.clone(),
            found_positions: a.found.iter().cloned().collect(),
            completed: a.completed,
            last_played: self.clock.now(),
        })
    }

    fn persist(&self) -> Result<(), StorageError> {
        let Some(progress) = self.progress() else {
            return Ok(());
        };
        self.store.save(&progress).inspect_err(|e| {
            warn!(puzzle = %progress.puzzle_id, error = %e, "progress not saved");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CircleSize, Position, Target};
    use crate::store::{KvProgressStore, MemoryStore, MockProgressStore};

    #[derive(Clone, Copy)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn noon() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn single_item() -> Puzzle {
        Puzzle {
            id: "single".into(),
            name: "Single".into(),
            image_src: "single.png".into(),
            targets: vec![Target {
                title: "item".into(),
                positions: vec![Position::circle(500.0, 500.0, CircleSize::Medium)],
            }],
        }
    }

    fn fox_and_owl() -> Puzzle {
        let c = |x, y| Position::circle(x, y, CircleSize::Small);
        Puzzle {
            id: "forest".into(),
            name: "Forest".into(),
            image_src: "forest.png".into(),
            targets: vec![
                Target {
                    title: "fox".into(),
                    positions: vec![c(100.0, 100.0), c(900.0, 900.0)],
                },
                Target {
                    title: "owl".into(),
                    positions: vec![c(500.0, 200.0)],
                },
            ],
        }
    }

    fn memory_machine() -> FindMachine<KvProgressStore<MemoryStore>, FixedClock> {
        FindMachine::with_clock(KvProgressStore::new(MemoryStore::new()), FixedClock(noon()))
    }

    fn empty_store() -> MockProgressStore {
        let mut store = MockProgressStore::new();
        store.expect_load().returning(|_| Ok(None));
        store
    }

    #[test]
    fn single_circle_scenario() {
        let mut m = memory_machine();
        assert_eq!(m.load(single_item()).unwrap(), FindPhase::Playing);

        assert_eq!(m.find_at(Point::new(540.0, 500.0)).unwrap(), None);
        let key = m.find_at(Point::new(500.0, 500.0)).unwrap();
        assert_eq!(key, Some(PositionKey::new("item", 0)));
        assert_eq!(m.phase(), FindPhase::Completed);

        let progress = m.progress().unwrap();
        assert_eq!(progress.found_positions, [PositionKey::from("item:0")]);
        assert!(progress.completed);
        assert_eq!(progress.last_played, noon());

        // completed puzzles ignore further clicks
        assert_eq!(m.check_hit(Point::new(500.0, 500.0)), None);
    }

    #[test]
    fn completion_needs_every_position_regardless_of_grouping() {
        let mut m = memory_machine();
        m.load(fox_and_owl()).unwrap();
        assert_eq!(m.counts(), (0, 3));
        m.mark_found(&PositionKey::new("fox", 0)).unwrap();
        let outcome = m.mark_found(&PositionKey::new("owl", 0)).unwrap();
        assert_eq!(outcome, MarkOutcome::Found { completed: false });
        assert_eq!(m.phase(), FindPhase::Playing);
        let outcome = m.mark_found(&PositionKey::new("fox", 1)).unwrap();
        assert_eq!(outcome, MarkOutcome::Found { completed: true });
        assert!(m.is_completed());
    }

    #[test]
    fn mark_found_twice_persists_once() {
        let mut store = empty_store();
        store
            .expect_save()
            .withf(|p| p.found_positions == [PositionKey::from("fox:0")] && !p.completed)
            .times(1)
            .returning(|_| Ok(()));
        let mut m = FindMachine::with_clock(store, FixedClock(noon()));
        m.load(fox_and_owl()).unwrap();

        let key = PositionKey::new("fox", 0);
        assert_eq!(
            m.mark_found(&key).unwrap(),
            MarkOutcome::Found { completed: false }
        );
        assert_eq!(m.mark_found(&key).unwrap(), MarkOutcome::AlreadyFound);
        assert_eq!(m.counts(), (1, 3));
    }

    #[test]
    fn storage_failure_surfaces_but_keeps_the_find() {
        let mut store = empty_store();
        store
            .expect_save()
            .returning(|_| Err(StorageError::QuotaExceeded));
        let mut m = FindMachine::with_clock(store, FixedClock(noon()));
        m.load(single_item()).unwrap();

        let err = m.find_at(Point::new(505.0, 495.0)).unwrap_err();
        assert_eq!(err.storage(), Some(&StorageError::QuotaExceeded));
        assert!(!err.is_not_found());
        assert!(m.is_found(&PositionKey::new("item", 0)));
        assert!(m.is_completed());
    }

    #[test]
    fn load_restores_and_can_start_completed() {
        let store = KvProgressStore::new(MemoryStore::new());
        store
            .save(&Progress {
                puzzle_id: "single".into(),
                found_positions: vec![PositionKey::new("item", 0)],
                completed: true,
                last_played: noon(),
            })
            .unwrap();
        let mut m = FindMachine::with_clock(store, FixedClock(noon()));
        assert_eq!(m.load(single_item()).unwrap(), FindPhase::Completed);
    }

    #[test]
    fn orphaned_keys_do_not_count_towards_completion() {
        let mut store = MockProgressStore::new();
        store.expect_load().returning(|id| {
            Ok(Some(Progress {
                puzzle_id: id.to_string(),
                found_positions: vec![
                    PositionKey::from("renamed fox:0"),
                    PositionKey::from("renamed fox:1"),
                    PositionKey::from("owl:0"),
                ],
                completed: true,
                last_played: noon(),
            }))
        });
        let mut m = FindMachine::with_clock(store, FixedClock(noon()));
        assert_eq!(m.load(fox_and_owl()).unwrap(), FindPhase::Playing);
        assert_eq!(m.counts(), (1, 3));
    }

    #[test]
    fn unreadable_progress_still_loads_the_puzzle() {
        let mut store = MockProgressStore::new();
        store
            .expect_load()
            .returning(|_| Err(StorageError::unavailable("disabled")));
        let mut m = FindMachine::with_clock(store, FixedClock(noon()));
        let err = m.load(single_item()).unwrap_err();
        assert!(err.storage().is_some());
        assert_eq!(m.phase(), FindPhase::Playing);
        assert_eq!(m.counts(), (0, 1));
    }

    #[test]
    fn first_match_wins_for_overlapping_positions() {
        let mut puzzle = fox_and_owl();
        puzzle.targets[1].positions[0] = Position::circle(100.0, 100.0, CircleSize::Large);
        let mut m = memory_machine();
        m.load(puzzle).unwrap();
        assert_eq!(
            m.check_hit(Point::new(101.0, 101.0)),
            Some(PositionKey::new("fox", 0))
        );
        m.mark_found(&PositionKey::new("fox", 0)).unwrap();
        // found keys are skipped, so the overlapping owl is next
        assert_eq!(
            m.check_hit(Point::new(101.0, 101.0)),
            Some(PositionKey::new("owl", 0))
        );
    }

    #[test]
    fn reset_persists_empty_progress() {
        let kv = MemoryStore::new();
        let mut m = FindMachine::with_clock(KvProgressStore::new(&kv), FixedClock(noon()));
        m.load(single_item()).unwrap();
        m.find_at(Point::new(500.0, 500.0)).unwrap();
        assert!(m.is_completed());

        m.reset().unwrap();
        assert_eq!(m.phase(), FindPhase::Playing);
        assert_eq!(m.counts(), (0, 1));
        let saved = KvProgressStore::new(&kv).load("single").unwrap().unwrap();
        assert!(saved.found_positions.is_empty());
        assert!(!saved.completed);
    }

    #[test]
    fn nothing_happens_without_a_puzzle() {
        let mut m = FindMachine::with_clock(MockProgressStore::new(), FixedClock(noon()));
        assert_eq!(m.phase(), FindPhase::NoPuzzle);
        assert_eq!(m.check_hit(Point::new(1.0, 1.0)), None);
        assert_eq!(
            m.mark_found(&PositionKey::from("x:0")),
            Err(PuzzleError::NoPuzzleLoaded)
        );
        assert_eq!(m.reset(), Err(PuzzleError::NoPuzzleLoaded));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut m = memory_machine();
        m.load(single_item()).unwrap();
        assert!(matches!(
            m.mark_found(&PositionKey::from("item:7")),
            Err(PuzzleError::UnknownPosition(_))
        ));
    }
}
