//! Shipped UI strings (English and Chinese) and the plain-text progress view
//! used by text mode.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::{PositionKey, Puzzle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Accepts `en`, `zh`, `zh-CN`, `zh_TW`, ...; anything else falls back to English.
    pub fn parse(tag: &str) -> Language {
        let tag = tag.trim();
        if tag.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("zh")) {
            Language::Zh
        } else {
            Language::En
        }
    }
}

/// User-facing notices raised by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    Found,
    AlreadyFound,
    Miss,
    PuzzleComplete,
    AllFound,
    StorageFull,
    StorageUnavailable,
    PuzzleNotFound,
    CredentialRequired,
    CredentialRejected,
    UploadFailed,
    Uploaded,
}

impl Message {
    pub fn text(self, lang: Language) -> &'static str {
        match (self, lang) {
            (Message::Found, Language::En) => "Found it!",
            (Message::Found, Language::Zh) => "找到了！",
            (Message::AlreadyFound, Language::En) => "You already found that one.",
            (Message::AlreadyFound, Language::Zh) => "这个已经找到了。",
            (Message::Miss, Language::En) => "Nothing there. Keep looking!",
            (Message::Miss, Language::Zh) => "这里没有，再找找！",
            (Message::PuzzleComplete, Language::En) => "Puzzle complete!",
            (Message::PuzzleComplete, Language::Zh) => "全部找到了！",
            (Message::AllFound, Language::En) => "Everything is already found.",
            (Message::AllFound, Language::Zh) => "已经全部找到，不需要提示。",
            (Message::StorageFull, Language::En) => {
                "Storage is full, progress will not be saved. Delete some custom puzzles to free space."
            }
            (Message::StorageFull, Language::Zh) => "存储空间已满，进度无法保存。请删除一些自制谜题。",
            (Message::StorageUnavailable, Language::En) => {
                "Progress cannot be saved in this browser session."
            }
            (Message::StorageUnavailable, Language::Zh) => "当前浏览器会话无法保存进度。",
            (Message::PuzzleNotFound, Language::En) => "That puzzle could not be found.",
            (Message::PuzzleNotFound, Language::Zh) => "找不到这个谜题。",
            (Message::CredentialRequired, Language::En) => "Enter an access token to upload.",
            (Message::CredentialRequired, Language::Zh) => "请输入访问令牌后再上传。",
            (Message::CredentialRejected, Language::En) => {
                "The access token was rejected. Please enter it again."
            }
            (Message::CredentialRejected, Language::Zh) => "访问令牌无效，请重新输入。",
            (Message::UploadFailed, Language::En) => "Upload failed.",
            (Message::UploadFailed, Language::Zh) => "上传失败。",
            (Message::Uploaded, Language::En) => "Puzzle uploaded.",
            (Message::Uploaded, Language::Zh) => "谜题已上传。",
        }
    }
}

/// Text-mode rendering of a puzzle's progress, one line per target.
pub fn describe_progress(puzzle: &Puzzle, found: &BTreeSet<PositionKey>, lang: Language) -> String {
    let total = puzzle.total_position_count();
    let found_total = puzzle.positions().filter(|p| found.contains(&p.key)).count();
    let mut out = match lang {
        Language::En => format!("{}: {found_total} of {total} found\n", puzzle.name),
        Language::Zh => format!("{}：已找到 {found_total}/{total}\n", puzzle.name),
    };
    for target in &puzzle.targets {
        let n = target.positions.len();
        let hits = (0..n)
            .filter(|i| found.contains(&PositionKey::new(&target.title, *i)))
            .count();
        let mark = if hits == n { "x" } else { " " };
        let _ = writeln!(out, "[{mark}] {} ({hits}/{n})", target.title);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CircleSize, Position, Target};

    #[test]
    fn language_tags() {
        assert_eq!(Language::parse("zh-CN"), Language::Zh);
        assert_eq!(Language::parse("ZH_tw"), Language::Zh);
        assert_eq!(Language::parse("en-GB"), Language::En);
        assert_eq!(Language::parse("fr"), Language::En);
        assert_eq!(Language::parse(""), Language::En);
    }

    #[test]
    fn text_mode_lists_targets() {
        let c = Position::circle(1.0, 1.0, CircleSize::Small);
        let puzzle = Puzzle {
            id: "zoo".into(),
            name: "Zoo".into(),
            image_src: "zoo.png".into(),
            targets: vec![
                Target {
                    title: "zebra".into(),
                    positions: vec![c.clone(), c.clone()],
                },
                Target {
                    title: "lion".into(),
                    positions: vec![c],
                },
            ],
        };
        let found: BTreeSet<_> = [PositionKey::new("lion", 0), PositionKey::new("zebra", 1)]
            .into_iter()
            .collect();
        let text = describe_progress(&puzzle, &found, Language::En);
        assert_eq!(text, "Zoo: 2 of 3 found\n[ ] zebra (1/2)\n[x] lion (1/1)\n");
    }
}
