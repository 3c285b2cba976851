use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use puzzle_core::editor::{import_puzzle, slug};
use puzzle_core::models::{Puzzle, PuzzleSummary};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  puzzle-tool check <puzzle.json>...
  puzzle-tool index <puzzle.json>...
  puzzle-tool thumbs <puzzle.json> <image.png> <out-dir>
  puzzle-tool compress <in.png> <out.png> [max-kb]";

#[derive(Debug, PartialEq)]
enum Command {
    Check(Vec<PathBuf>),
    Index(Vec<PathBuf>),
    Thumbs {
        puzzle: PathBuf,
        image: PathBuf,
        out_dir: PathBuf,
    },
    Compress {
        input: PathBuf,
        output: PathBuf,
        budget: usize,
    },
}

fn parse_args(args: &[String]) -> Option<Command> {
    let (cmd, rest) = args.split_first()?;
    let paths = || rest.iter().map(PathBuf::from).collect::<Vec<_>>();
    match (cmd.as_str(), rest) {
        ("check", [_, ..]) => Some(Command::Check(paths())),
        ("index", [_, ..]) => Some(Command::Index(paths())),
        ("thumbs", [puzzle, image, out_dir]) => Some(Command::Thumbs {
            puzzle: puzzle.into(),
            image: image.into(),
            out_dir: out_dir.into(),
        }),
        ("compress", [input, output, more @ ..]) if more.len() <= 1 => {
            let budget = match more.first() {
                Some(kb) => kb.parse::<usize>().ok()? * 1024,
                None => puzzle_imaging::DEFAULT_BUDGET,
            };
            Some(Command::Compress {
                input: input.into(),
                output: output.into(),
                budget,
            })
        }
        _ => None,
    }
}

fn read_puzzle(path: &Path) -> Result<Puzzle, Box<dyn std::error::Error>> {
    let txt = fs::read_to_string(path)?;
    Ok(import_puzzle(&txt)?)
}

/// Validates every manifest; returns how many failed.
fn check(paths: &[PathBuf]) -> usize {
    let mut failed = 0;
    for path in paths {
        match read_puzzle(path) {
            Ok(p) => info!(
                file = %path.display(),
                id = %p.id,
                targets = p.targets.len(),
                positions = p.total_position_count(),
                "ok"
            ),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "invalid puzzle");
                failed += 1;
            }
        }
    }
    failed
}

fn index(paths: &[PathBuf]) -> Result<String, Box<dyn std::error::Error>> {
    let mut entries: Vec<PuzzleSummary> = Vec::new();
    for path in paths {
        entries.push(read_puzzle(path)?.summary(false));
    }
    Ok(serde_json::to_string_pretty(&entries)?)
}

fn thumbs(puzzle: &Path, image: &Path, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let puzzle = read_puzzle(puzzle)?;
    let bytes = fs::read(image)?;
    fs::create_dir_all(out_dir)?;
    for target in &puzzle.targets {
        let Some(position) = target.positions.first() else {
            continue;
        };
        let png = puzzle_imaging::thumbnail(&bytes, position.center())?;
        let out = out_dir.join(format!("{}.png", slug(&target.title)));
        fs::write(&out, png)?;
        info!(target = %target.title, file = %out.display(), "thumbnail written");
    }
    Ok(())
}

fn compress(input: &Path, output: &Path, budget: usize) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let out = puzzle_imaging::compress(&bytes, budget)?;
    if out.len() > budget {
        warn!(bytes = out.len(), budget, "still over budget at minimum size");
    }
    fs::write(output, &out)?;
    info!(from = bytes.len(), to = out.len(), "compressed");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    match command {
        Command::Check(paths) => {
            let failed = check(&paths);
            if failed > 0 {
                eprintln!("{failed} of {} puzzle file(s) invalid", paths.len());
                std::process::exit(1);
            }
        }
        Command::Index(paths) => println!("{}", index(&paths)?),
        Command::Thumbs {
            puzzle,
            image,
            out_dir,
        } => thumbs(&puzzle, &image, &out_dir)?,
        Command::Compress {
            input,
            output,
            budget,
        } => compress(&input, &output, budget)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_args(&args(&["check", "a.json", "b.json"])),
            Some(Command::Check(vec!["a.json".into(), "b.json".into()]))
        );
        assert_eq!(
            parse_args(&args(&["compress", "in.png", "out.png", "300"])),
            Some(Command::Compress {
                input: "in.png".into(),
                output: "out.png".into(),
                budget: 300 * 1024,
            })
        );
        assert!(matches!(
            parse_args(&args(&["compress", "in.png", "out.png"])),
            Some(Command::Compress { budget, .. }) if budget == puzzle_imaging::DEFAULT_BUDGET
        ));
        assert!(matches!(
            parse_args(&args(&["thumbs", "p.json", "i.png", "out"])),
            Some(Command::Thumbs { .. })
        ));
    }

    #[test]
    fn rejects_bad_usage() {
        assert_eq!(parse_args(&[]), None);
        assert_eq!(parse_args(&args(&["check"])), None);
        assert_eq!(parse_args(&args(&["thumbs", "p.json"])), None);
        assert_eq!(parse_args(&args(&["compress", "a", "b", "lots"])), None);
        assert_eq!(parse_args(&args(&["draw"])), None);
    }

    #[test]
    fn checks_and_indexes_files() {
        let dir = env::temp_dir().join(format!("puzzle-tool-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let good = dir.join("zoo.json");
        fs::write(
            &good,
            r#"{"id":"zoo","name":"Zoo","imageSrc":"zoo.png",
                "targets":[{"title":"zebra","positions":[[10,20],{"x":5,"y":5,"size":"large"}]}]}"#,
        )
        .unwrap();
        let bad = dir.join("bad.json");
        fs::write(&bad, r#"{"id":"bad","name":"Bad","imageSrc":"b.png","targets":[]}"#).unwrap();

        assert_eq!(check(&[good.clone(), bad.clone()]), 1);
        let json = index(&[good]).unwrap();
        let entries: Vec<PuzzleSummary> = serde_json::from_str(&json).unwrap();
        assert_eq!(entries[0].position_count, 2);
        assert!(index(&[bad]).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
