/// Story Linter — validates story content files for graph consistency.
///
/// Usage: story_linter <story_file_or_dir>

use chatstory_engine::schema::story::StoryFile;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story_file_or_dir>");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let paths = match collect_story_paths(target) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    if paths.is_empty() {
        eprintln!("ERROR: no .json story files under '{}'", target.display());
        process::exit(1);
    }

    println!("Linting {} story file(s)", paths.len());
    println!("\n=== Story Lint Report ===\n");

    let mut errors = 0usize;
    let mut warnings = 0usize;

    for path in &paths {
        let story = match StoryFile::load_from_json(path) {
            Ok(story) => story,
            Err(e) => {
                println!("ERROR: {}: {}", path.display(), e);
                errors += 1;
                continue;
            }
        };

        for issue in story.validate() {
            if issue.is_fatal() {
                println!("ERROR: {} [{}]: {}", path.display(), story.story.id, issue);
                errors += 1;
            } else {
                println!("WARNING: {} [{}]: {}", path.display(), story.story.id, issue);
                warnings += 1;
            }
        }
    }

    if errors == 0 && warnings == 0 {
        println!("All checks passed!");
    }

    println!("\nSummary: {} errors, {} warnings", errors, warnings);

    if errors > 0 {
        process::exit(1);
    }
}

fn collect_story_paths(target: &Path) -> Result<Vec<PathBuf>, String> {
    if target.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        return Err(format!("path '{}' does not exist", target.display()));
    }

    let entries = std::fs::read_dir(target)
        .map_err(|e| format!("cannot read '{}': {}", target.display(), e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
