use anyhow::{Context, Result};
use chunkflow_code_chunker::{FileInput, Language};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

const MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024;

/// Expand files and directories into readable inputs, in a stable order
pub fn collect_inputs(paths: &[PathBuf], language: Option<&str>) -> Result<Vec<FileInput>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(walk(path));
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let Ok(content) = String::from_utf8(bytes) else {
            log::warn!("Skipping non-UTF-8 file {}", path.display());
            continue;
        };
        let language = language.map_or_else(|| detect_language(&path), str::to_string);
        inputs.push(FileInput::new(content, language).with_path(path.display().to_string()));
    }
    Ok(inputs)
}

fn walk(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    builder.hidden(true).git_ignore(true).git_exclude(true).sort_by_file_path(Path::cmp);

    for result in builder.build() {
        match result {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    if meta.len() > MAX_FILE_SIZE_BYTES {
                        log::debug!("Skipping large file {} ({} bytes)", entry.path().display(), meta.len());
                        continue;
                    }
                }
                files.push(entry.into_path());
            }
            Err(e) => log::warn!("Failed to read entry: {e}"),
        }
    }
    log::debug!("Found {} files under {}", files.len(), root.display());
    files
}

/// Language name from the extension; unknown extensions are plain text
pub fn detect_language(path: &Path) -> String {
    match Language::from_path(path) {
        Language::Unknown => Language::Text.as_str().to_string(),
        lang => lang.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_directories_skipping_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("notes"), "hello\n").unwrap();
        std::fs::write(dir.path().join(".secret.py"), "x = 1\n").unwrap();

        let inputs = collect_inputs(&[dir.path().to_path_buf()], None).unwrap();
        let summary: Vec<(String, String)> = inputs
            .iter()
            .map(|i| {
                let path = i.file_path.clone().unwrap_or_default();
                let name = Path::new(&path).file_name().unwrap().to_string_lossy().into_owned();
                (name, i.language.clone())
            })
            .collect();
        assert_eq!(
            summary,
            vec![("notes".into(), "text".into()), ("lib.rs".into(), "rust".into())]
        );
    }

    #[test]
    fn language_flag_wins_and_missing_paths_fail() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "fn main() {}\n").unwrap();

        let inputs = collect_inputs(&[file], Some("rust")).unwrap();
        assert_eq!(inputs[0].language, "rust");

        assert!(collect_inputs(&[dir.path().join("missing.rs")], None).is_err());
    }
}
