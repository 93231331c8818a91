use std::path::PathBuf;

use glob::Pattern;
use walkdir::WalkDir;

use super::errors::TailingError;
use crate::model::LogSource;

/// Expands a `Kind::Directory` source into the set of files currently
/// matching `FilePattern` (spec §4.1: "expands via FilePattern recursively
/// if configured; each matched file becomes a logical sub-source").
pub fn expand_directory(source: &LogSource) -> Result<Vec<PathBuf>, TailingError> {
    let pattern = match &source.file_pattern {
        Some(p) => Some(
            Pattern::new(p)
                .map_err(|e| TailingError::InvalidPattern(p.clone(), e.to_string()))?,
        ),
        None => None,
    };

    let max_depth = if source.recursive { usize::MAX } else { 1 };

    let mut matched = Vec::new();
    for entry in WalkDir::new(&source.path)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let matches = match &pattern {
            Some(p) => p.matches(&file_name),
            None => true,
        };
        if matches {
            matched.push(entry.path().to_path_buf());
        }
    }
    matched.sort();
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogSourceKind;

    #[tokio::test]
    async fn matches_only_the_glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.log"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"").await.unwrap();

        let mut source = LogSource::new("dir1", dir.path(), LogSourceKind::Directory);
        source.file_pattern = Some("*.log".to_string());

        let matched = expand_directory(&source).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].file_name().unwrap(), "a.log");
    }
}
