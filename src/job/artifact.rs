//! Artifact resolution.
//!
//! The engine names its artifact `<prefix><YYYYMMDD>_<HHMMSS>.<ext>` but does
//! not reliably place it in the same location across environments. The
//! resolver looks in two places:
//!
//! ```text
//! primary dir (flat listing) ──match──▶ newest match wins
//!        │ no match
//!        ▼
//! fallback tree (recursive walk) ──match──▶ newest match wins
//!        │ no match
//!        ▼
//!      None
//! ```
//!
//! A match in the primary directory always beats the fallback tree,
//! whatever the timestamps say.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use super::config::ArtifactNaming;
use crate::error::ConfigError;

const SORT_KEY_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A file that matches the artifact naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCandidate {
    /// Location of the file.
    pub path: PathBuf,
    /// Zero-padded `YYYYMMDD_HHMMSS` taken from the filename.
    pub sort_key: String,
}

impl ArtifactCandidate {
    /// Parses the embedded timestamp. `None` for impossible dates such as
    /// month 13, which still sort but are not real times.
    pub fn produced_at(&self) -> Option<NaiveDateTime> {
        parse_sort_key(&self.sort_key)
    }
}

/// Parses a `YYYYMMDD_HHMMSS` sort key into a timestamp.
pub fn parse_sort_key(sort_key: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(sort_key, SORT_KEY_FORMAT).ok()
}

/// Compiled filename matcher for one [`ArtifactNaming`].
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    regex: Regex,
    prefix: String,
    extension: String,
}

impl ArtifactPattern {
    pub fn new(naming: &ArtifactNaming) -> Result<Self, ConfigError> {
        let pattern = format!(
            r"^{}([0-9]{{8}}_[0-9]{{6}})\.{}$",
            regex::escape(&naming.prefix),
            regex::escape(&naming.extension)
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| ConfigError::InvalidArtifactPattern(e.to_string()))?;
        Ok(Self {
            regex,
            prefix: naming.prefix.clone(),
            extension: naming.extension.clone(),
        })
    }

    /// Returns the sort key if `file_name` matches.
    pub fn sort_key(&self, file_name: &str) -> Option<String> {
        self.regex
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Builds a candidate from a path whose file name matches.
    pub fn candidate(&self, path: &Path) -> Option<ArtifactCandidate> {
        let file_name = path.file_name()?.to_str()?;
        let sort_key = self.sort_key(file_name)?;
        Some(ArtifactCandidate {
            path: path.to_path_buf(),
            sort_key,
        })
    }

    /// Human-readable form of the convention, e.g. `output_YYYYMMDD_HHMMSS.mp4`.
    pub fn describe(&self) -> String {
        format!("{}YYYYMMDD_HHMMSS.{}", self.prefix, self.extension)
    }
}

/// Finds the artifact a job produced.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    pattern: ArtifactPattern,
}

impl ArtifactResolver {
    pub fn new(pattern: ArtifactPattern) -> Self {
        Self { pattern }
    }

    /// Creates a resolver for a naming convention.
    pub fn for_naming(naming: &ArtifactNaming) -> Result<Self, ConfigError> {
        Ok(Self::new(ArtifactPattern::new(naming)?))
    }

    pub fn pattern(&self) -> &ArtifactPattern {
        &self.pattern
    }

    /// Resolves the newest artifact, primary directory first.
    pub fn resolve(&self, primary_dir: &Path, fallback_dir: &Path) -> Option<ArtifactCandidate> {
        if let Some(found) = newest(self.scan_primary(primary_dir)) {
            debug!(
                "Resolved artifact {} in primary dir",
                found.path.display()
            );
            return Some(found);
        }

        let found = newest(self.scan_fallback(fallback_dir));
        match &found {
            Some(c) => debug!("Resolved artifact {} via fallback tree", c.path.display()),
            None => debug!(
                "No artifact in {} or under {}",
                primary_dir.display(),
                fallback_dir.display()
            ),
        }
        found
    }

    /// Lists matching files directly inside `dir`.
    fn scan_primary(&self, dir: &Path) -> Vec<ArtifactCandidate> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list primary dir {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| self.pattern.candidate(&entry.path()))
            .collect()
    }

    /// Collects matching files at any depth under `dir`.
    fn scan_fallback(&self, dir: &Path) -> Vec<ArtifactCandidate> {
        if !dir.is_dir() {
            debug!("Fallback tree {} does not exist", dir.display());
            return Vec::new();
        }

        WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry in fallback tree: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.pattern.candidate(entry.path()))
            .collect()
    }
}

/// Greatest sort key wins; the path breaks ties so the choice is stable.
fn newest(candidates: Vec<ArtifactCandidate>) -> Option<ArtifactCandidate> {
    candidates
        .into_iter()
        .max_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.path.cmp(&b.path)))
}

/// Resolves an artifact using the default `output_*.mp4` convention.
pub fn resolve_artifact(primary_dir: &Path, fallback_dir: &Path) -> Option<ArtifactCandidate> {
    ArtifactResolver::for_naming(&ArtifactNaming::default())
        .ok()?
        .resolve(primary_dir, fallback_dir)
}

/// Media type for an artifact extension.
pub fn media_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"artifact").unwrap();
    }

    /// `output_20240101_120000.mp4` spelled with Arabic-Indic digits.
    const ARABIC_INDIC_NAME: &str =
        "output_\u{662}\u{660}\u{662}\u{664}\u{660}\u{661}\u{660}\u{661}_\u{661}\u{662}\u{660}\u{660}\u{660}\u{660}.mp4";

    fn resolver() -> ArtifactResolver {
        ArtifactResolver::for_naming(&ArtifactNaming::default()).unwrap()
    }

    #[test]
    fn test_pattern_matches_convention() {
        let pattern = ArtifactPattern::new(&ArtifactNaming::default()).unwrap();
        assert_eq!(
            pattern.sort_key("output_20240101_120000.mp4"),
            Some("20240101_120000".to_string())
        );
        assert_eq!(pattern.sort_key("output_2024011_120000.mp4"), None);
        assert_eq!(pattern.sort_key("output_20240101_120000.mp4.part"), None);
        assert_eq!(pattern.sort_key("xoutput_20240101_120000.mp4"), None);
        assert_eq!(pattern.sort_key("output_20240101_120000.webm"), None);
        assert_eq!(pattern.sort_key("output_20240101-120000.mp4"), None);
    }

    #[test]
    fn test_pattern_requires_ascii_digits() {
        let pattern = ArtifactPattern::new(&ArtifactNaming::default()).unwrap();
        assert_eq!(pattern.sort_key(ARABIC_INDIC_NAME), None);
        assert_eq!(pattern.describe(), "output_YYYYMMDD_HHMMSS.mp4");
    }

    #[test]
    fn test_non_ascii_digits_do_not_outrank_real_artifact() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("output_20240101_130000.mp4"));
        touch(&dir.path().join(ARABIC_INDIC_NAME));

        let found = resolve_artifact(dir.path(), &dir.path().join("media")).unwrap();

        assert_eq!(found.path, dir.path().join("output_20240101_130000.mp4"));
        assert_eq!(found.sort_key, "20240101_130000");
    }

    #[test]
    fn test_pattern_escapes_naming() {
        let pattern = ArtifactPattern::new(&ArtifactNaming::new("render.", "gif")).unwrap();
        assert!(pattern.sort_key("render.20240101_120000.gif").is_some());
        assert!(pattern.sort_key("renderX20240101_120000.gif").is_none());
    }

    #[test]
    fn test_newest_primary_wins() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("output_20240101_120000.mp4"));
        touch(&dir.path().join("output_20240101_130000.mp4"));
        touch(&dir.path().join("notes.txt"));

        let found = resolver().resolve(dir.path(), &dir.path().join("media")).unwrap();

        assert_eq!(found.path, dir.path().join("output_20240101_130000.mp4"));
        assert_eq!(found.sort_key, "20240101_130000");
    }

    #[test]
    fn test_primary_beats_newer_fallback() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("output_20240101_120000.mp4"));
        touch(&dir.path().join("media/videos/output_20250101_000000.mp4"));

        let found = resolver().resolve(dir.path(), &dir.path().join("media")).unwrap();

        assert_eq!(found.path, dir.path().join("output_20240101_120000.mp4"));
    }

    #[test]
    fn test_primary_scan_is_not_recursive() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        touch(&primary.path().join("nested/output_20240101_120000.mp4"));

        assert!(resolver().resolve(primary.path(), fallback.path()).is_none());
    }

    #[test]
    fn test_fallback_found_at_depth() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        touch(&fallback.path().join("a/b/output_20240101_120000.mp4"));

        let found = resolver().resolve(primary.path(), fallback.path()).unwrap();

        assert_eq!(found.path, fallback.path().join("a/b/output_20240101_120000.mp4"));
    }

    #[test]
    fn test_fallback_picks_newest_across_depths() {
        let primary = TempDir::new().unwrap();
        let fallback = TempDir::new().unwrap();
        touch(&fallback.path().join("output_20240101_120000.mp4"));
        touch(&fallback.path().join("x/y/z/output_20240102_000000.mp4"));
        touch(&fallback.path().join("x/output_20231231_235959.mp4"));

        let found = resolver().resolve(primary.path(), fallback.path()).unwrap();

        assert_eq!(found.sort_key, "20240102_000000");
    }

    #[test]
    fn test_directory_named_like_artifact_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("output_20240101_120000.mp4")).unwrap();

        assert!(resolver().resolve(dir.path(), &dir.path().join("media")).is_none());
    }

    #[test]
    fn test_missing_directories_yield_none() {
        let found = resolver().resolve(
            Path::new("/nonexistent/primary"),
            Path::new("/nonexistent/fallback"),
        );
        assert!(found.is_none());
    }

    #[test]
    fn test_resolve_artifact_default_convention() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("output_20240101_120000.mp4"));

        let found = resolve_artifact(dir.path(), dir.path()).unwrap();
        assert_eq!(found.sort_key, "20240101_120000");
    }

    #[test]
    fn test_produced_at() {
        let candidate = ArtifactCandidate {
            path: PathBuf::from("output_20240101_120000.mp4"),
            sort_key: "20240101_120000".to_string(),
        };
        let ts = candidate.produced_at().unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 12:00:00");

        let bogus = ArtifactCandidate {
            path: PathBuf::from("output_20241301_120000.mp4"),
            sort_key: "20241301_120000".to_string(),
        };
        assert!(bogus.produced_at().is_none());
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for("mp4"), "video/mp4");
        assert_eq!(media_type_for("MP4"), "video/mp4");
        assert_eq!(media_type_for("bin"), "application/octet-stream");
    }
}
