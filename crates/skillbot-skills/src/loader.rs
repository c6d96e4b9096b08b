//! Skill file discovery, loading and trigger matching.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::frontmatter::{FrontmatterError, parse_skill_file};

/// Errors raised while building a skill snapshot.
///
/// `DirectoryMissing` aborts the load; the other variants are per-file and
/// end up in [`SkillSnapshot::warnings`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("skills directory not found: {}", .0.display())]
    DirectoryMissing(PathBuf),
    #[error("failed to parse skill {}: {cause}", file.display())]
    ParseFailure { file: PathBuf, cause: String },
    #[error("duplicate skill name {name:?} in {} (first defined in {})", file.display(), first.display())]
    DuplicateName {
        name: String,
        file: PathBuf,
        first: PathBuf,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A loaded skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRecord {
    /// Skill name (identifier), unique within a snapshot.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Keywords matched case-insensitively against a turn's text.
    pub trigger_keywords: Vec<String>,
    /// Instructions injected into the model context when triggered.
    pub instructions: String,
    /// File path of the skill definition.
    pub source_path: PathBuf,
}

impl SkillRecord {
    /// Number of trigger keywords contained in `text_lower`.
    fn match_score(&self, text_lower: &str) -> usize {
        self.trigger_keywords
            .iter()
            .filter(|k| text_lower.contains(k.to_lowercase().as_str()))
            .count()
    }
}

/// Immutable result of one scan of the skills directory.
#[derive(Debug, Default)]
pub struct SkillSnapshot {
    directory: PathBuf,
    skills: Vec<Arc<SkillRecord>>,
    warnings: Vec<LoadError>,
}

impl SkillSnapshot {
    /// Directory this snapshot was loaded from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Loaded skills, ordered by name.
    pub fn skills(&self) -> &[Arc<SkillRecord>] {
        &self.skills
    }

    /// Per-file problems encountered during the scan.
    pub fn warnings(&self) -> &[LoadError] {
        &self.warnings
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SkillRecord>> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Skills whose trigger keywords occur in `turn_text`.
    ///
    /// Ordered by number of matched keywords (descending), then name.
    pub fn match_skills(&self, turn_text: &str) -> Vec<Arc<SkillRecord>> {
        let text_lower = turn_text.to_lowercase();
        let mut scored: Vec<(usize, &Arc<SkillRecord>)> = self
            .skills
            .iter()
            .map(|s| (s.match_score(&text_lower), s))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));
        scored.into_iter().map(|(_, s)| s.clone()).collect()
    }
}

/// Scan `dir` (non-recursively) and build a snapshot.
///
/// A malformed file is skipped and recorded as a warning; only a missing
/// directory fails the whole load.
pub fn load(dir: &Path) -> Result<SkillSnapshot, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::DirectoryMissing(dir.to_path_buf()));
    }

    let (files, unreadable) = discover_skill_files(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut skills: Vec<Arc<SkillRecord>> = Vec::new();
    let mut warnings = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for err in unreadable {
        tracing::warn!("Skipping unreadable entry: {err}");
        warnings.push(err);
    }

    for file_path in files {
        match load_skill_file(&file_path) {
            Ok(record) => {
                if !seen.insert(record.name.clone()) {
                    let first = skills
                        .iter()
                        .find(|s| s.name == record.name)
                        .map(|s| s.source_path.clone())
                        .unwrap_or_default();
                    let err = LoadError::DuplicateName {
                        name: record.name,
                        file: file_path,
                        first,
                    };
                    tracing::warn!("Skipping skill: {err}");
                    warnings.push(err);
                    continue;
                }
                tracing::debug!(skill = %record.name, path = %file_path.display(), "Loaded skill");
                skills.push(Arc::new(record));
            }
            Err(e) => {
                tracing::warn!("Failed to load skill: {e}");
                warnings.push(e);
            }
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(SkillSnapshot {
        directory: dir.to_path_buf(),
        skills,
        warnings,
    })
}

/// Candidate files directly under `dir`, in path order.
///
/// Hidden entries are skipped. A subdirectory counts when it holds a `SKILL.md`.
/// Entries that cannot be inspected come back as `LoadError::Io` warnings.
fn discover_skill_files(dir: &Path) -> std::io::Result<(Vec<PathBuf>, Vec<LoadError>)> {
    let mut files = Vec::new();
    let mut unreadable = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                unreadable.push(LoadError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
                continue;
            }
        };
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        // Follows symlinks, so a dangling link lands here.
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(source) => {
                unreadable.push(LoadError::Io { path, source });
                continue;
            }
        };
        if metadata.is_dir() {
            // Look for SKILL.md inside the subdirectory
            let skill_file = path.join("SKILL.md");
            if skill_file.is_file() {
                files.push(skill_file);
            }
        } else if metadata.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok((files, unreadable))
}

/// Load and validate a single skill file.
fn load_skill_file(path: &Path) -> Result<SkillRecord, LoadError> {
    let parse_failure = |cause: String| LoadError::ParseFailure {
        file: path.to_path_buf(),
        cause,
    };

    let content = std::fs::read_to_string(path).map_err(|e| parse_failure(e.to_string()))?;
    let (fm, body) = parse_skill_file(&content).map_err(|e: FrontmatterError| parse_failure(e.to_string()))?;

    if fm.name.trim().is_empty() {
        return Err(parse_failure("missing required field: name".into()));
    }
    if fm.triggers.is_empty() {
        return Err(parse_failure("missing required field: triggers".into()));
    }
    if body.is_empty() {
        return Err(parse_failure("missing required field: instructions (empty body)".into()));
    }

    Ok(SkillRecord {
        name: fm.name.trim().to_string(),
        description: fm.description,
        trigger_keywords: fm.triggers,
        instructions: body,
        source_path: path.to_path_buf(),
    })
}
