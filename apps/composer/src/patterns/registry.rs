//! The immutable pattern catalog every other stage queries.
//!
//! Built once at startup from the embedded catalog (or a file named by config)
//! and shared as `Arc<PatternRegistry>`. A malformed catalog is a fatal startup
//! error: every fallback path downstream assumes the registry is valid.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::composition::validation::validate_definition;
use crate::patterns::models::{Pattern, PatternCategory};

/// The catalog compiled into the binary.
const BUILTIN_CATALOG: &str = include_str!("catalog.json");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read pattern catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse pattern catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate pattern id '{0}'")]
    DuplicateId(String),

    #[error("invalid pattern '{pattern_id}': {reason}")]
    InvalidDefinition { pattern_id: String, reason: String },

    #[error("pattern catalog is empty")]
    Empty,
}

/// Immutable, id-ordered pattern catalog.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: BTreeMap<String, Pattern>,
}

impl PatternRegistry {
    /// Loads the catalog compiled into the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&raw)?;
        info!(path = %path.display(), patterns = registry.len(), "Loaded pattern catalog from file");
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let patterns: Vec<Pattern> = serde_json::from_str(raw)?;
        Self::from_patterns(patterns)
    }

    /// Builds a registry, rejecting duplicate ids and structurally invalid definitions.
    pub fn from_patterns(patterns: Vec<Pattern>) -> Result<Self, RegistryError> {
        if patterns.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut map = BTreeMap::new();
        for pattern in patterns {
            let result = validate_definition(&pattern);
            if let Some(issue) = result.issues.first() {
                return Err(RegistryError::InvalidDefinition {
                    pattern_id: pattern.id.clone(),
                    reason: issue.message.clone(),
                });
            }
            if map.contains_key(&pattern.id) {
                return Err(RegistryError::DuplicateId(pattern.id));
            }
            map.insert(pattern.id.clone(), pattern);
        }

        Ok(Self { patterns: map })
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.patterns.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// All patterns in id order.
    pub fn all(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn by_category(&self, category: PatternCategory) -> Vec<&Pattern> {
        self.all().filter(|p| p.category == category).collect()
    }

    /// Patterns carrying at least one of `tags`, in id order.
    pub fn by_tags(&self, tags: &[String]) -> Vec<&Pattern> {
        self.all()
            .filter(|p| tags.iter().any(|t| p.has_tag(t)))
            .collect()
    }

    /// Case-insensitive substring search over name, description and tags.
    pub fn search(&self, query: &str) -> Vec<&Pattern> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.all()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
                    || p.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Same-category patterns ranked by shared tag count (desc), ties by id.
    /// The pattern itself is excluded; an unknown id yields an empty list.
    pub fn similar(&self, id: &str, limit: usize) -> Vec<&Pattern> {
        let Some(source) = self.get(id) else {
            return Vec::new();
        };

        let mut ranked: Vec<(usize, &Pattern)> = self
            .by_category(source.category)
            .into_iter()
            .filter(|p| p.id != source.id)
            .map(|p| (source.shared_tag_count(p), p))
            .collect();

        ranked.sort_by(|(a_score, a), (b_score, b)| b_score.cmp(a_score).then_with(|| a.id.cmp(&b.id)));
        ranked.into_iter().take(limit).map(|(_, p)| p).collect()
    }

    /// Categories with at least one registered pattern.
    pub fn categories(&self) -> BTreeSet<PatternCategory> {
        self.all().map(|p| p.category).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pattern, registry_of};
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_loads() {
        let registry = PatternRegistry::builtin().expect("built-in catalog must be valid");
        assert!(registry.len() >= 20);
    }

    #[test]
    fn test_builtin_catalog_covers_every_category() {
        let registry = PatternRegistry::builtin().unwrap();
        let categories = registry.categories();
        for category in PatternCategory::ALL {
            assert!(categories.contains(&category), "no pattern for {category}");
        }
    }

    #[test]
    fn test_builtin_slot_names_unique_within_pattern() {
        let registry = PatternRegistry::builtin().unwrap();
        for p in registry.all() {
            let names: HashSet<&str> = p.slots.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names.len(), p.slots.len(), "duplicate slot in {}", p.id);
        }
    }

    #[test]
    fn test_get_returns_requested_pattern_or_none() {
        let registry = PatternRegistry::builtin().unwrap();
        for p in registry.all() {
            assert_eq!(registry.get(&p.id).map(|found| &found.id), Some(&p.id));
        }
        assert!(registry.get("hero-does-not-exist").is_none());
        assert!(!registry.contains("hero-does-not-exist"));
    }

    #[test]
    fn test_duplicate_id_is_fatal() {
        let result = PatternRegistry::from_patterns(vec![
            pattern("hero-a", PatternCategory::Hero, &["bold"]),
            pattern("hero-a", PatternCategory::Hero, &["calm"]),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateId(id)) if id == "hero-a"));
    }

    #[test]
    fn test_missing_field_is_fatal() {
        // No "slots" field.
        let raw = r#"[{"id": "hero-x", "name": "Hero X", "category": "hero", "description": "d"}]"#;
        assert!(matches!(PatternRegistry::from_json(raw), Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_empty_name_is_invalid_definition() {
        let mut p = pattern("hero-x", PatternCategory::Hero, &[]);
        p.name = String::new();
        let result = PatternRegistry::from_patterns(vec![p]);
        assert!(matches!(result, Err(RegistryError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        assert!(matches!(PatternRegistry::from_json("[]"), Err(RegistryError::Empty)));
    }

    #[test]
    fn test_by_tags_matches_any_in_id_order() {
        let registry = registry_of(vec![
            pattern("hero-z", PatternCategory::Hero, &["dark"]),
            pattern("features-a", PatternCategory::Features, &["grid"]),
            pattern("hero-b", PatternCategory::Hero, &["light"]),
        ]);
        let ids: Vec<&str> = registry
            .by_tags(&["DARK".to_string(), "grid".to_string()])
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["features-a", "hero-z"]);
    }

    #[test]
    fn test_search_matches_name_description_and_tags() {
        let registry = PatternRegistry::builtin().unwrap();
        let found = registry.search("cinematic");
        assert!(found.iter().any(|p| p.id == "hero-video-bg"));
        assert!(registry.search("   ").is_empty());
    }

    #[test]
    fn test_similar_ranks_by_shared_tags_then_id() {
        let registry = registry_of(vec![
            pattern("hero-source", PatternCategory::Hero, &["dark", "technical", "image"]),
            pattern("hero-b", PatternCategory::Hero, &["dark"]),
            pattern("hero-a", PatternCategory::Hero, &["dark"]),
            pattern("hero-c", PatternCategory::Hero, &["dark", "technical"]),
            pattern("features-x", PatternCategory::Features, &["dark", "technical", "image"]),
        ]);
        let ids: Vec<&str> = registry
            .similar("hero-source", 10)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["hero-c", "hero-a", "hero-b"]);
    }

    #[test]
    fn test_similar_unknown_id_is_empty() {
        let registry = PatternRegistry::builtin().unwrap();
        assert!(registry.similar("nope", 5).is_empty());
    }

    #[test]
    fn test_from_file_loads_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let raw = serde_json::to_string(&vec![pattern("hero-file", PatternCategory::Hero, &[])]).unwrap();
        file.write_all(raw.as_bytes()).unwrap();

        let registry = PatternRegistry::from_file(file.path()).unwrap();
        assert!(registry.contains("hero-file"));
    }

    #[test]
    fn test_from_file_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PatternRegistry::from_file(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(RegistryError::Io(_))));
    }
}
