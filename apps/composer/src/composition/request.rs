//! The upstream description of the desired site.

use serde::{Deserialize, Serialize};

use crate::patterns::models::PatternCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Landing,
    Product,
    Pricing,
    About,
    Contact,
    Blog,
    Dashboard,
    Auth,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Landing => "landing",
            PageType::Product => "product",
            PageType::Pricing => "pricing",
            PageType::About => "about",
            PageType::Contact => "contact",
            PageType::Blog => "blog",
            PageType::Dashboard => "dashboard",
            PageType::Auth => "auth",
        }
    }

    pub fn default_route(&self) -> &'static str {
        match self {
            PageType::Landing => "/",
            PageType::Product => "/product",
            PageType::Pricing => "/pricing",
            PageType::About => "/about",
            PageType::Contact => "/contact",
            PageType::Blog => "/blog",
            PageType::Dashboard => "/dashboard",
            PageType::Auth => "/sign-in",
        }
    }

    /// Layout hint handed to the renderer.
    pub fn layout_hint(&self) -> &'static str {
        match self {
            PageType::Dashboard => "app-shell",
            PageType::Auth => "centered",
            PageType::Blog => "article",
            _ => "marketing",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub foreground: Option<String>,
}

/// Structured analysis of a reference site the user pointed at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAnalysis {
    #[serde(default)]
    pub url: Option<String>,
    /// Aesthetic classification, e.g. "minimal", "brutalist", "dark technical".
    #[serde(default)]
    pub aesthetic: Option<String>,
    /// Layout type, e.g. "split", "bento", "long-scroll".
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub palette: Palette,
}

/// One planned section: which category is needed and what it is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRequirement {
    pub category: PatternCategory,
    #[serde(default)]
    pub purpose: String,
    /// Extra descriptors that should bias selection for this section only.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SectionRequirement {
    pub fn new(category: PatternCategory, purpose: &str) -> Self {
        Self {
            category,
            purpose: purpose.to_string(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_type: PageType,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Explicit section plan; when absent the page type's blueprint is used.
    #[serde(default)]
    pub sections: Option<Vec<SectionRequirement>>,
}

impl PageRequest {
    pub fn of(page_type: PageType) -> Self {
        Self {
            page_type,
            route: None,
            title: None,
            description: None,
            sections: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrictness {
    /// Heuristic fallback requires at least one shared tag, otherwise "no fit".
    Strict,
    #[default]
    Balanced,
    /// Model answers are accepted without a rationale.
    Loose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleInheritance {
    /// Copy the first reference site's palette.
    Inherit,
    /// Reference primary/accent over an aesthetic-derived base.
    #[default]
    Blend,
    /// Ignore references; derive everything from aesthetic descriptors.
    Fresh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    Compact,
    #[default]
    Comfortable,
    Spacious,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionOptions {
    pub strictness: MatchingStrictness,
    pub max_patterns_per_page: usize,
    pub gap_filling: bool,
    pub style_inheritance: StyleInheritance,
    pub generate_images: bool,
    /// Overrides the configured section concurrency ceiling.
    pub concurrency: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            strictness: MatchingStrictness::default(),
            max_patterns_per_page: 8,
            gap_filling: true,
            style_inheritance: StyleInheritance::default(),
            generate_images: true,
            concurrency: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRequest {
    pub brand_name: String,
    pub vision: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub aesthetic: Vec<String>,
    #[serde(default)]
    pub references: Vec<ReferenceAnalysis>,
    /// Integration/feature context, e.g. "stripe", "auth", "blog".
    #[serde(default)]
    pub features: Vec<String>,
    pub pages: Vec<PageRequest>,
    #[serde(default)]
    pub options: CompositionOptions,
}

/// Page-level intent shared by every section on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageIntent {
    pub page_type: PageType,
    pub brand_name: String,
    pub vision: String,
    pub audience: String,
    pub aesthetic: Vec<String>,
    pub references: Vec<ReferenceAnalysis>,
    pub features: Vec<String>,
}

impl PageIntent {
    pub fn from_request(request: &CompositionRequest, page_type: PageType) -> Self {
        Self {
            page_type,
            brand_name: request.brand_name.clone(),
            vision: request.vision.clone(),
            audience: request.audience.clone(),
            aesthetic: request.aesthetic.clone(),
            references: request.references.clone(),
            features: request.features.clone(),
        }
    }

    /// Lowercased descriptor words drawn from audience, aesthetic, references and features.
    ///
    /// "dark/technical" yields "dark" and "technical"; order is first occurrence.
    pub fn descriptors(&self) -> Vec<String> {
        let mut sources: Vec<&str> = vec![self.audience.as_str()];
        sources.extend(self.aesthetic.iter().map(String::as_str));
        for reference in &self.references {
            sources.extend(reference.aesthetic.as_deref());
            sources.extend(reference.layout.as_deref());
        }
        sources.extend(self.features.iter().map(String::as_str));

        let mut words: Vec<String> = Vec::new();
        for source in sources {
            for word in source
                .split(|c: char| !c.is_alphanumeric() && c != '-')
                .map(|w| w.trim_matches('-').to_lowercase())
                .filter(|w| !w.is_empty())
            {
                if !words.contains(&word) {
                    words.push(word);
                }
            }
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> PageIntent {
        PageIntent {
            page_type: PageType::Landing,
            brand_name: "Forge".to_string(),
            vision: "Ship infra faster".to_string(),
            audience: "developers".to_string(),
            aesthetic: vec!["dark/technical".to_string()],
            references: vec![ReferenceAnalysis {
                aesthetic: Some("Minimal".to_string()),
                layout: Some("bento".to_string()),
                ..Default::default()
            }],
            features: vec!["stripe".to_string()],
        }
    }

    #[test]
    fn test_descriptors_split_and_dedupe() {
        let words = intent().descriptors();
        assert_eq!(words, vec!["developers", "dark", "technical", "minimal", "bento", "stripe"]);
    }

    #[test]
    fn test_options_default_when_absent() {
        let request: CompositionRequest = serde_json::from_value(serde_json::json!({
            "brand_name": "Forge",
            "vision": "Ship infra faster",
            "pages": [{"page_type": "landing"}]
        }))
        .unwrap();
        assert!(request.options.gap_filling);
        assert_eq!(request.options.max_patterns_per_page, 8);
        assert_eq!(request.options.strictness, MatchingStrictness::Balanced);
    }

    #[test]
    fn test_partial_options_keep_other_defaults() {
        let options: CompositionOptions =
            serde_json::from_value(serde_json::json!({"gap_filling": false})).unwrap();
        assert!(!options.gap_filling);
        assert!(options.generate_images);
    }

    #[test]
    fn test_page_type_routes() {
        assert_eq!(PageType::Landing.default_route(), "/");
        assert_eq!(PageType::Dashboard.layout_hint(), "app-shell");
    }
}
