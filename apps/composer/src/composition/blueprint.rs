//! Section planning: which categories a page needs, in page order.
//!
//! No model calls. Each page type has a fixed blueprint with per-section
//! priorities; when a page exceeds `max_patterns_per_page` the lowest-priority
//! sections are dropped and the survivors keep their original order.

use crate::composition::request::{PageRequest, PageType, SectionRequirement};
use crate::patterns::models::PatternCategory;

/// Integration features that call for a commerce section on landing/product pages.
const COMMERCE_FEATURES: &[&str] = &[
    "stripe", "shopify", "commerce", "ecommerce", "e-commerce", "payments", "checkout", "store", "cart",
];

/// A planned section with its priority (higher survives trimming).
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSection {
    pub requirement: SectionRequirement,
    pub priority: u8,
}

fn planned(category: PatternCategory, purpose: &str, priority: u8) -> PlannedSection {
    PlannedSection {
        requirement: SectionRequirement::new(category, purpose),
        priority,
    }
}

/// Default section plan for a page type.
pub fn blueprint(page_type: PageType) -> Vec<PlannedSection> {
    use PatternCategory::*;
    match page_type {
        PageType::Landing => vec![
            planned(Navigation, "Site navigation with brand and primary links", 9),
            planned(Hero, "Introduce the brand and its core value proposition", 10),
            planned(LogoWall, "Social proof from recognizable customers", 4),
            planned(Features, "Explain the main capabilities and benefits", 9),
            planned(Stats, "Quantify the impact with a few numbers", 3),
            planned(Testimonials, "Customer voices that build trust", 6),
            planned(Pricing, "Overview of plans", 5),
            planned(Faq, "Answer common objections", 4),
            planned(CallToAction, "Drive sign-ups with a closing call to action", 8),
            planned(Footer, "Site footer with links and legal", 7),
        ],
        PageType::Product => vec![
            planned(Navigation, "Site navigation", 9),
            planned(Hero, "Present the product and what it does", 10),
            planned(Features, "Product capabilities in depth", 9),
            planned(Content, "Explain how the product works", 6),
            planned(Testimonials, "Proof from existing users", 5),
            planned(CallToAction, "Invite visitors to try the product", 8),
            planned(Footer, "Site footer", 7),
        ],
        PageType::Pricing => vec![
            planned(Navigation, "Site navigation", 9),
            planned(Hero, "Frame the pricing page", 6),
            planned(Pricing, "Plans, prices and what each includes", 10),
            planned(Faq, "Billing and plan questions", 8),
            planned(CallToAction, "Nudge undecided visitors", 5),
            planned(Footer, "Site footer", 7),
        ],
        PageType::About => vec![
            planned(Navigation, "Site navigation", 9),
            planned(Hero, "State the company mission", 8),
            planned(Content, "Tell the company story", 9),
            planned(Stats, "Company milestones in numbers", 4),
            planned(Team, "Introduce the people behind the brand", 8),
            planned(CallToAction, "Invite visitors to join or get in touch", 5),
            planned(Footer, "Site footer", 7),
        ],
        PageType::Contact => vec![
            planned(Navigation, "Site navigation", 9),
            planned(Hero, "Invite visitors to get in touch", 6),
            planned(Content, "Contact details and ways to reach the team", 10),
            planned(Faq, "Questions people ask before reaching out", 5),
            planned(Footer, "Site footer", 7),
        ],
        PageType::Blog => vec![
            planned(Navigation, "Site navigation", 9),
            planned(Hero, "Introduce the blog", 6),
            planned(Content, "Latest articles", 10),
            planned(CallToAction, "Newsletter sign-up", 5),
            planned(Footer, "Site footer", 7),
        ],
        PageType::Dashboard => vec![
            planned(Navigation, "Application navigation", 10),
            planned(Dashboard, "Overview of key metrics and recent activity", 10),
            planned(Stats, "Secondary metrics", 6),
        ],
        PageType::Auth => vec![planned(Auth, "Sign-in form", 10)],
    }
}

/// Resolves the section plan for one page.
///
/// An explicit section list wins over the blueprint and is trimmed from the end.
pub fn plan_sections(page: &PageRequest, features: &[String], max_sections: usize) -> Vec<SectionRequirement> {
    if let Some(explicit) = &page.sections {
        return explicit.iter().take(max_sections).cloned().collect();
    }

    let mut plan = blueprint(page.page_type);
    if matches!(page.page_type, PageType::Landing | PageType::Product) && wants_commerce(features) {
        let position = plan
            .iter()
            .position(|s| {
                matches!(
                    s.requirement.category,
                    PatternCategory::CallToAction | PatternCategory::Footer
                )
            })
            .unwrap_or(plan.len());
        plan.insert(
            position,
            planned(PatternCategory::Commerce, "Showcase products available to buy", 7),
        );
    }

    trim_to_priority(plan, max_sections)
}

fn wants_commerce(features: &[String]) -> bool {
    features
        .iter()
        .any(|f| COMMERCE_FEATURES.contains(&f.trim().to_lowercase().as_str()))
}

/// Keeps the `max` highest-priority sections (earlier wins ties) in page order.
fn trim_to_priority(plan: Vec<PlannedSection>, max: usize) -> Vec<SectionRequirement> {
    if plan.len() <= max {
        return plan.into_iter().map(|p| p.requirement).collect();
    }

    let mut ranked: Vec<(usize, u8)> = plan.iter().enumerate().map(|(i, p)| (i, p.priority)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut keep: Vec<usize> = ranked.into_iter().take(max).map(|(i, _)| i).collect();
    keep.sort_unstable();

    plan.into_iter()
        .enumerate()
        .filter(|(i, _)| keep.binary_search(i).is_ok())
        .map(|(_, p)| p.requirement)
        .collect()
}
