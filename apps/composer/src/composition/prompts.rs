// All generative-service prompt constants for the composition pipeline.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for pattern selection.
pub const SELECTOR_SYSTEM: &str = "You are a senior web designer choosing section layouts \
    from a fixed component library. You only ever pick pattern ids that appear in the \
    candidate list you are given.";

/// Pattern selection prompt.
/// Replace: {page_type}, {brand_name}, {vision}, {audience}, {aesthetic},
///          {references}, {category}, {purpose}, {candidates}
pub const SELECTOR_PROMPT_TEMPLATE: &str = r#"Choose the best section pattern for one section of a website.

PAGE: {page_type} page for "{brand_name}"
VISION: {vision}
AUDIENCE: {audience}
AESTHETIC: {aesthetic}
REFERENCE SITES: {references}

SECTION NEEDED: {category}
SECTION PURPOSE: {purpose}

CANDIDATE PATTERNS (id — guidance — tags — variants):
{candidates}

RULES:
1. `pattern_id` MUST be one of the candidate ids above, copied exactly
2. `variant_id` must be one of that pattern's variants, or null
3. If no candidate can serve this section, set `no_fit` to true and `pattern_id` to null
4. List the candidates you did not pick in `rejected`, each with a one-line reason"#;

pub const SELECTOR_RESPONSE_SHAPE: &str = r#"{
  "pattern_id": "hero-split-image",
  "variant_id": "image-right",
  "rationale": "One or two sentences on why this pattern fits",
  "rejected": [{"pattern_id": "hero-video-bg", "reason": "Too cinematic for a developer audience"}],
  "no_fit": false
}"#;

/// System prompt for slot content generation.
pub const PROPS_SYSTEM: &str = "You are an expert conversion copywriter filling the content \
    slots of a website section. You write concise, specific copy that matches the brand.";

/// Prop generation prompt.
/// Replace: {copy_instruction}, {brand_name}, {vision}, {audience}, {aesthetic},
///          {page_type}, {pattern_name}, {pattern_description}, {purpose}, {slots}
pub const PROPS_PROMPT_TEMPLATE: &str = r#"{copy_instruction}

BRAND: {brand_name}
VISION: {vision}
AUDIENCE: {audience}
AESTHETIC: {aesthetic}
PAGE: {page_type}

SECTION PATTERN: {pattern_name} — {pattern_description}
SECTION PURPOSE: {purpose}

Fill EVERY slot below in one JSON object keyed by slot name.
SLOTS (name — kind — required — limit — hint):
{slots}

RULES:
1. Text slots are plain strings; respect the character limit
2. Array slots are JSON arrays of objects using the listed item fields; respect the item limit
3. Image slots: return a short description of the ideal image as a string; it will be generated later
4. Boolean and number slots use JSON booleans and numbers"#;

/// System prompt for gap filling.
pub const GAP_FILL_SYSTEM: &str = "You are a senior web designer inventing a bespoke website \
    section when the component library has nothing suitable. You describe its structure \
    as a small typed slot schema and fill it with final copy.";

/// Gap filling prompt.
/// Replace: {copy_instruction}, {brand_name}, {vision}, {audience}, {aesthetic},
///          {page_type}, {category}, {purpose}
pub const GAP_FILL_PROMPT_TEMPLATE: &str = r#"{copy_instruction}

BRAND: {brand_name}
VISION: {vision}
AUDIENCE: {audience}
AESTHETIC: {aesthetic}
PAGE: {page_type}

No library pattern fits this section:
CATEGORY: {category}
PURPOSE: {purpose}

Design ONE self-contained section. Declare at most 8 slots.
Allowed slot kinds: "text", "rich_text", "image", "array", "boolean", "number".
Array slots may declare `items` (nested slots, no deeper nesting).
Then fill every slot in `props`, keyed by slot name."#;

pub const GAP_FILL_RESPONSE_SHAPE: &str = r#"{
  "name": "Milestone Timeline",
  "description": "Vertical timeline of company milestones",
  "layout": "single column, alternating left/right cards",
  "slots": [
    {"name": "heading", "kind": "text", "required": true, "max_length": 80},
    {"name": "milestones", "kind": "array", "required": true, "max_length": 6,
     "items": [{"name": "year", "kind": "text", "required": true, "max_length": 8},
               {"name": "label", "kind": "text", "required": true, "max_length": 80}]}
  ],
  "props": {"heading": "...", "milestones": [{"year": "2021", "label": "..."}]}
}"#;

/// Default image prompt when a pattern declares none.
/// Replace: {subject}, {brand}, {audience}, {aesthetic}, {page}
pub const DEFAULT_IMAGE_PROMPT: &str =
    "{subject}, {aesthetic} style illustration for the {page} page of {brand}, aimed at {audience}";
