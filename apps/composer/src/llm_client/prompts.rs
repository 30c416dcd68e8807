// Shared prompt fragments. Each stage that calls the generative service keeps
// its own templates in composition/prompts.rs; this file holds cross-cutting text.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every copywriting prompt.
pub const COPY_INSTRUCTION: &str = "\
    CRITICAL: Write final, production-ready copy in the brand's voice. \
    Never output lorem ipsum, bracketed placeholders or instructions to the reader. \
    Respect every character limit exactly; shorter is always acceptable.";
