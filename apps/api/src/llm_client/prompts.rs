// Cross-cutting prompt fragments shared by all backends.
// Task-specific prompts live in generation/prompts.rs.

/// System prompt fragment that enforces JSON-only output on backends without a
/// native JSON mode.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";
