// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it; this file holds the cross-cutting pieces.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps every judgement tied to what the supplied text actually says.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Base every score and every evidence item only on the candidate \
    text provided. Do NOT infer, interpolate, or invent experience, skills or \
    credentials. If the text does not support a claim, say so and score low.";
