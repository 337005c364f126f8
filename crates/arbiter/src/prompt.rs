// Prompt construction for street arbitration

use std::fmt::Write as _;

use streetlink_linker::ArbitrationRequest;

pub fn build_system_prompt() -> String {
    r#"You are a geographic data assistant. You match street names from a community map to entries in an official street registry.

CRITICAL INSTRUCTIONS:
1. Return ONLY valid JSON with exactly one key: "official_id"
2. "official_id" must be one of the candidate ids listed in the question, or null
3. Use null when none of the candidates is the same street
4. Do NOT include any text before or after the JSON
5. Do NOT use markdown code blocks

MATCHING RULES:
- Names may differ in spelling, abbreviations, punctuation or word order
- Adjacent streets are the names of streets that touch this one on the map; use them to tell apart streets with similar names
- Never invent an id that is not in the candidate list

RESPONSE FORMAT:
{"official_id": "1234"} or {"official_id": null}"#
        .to_string()
}

pub fn build_user_prompt(request: &ArbitrationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("STREET:\n");
    let _ = writeln!(prompt, "Map name: '{}'", request.segment_name);
    let _ = writeln!(prompt, "Locality: {}", request.locality);

    prompt.push_str("\nADJACENT STREETS:\n");
    if request.adjacent_names.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        let _ = writeln!(prompt, "{}", request.adjacent_names.join(", "));
    }

    prompt.push_str("\nCANDIDATES:\n");
    for candidate in &request.candidates {
        let _ = writeln!(
            prompt,
            "{}: {} (similarity {:.1})",
            candidate.official_id, candidate.name, candidate.score
        );
    }

    prompt.push_str("\nRemember: Return ONLY valid JSON with the \"official_id\" key.");

    prompt
}
