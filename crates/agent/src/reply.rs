/// Refusal wording minus the leading apology. A bare "Can you try
/// rephrasing?" inside an evaluation is not a refusal.
pub const REFUSAL_MARKER: &str = "not sure how to help with that. Can you try rephrasing?";

/// Full refusal as currently emitted by the remote agent.
pub const REFUSAL_REPLY: &str =
    "I'm sorry, I'm not sure how to help with that. Can you try rephrasing?";

/// Follow-up posted once after a refusal.
pub const NUDGE_TEXT: &str = "What's the problem?";

/// Preamble the remote agent prepends to evaluations after a nudge.
pub const EVALUATION_PREFIX: &str = "There was no problem with your previous request. Here is the evaluation based on the given task and candidate response:";

pub fn is_rejection(text: &str) -> bool {
    text.contains(REFUSAL_MARKER)
}

/// Removes the evaluation preamble and the trailing `speak` echo, both as
/// literal strings, then trims whitespace.
pub fn clean_reply(text: &str, speak: &str) -> String {
    let body = text.trim_start();
    let body = body.strip_prefix(EVALUATION_PREFIX).unwrap_or(body).trim();

    let speak = speak.trim();
    if speak.is_empty() {
        return body.to_owned();
    }

    match body.strip_suffix(speak).map(str::trim_end) {
        // speak that mirrors the whole body is not an echo
        Some(stripped) if !stripped.is_empty() => stripped.to_owned(),
        _ => body.to_owned(),
    }
}
