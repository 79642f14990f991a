//! Response sanitization.
//!
//! Generation backends sometimes imitate the transcript format ("Agent A
//! (calm): ...") or leak reasoning blocks. Both are removed before a reply is
//! accepted into the transcript.

use regex::Regex;
use std::sync::LazyLock;

/// Reasoning tags stripped together with their content.
const REASONING_TAGS: [&str; 8] = [
    "thinking",
    "think",
    "reflection",
    "reasoning",
    "thought",
    "scratchpad",
    "internal",
    "analysis",
];

static REASONING_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REASONING_TAGS
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
        .collect()
});

/// `Agent A (anything):`, `Agent A:`, `Agent A (anything),`, `Agent A,` at the
/// start of a line.
static SPEAKER_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Agent [AB](?:[ \t]*\([^)\n]*\)[ \t]*[:,]?|[ \t]*[:,])[ \t]*").ok()
});

/// Strip speaker prefixes and reasoning blocks from a generated reply.
///
/// Applied until nothing changes, so `sanitize_response(sanitize_response(x))
/// == sanitize_response(x)`. Text without artifacts comes back trimmed and
/// otherwise unchanged.
pub fn sanitize_response(response: &str) -> String {
    let mut current = response.trim().to_string();
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_once(text: &str) -> String {
    let mut result = text.to_string();

    for re in REASONING_BLOCKS.iter() {
        result = re.replace_all(&result, "").into_owned();
    }

    if let Some(re) = SPEAKER_PREFIX.as_ref() {
        result = re.replace_all(&result, "").into_owned();
    }

    result.trim().to_string()
}
