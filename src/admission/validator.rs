// =============================================================================
// Input Validation — injection signatures, length limits, symbol shape
// =============================================================================
//
// Requests are rejected before any handler logic runs when they carry known
// SQL-injection or XSS signatures, oversize parameters, or malformed symbol
// names. Signature hits are treated as suspicious activity (they feed the
// per-IP blocker harder than plain validation failures).
// =============================================================================

/// Maximum accepted length for any single query/body parameter value.
pub const MAX_PARAM_LEN: usize = 200;

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 20;

const SQL_SIGNATURES: &[&str] = &[
    "' or ",
    "\" or ",
    "union select",
    "drop table",
    "insert into",
    "delete from",
    "; select",
    "1=1",
    "sleep(",
    "benchmark(",
    "xp_cmdshell",
    "--",
    "/*",
];

const XSS_SIGNATURES: &[&str] = &[
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "onload=",
    "<iframe",
    "<img src",
    "document.cookie",
    "eval(",
    "alert(",
];

/// What a scan found, in decreasing order of hostility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputViolation {
    /// A known attack signature. Counts as suspicious activity.
    Signature(&'static str),
    /// A parameter exceeding the length limit. Counts as a validation failure.
    Oversize { length: usize },
}

/// Scan free-form input (query string, body fragment) for attack signatures
/// and oversize parameters.
pub fn scan_text(input: &str) -> Option<InputViolation> {
    let lowered = input.to_lowercase();
    for sig in SQL_SIGNATURES.iter().chain(XSS_SIGNATURES) {
        if lowered.contains(sig) {
            return Some(InputViolation::Signature(sig));
        }
    }

    // Each `key=value` pair is length-checked individually.
    for pair in input.split('&') {
        let value = pair.split_once('=').map(|(_, v)| v).unwrap_or(pair);
        if value.len() > MAX_PARAM_LEN {
            return Some(InputViolation::Oversize {
                length: value.len(),
            });
        }
    }

    None
}

/// Symbol / pair parameters must match `[A-Za-z0-9\-_/]{1,20}`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
}
