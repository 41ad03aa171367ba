//! Grounding verification for generated diagnoses.
//!
//! A diagnosis is only trusted if it references at least one
//! non-trivial token drawn from an ERROR event's message. This blocks
//! answers built entirely from generic vocabulary that could have been
//! written without looking at the evidence.

use vigil_state::{LogEvent, LogLevel};

/// Generic terms that never count as grounding.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "have", "error", "warning", "info",
    "request", "response", "failed", "failure", "service", "user", "auth", "token",
];

/// Minimum token length to qualify as grounding.
const MIN_TOKEN_LEN: usize = 4;

/// Extract candidate grounding tokens from one message.
///
/// Scans character by character: alphanumerics plus `.` and `_`
/// continue a token, anything else splits. Tokens shorter than
/// [`MIN_TOKEN_LEN`] or in the stop-word list are dropped. Tokens are
/// lower-cased.
pub fn extract_tokens(message: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let mut push_current = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            let token = current.to_lowercase();
            if token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(&token.as_str()) {
                tokens.push(token);
            }
            current.clear();
        }
    };

    for ch in message.chars() {
        if ch.is_alphanumeric() || ch == '.' || ch == '_' {
            current.push(ch);
        } else {
            push_current(&mut current, &mut tokens);
        }
    }
    push_current(&mut current, &mut tokens);

    tokens
}

/// Check that `answer` is grounded in the ERROR-level evidence.
///
/// True iff at least one qualifying token from an ERROR event's message
/// appears as a case-insensitive substring of the answer. Empty answers
/// and empty evidence never verify.
pub fn verify_answer(answer: &str, evidence: &[LogEvent]) -> bool {
    if answer.is_empty() || evidence.is_empty() {
        return false;
    }

    let answer_lowered = answer.to_lowercase();

    for event in evidence {
        if event.level != LogLevel::Error {
            continue;
        }
        for token in extract_tokens(&event.message) {
            if answer_lowered.contains(&token) {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(level: LogLevel, message: &str) -> LogEvent {
        LogEvent {
            project_id: "p1".to_string(),
            service: "backend".to_string(),
            level,
            message: message.to_string(),
            file: None,
            line: None,
            timestamp: Utc::now(),
            incident_id: None,
            stream_position: None,
        }
    }

    #[test]
    fn test_extract_splits_on_non_token_chars() {
        let tokens = extract_tokens("redis.connect() timeout: ECONNREFUSED");
        assert_eq!(tokens, vec!["redis.connect", "timeout", "econnrefused"]);
    }

    #[test]
    fn test_extract_keeps_dots_and_underscores() {
        let tokens = extract_tokens("db_pool.acquire failed");
        assert_eq!(tokens, vec!["db_pool.acquire"]);
    }

    #[test]
    fn test_extract_drops_short_tokens() {
        let tokens = extract_tokens("db up at ok");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_extract_drops_stop_words() {
        let tokens = extract_tokens("error warning request failed auth token");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_extract_lowercases() {
        let tokens = extract_tokens("ECONNREFUSED");
        assert_eq!(tokens, vec!["econnrefused"]);
    }

    #[test]
    fn test_verify_matches_error_token_case_insensitive() {
        let evidence = vec![event(LogLevel::Error, "redis timeout ECONNREFUSED")];
        assert!(verify_answer(
            "The root cause is Econnrefused from the cache layer.",
            &evidence
        ));
    }

    #[test]
    fn test_verify_ignores_non_error_evidence() {
        let evidence = vec![event(LogLevel::Info, "redis timeout econnrefused")];
        assert!(!verify_answer("econnrefused somewhere", &evidence));
    }

    #[test]
    fn test_verify_rejects_generic_answer() {
        let evidence = vec![event(LogLevel::Error, "redis timeout econnrefused")];
        assert!(!verify_answer(
            "The service failed because of an error in a request.",
            &evidence
        ));
    }

    #[test]
    fn test_verify_false_for_empty_answer_or_evidence() {
        let evidence = vec![event(LogLevel::Error, "redis timeout")];
        assert!(!verify_answer("", &evidence));
        assert!(!verify_answer("redis timeout", &[]));
    }
}
