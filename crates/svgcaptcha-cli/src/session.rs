//! Expiring, single-use answer storage for issued captchas.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Outcome of checking a submitted answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Passed,
    Failed,
    Expired,
    /// No answer stored under the token (never issued or already used)
    Unknown,
}

#[derive(Debug, Clone)]
struct StoredAnswer {
    answer: String,
    expires_at: DateTime<Utc>,
}

/// Answers keyed by opaque tokens
pub struct AnswerStore {
    entries: Mutex<HashMap<String, StoredAnswer>>,
    ttl: Duration,
    case_sensitive: bool,
}

impl AnswerStore {
    pub fn new(ttl_secs: u64, case_sensitive: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            case_sensitive,
        }
    }

    /// Store an answer under a fresh token
    pub fn issue(&self, answer: &str) -> String {
        self.issue_at(answer, Utc::now())
    }

    fn issue_at(&self, answer: &str, now: DateTime<Utc>) -> String {
        let token = generate_token();
        let stored = StoredAnswer {
            answer: self.normalize(answer),
            expires_at: now + self.ttl,
        };
        self.lock().insert(token.clone(), stored);
        tracing::debug!(token = %token, "Issued captcha answer");
        token
    }

    /// Replace the answer behind an existing token and restart its expiry.
    ///
    /// Returns false for unknown tokens.
    pub fn regenerate(&self, token: &str, answer: &str) -> bool {
        let answer = self.normalize(answer);
        match self.lock().get_mut(token) {
            Some(entry) => {
                entry.answer = answer;
                entry.expires_at = Utc::now() + self.ttl;
                true
            }
            None => false,
        }
    }

    /// Check a submitted answer. The stored answer is consumed either way.
    pub fn verify(&self, token: &str, submitted: &str) -> Verification {
        self.verify_at(token, submitted, Utc::now())
    }

    fn verify_at(&self, token: &str, submitted: &str, now: DateTime<Utc>) -> Verification {
        let Some(stored) = self.lock().remove(token) else {
            return Verification::Unknown;
        };

        if now > stored.expires_at {
            tracing::debug!(token = %token, "Captcha answer expired");
            return Verification::Expired;
        }

        if self.normalize(submitted.trim()) == stored.answer {
            tracing::info!(token = %token, "Captcha verified successfully");
            Verification::Passed
        } else {
            tracing::debug!(token = %token, "Captcha verification failed");
            Verification::Failed
        }
    }

    /// Drop expired answers, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at >= now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn normalize(&self, answer: &str) -> String {
        if self.case_sensitive {
            answer.to_string()
        } else {
            answer.to_lowercase()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredAnswer>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Generate an opaque URL-safe token
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::Rng::fill(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_is_single_use() {
        let store = AnswerStore::new(3600, true);
        let token = store.issue("WkE");
        assert_eq!(token.len(), 22);
        assert_eq!(store.verify(&token, "WkE"), Verification::Passed);
        assert_eq!(store.verify(&token, "WkE"), Verification::Unknown);
        assert!(store.is_empty());
    }

    #[test]
    fn test_case_sensitivity() {
        let strict = AnswerStore::new(3600, true);
        let token = strict.issue("aHk");
        assert_eq!(strict.verify(&token, "AHK"), Verification::Failed);

        let relaxed = AnswerStore::new(3600, false);
        let token = relaxed.issue("aHk");
        assert_eq!(relaxed.verify(&token, " AHK\n"), Verification::Passed);
    }

    #[test]
    fn test_expiry() {
        let store = AnswerStore::new(60, true);
        let now = Utc::now();
        let token = store.issue_at("abc", now);
        assert_eq!(
            store.verify_at(&token, "abc", now + Duration::seconds(61)),
            Verification::Expired
        );
    }

    #[test]
    fn test_regenerate_replaces_answer() {
        let store = AnswerStore::new(3600, true);
        let token = store.issue("old");
        assert!(store.regenerate(&token, "new"));
        assert!(!store.regenerate("missing", "new"));
        assert_eq!(store.verify(&token, "old"), Verification::Failed);

        let token = store.issue("old");
        store.regenerate(&token, "new");
        assert_eq!(store.verify(&token, "new"), Verification::Passed);
    }

    #[test]
    fn test_purge_expired() {
        let store = AnswerStore::new(10, true);
        let now = Utc::now();
        store.issue_at("a", now - Duration::seconds(60));
        store.issue_at("b", now);
        assert_eq!(store.purge_expired_at(now), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = AnswerStore::new(3600, true);
        let a = store.issue("x");
        let b = store.issue("x");
        assert_ne!(a, b);
    }
}
