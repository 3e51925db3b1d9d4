use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{InMemoryStore, KeyValueStore};

/// The only search-result fields that cross into the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessSearchResult {
    pub id: String,
    pub name: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneDirectoryEntry {
    pub business_id: String,
    pub name: String,
    pub phone: String,
    pub last_seen: DateTime<Utc>,
}

/// Per-user name → phone index accumulated from prior search results.
///
/// Once a phone is recorded for a business id it is never overwritten; a
/// re-sighting only refreshes `last_seen`. Repeated searches are therefore
/// additive, never destructive. Entries live for the process lifetime.
#[derive(Clone)]
pub struct PhoneDirectory {
    entries: Arc<dyn KeyValueStore<PhoneDirectoryEntry>>,
}

impl PhoneDirectory {
    pub fn new(entries: Arc<dyn KeyValueStore<PhoneDirectoryEntry>>) -> Self {
        Self { entries }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn record_results(&self, user_id: &str, results: &[BusinessSearchResult]) {
        let now = Utc::now();
        for result in results {
            if result.phone.trim().is_empty() {
                continue;
            }

            let key = entry_key(user_id, &result.id);
            match self.entries.get(&key) {
                Some(mut existing) => {
                    existing.last_seen = now;
                    self.entries.set(&key, existing);
                }
                None => {
                    self.entries.set(
                        &key,
                        PhoneDirectoryEntry {
                            business_id: result.id.clone(),
                            name: result.name.clone(),
                            phone: result.phone.clone(),
                            last_seen: now,
                        },
                    );
                }
            }
        }
    }

    /// Resolve a business name to a phone number for one user.
    ///
    /// Both sides are normalized (lowercased, non-alphanumerics stripped) and
    /// a containment match in either direction is accepted. The first hit wins
    /// with no ranking or ambiguity resolution; a known limitation.
    pub fn resolve(&self, user_id: &str, query_name: &str) -> Option<String> {
        let query = normalize_name(query_name);
        if query.is_empty() {
            return None;
        }

        let prefix = format!("{user_id}:");
        self.entries
            .list()
            .into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, entry)| entry)
            .find(|entry| {
                let stored = normalize_name(&entry.name);
                !stored.is_empty() && (stored.contains(&query) || query.contains(&stored))
            })
            .map(|entry| entry.phone)
    }

    pub fn entry_count(&self, user_id: &str) -> usize {
        let prefix = format!("{user_id}:");
        self.entries.list().into_iter().filter(|(key, _)| key.starts_with(&prefix)).count()
    }

    pub fn entry(&self, user_id: &str, business_id: &str) -> Option<PhoneDirectoryEntry> {
        self.entries.get(&entry_key(user_id, business_id))
    }
}

fn entry_key(user_id: &str, business_id: &str) -> String {
    format!("{user_id}:{business_id}")
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Basic international-number plausibility: a leading `+` followed by 8 to 15
/// digits. Anything else goes through directory resolution instead.
pub fn is_plausible_international(phone: &str) -> bool {
    let trimmed = phone.trim();
    let Some(digits) = trimmed.strip_prefix('+') else {
        return false;
    };
    let digit_count = digits.chars().filter(char::is_ascii_digit).count();
    digit_count == digits.len() && (8..=15).contains(&digit_count)
}
