/// Decides whether a pushed status update differs meaningfully from the
/// previous one. Gates automatic re-engagement of the model when a push
/// channel exists; the pull-only path never consults it, but the seam is kept
/// so the heuristic can be swapped for a structured status schema later.
pub trait SignificanceDetector: Send + Sync {
    fn is_significant(&self, new_status: &str, previous: Option<&str>) -> bool;
}

/// Default heuristic: a key phrase newly present, or a large length delta.
pub struct PhraseDeltaDetector {
    key_phrases: Vec<&'static str>,
    length_delta: usize,
}

const DEFAULT_KEY_PHRASES: &[&str] = &[
    "confirmed",
    "completed",
    "placed",
    "booked",
    "failed",
    "declined",
    "no answer",
    "voicemail",
    "busy",
    "total",
    "price",
    "pickup time",
    "wait time",
];

const DEFAULT_LENGTH_DELTA: usize = 80;

impl Default for PhraseDeltaDetector {
    fn default() -> Self {
        Self { key_phrases: DEFAULT_KEY_PHRASES.to_vec(), length_delta: DEFAULT_LENGTH_DELTA }
    }
}

impl PhraseDeltaDetector {
    pub fn new(key_phrases: Vec<&'static str>, length_delta: usize) -> Self {
        Self { key_phrases, length_delta }
    }
}

impl SignificanceDetector for PhraseDeltaDetector {
    fn is_significant(&self, new_status: &str, previous: Option<&str>) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        let new_lower = new_status.to_lowercase();
        let previous_lower = previous.to_lowercase();

        let new_phrase = self
            .key_phrases
            .iter()
            .any(|phrase| new_lower.contains(phrase) && !previous_lower.contains(phrase));
        if new_phrase {
            return true;
        }

        new_status.len().abs_diff(previous.len()) > self.length_delta
    }
}
