use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_TRIGGER_WORD: &str = "magnitudine";
pub const MAX_WORD_DISTANCE: usize = 3;

/// Digits, one `.` or `,`, digits. The separator is kept as written.
static DECIMAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.,]\d+").expect("decimal token pattern is valid"));

/// Finds the magnitude value that follows a trigger word in free text.
#[derive(Debug, Clone)]
pub struct MagnitudeExtractor {
    trigger: String,
    max_distance: usize,
}

impl MagnitudeExtractor {
    pub fn new(trigger: &str, max_distance: usize) -> Self {
        Self {
            trigger: trigger.to_lowercase(),
            max_distance,
        }
    }

    /// Returns the first decimal token within `max_distance` words after the
    /// first word containing the trigger (case-insensitive substring match).
    ///
    /// Words that themselves contain the trigger are skipped without counting
    /// towards the distance. `None` is the normal outcome for messages that
    /// carry no magnitude.
    pub fn extract<'a>(&self, text: &'a str) -> Option<&'a str> {
        let mut words = text.split_whitespace();

        words.by_ref().find(|word| self.is_trigger(word))?;

        words
            .filter(|word| !self.is_trigger(word))
            .take(self.max_distance)
            .find_map(|word| DECIMAL_TOKEN.find(word).map(|m| m.as_str()))
    }

    fn is_trigger(&self, word: &str) -> bool {
        word.to_lowercase().contains(&self.trigger)
    }
}

impl Default for MagnitudeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_WORD, MAX_WORD_DISTANCE)
    }
}
