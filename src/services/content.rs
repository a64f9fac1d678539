//! Completion content: quotes and sound references

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::state::Settings;

/// A quote shown when a session completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub author: String,
    pub category: String,
}

const QUOTES: &[(&str, &str, &str)] = &[
    ("Be mindful in the moment.", "Unknown", "mindfulness"),
    ("Focus on what matters now.", "Unknown", "focus"),
    ("Take a breath and refocus.", "Unknown", "breathing"),
    ("Small steps lead to big results.", "Unknown", "focus"),
    (
        "The present moment is filled with joy and happiness. If you are attentive, you will see it.",
        "Thich Nhat Hanh",
        "presence",
    ),
    ("Breathing in, I calm my body. Breathing out, I smile.", "Thich Nhat Hanh", "breathing"),
    (
        "Mindfulness isn't difficult, we just need to remember to do it.",
        "Sharon Salzberg",
        "mindfulness",
    ),
];

/// Resolves the quote and sound attached to a completion
#[derive(Debug, Clone)]
pub struct ContentResolver {
    quotes: Vec<Quote>,
    sound_base: String,
}

impl ContentResolver {
    pub fn new(sound_base: impl Into<String>) -> Self {
        let quotes = QUOTES
            .iter()
            .map(|(text, author, category)| Quote {
                text: text.to_string(),
                author: author.to_string(),
                category: category.to_string(),
            })
            .collect();
        Self {
            quotes,
            sound_base: sound_base.into(),
        }
    }

    /// Pick a random quote from the configured category, or from the whole
    /// catalogue when the category is `all` or has no entries
    pub fn pick_quote(&self, settings: &Settings) -> Option<Quote> {
        if !settings.show_quotes {
            return None;
        }

        let mut rng = rand::thread_rng();
        let in_category: Vec<&Quote> = self
            .quotes
            .iter()
            .filter(|q| settings.quote_category == "all" || q.category == settings.quote_category)
            .collect();

        match in_category.choose(&mut rng) {
            Some(quote) => Some((*quote).clone()),
            None => self.quotes.choose(&mut rng).cloned(),
        }
    }

    /// Reference to the completion sound, when sound is enabled
    pub fn sound_ref(&self, settings: &Settings) -> Option<String> {
        if !settings.sound_enabled || settings.selected_sound.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}.mp3",
            self.sound_base.trim_end_matches('/'),
            settings.selected_sound
        ))
    }
}

impl Default for ContentResolver {
    fn default() -> Self {
        Self::new("sounds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_respects_category_and_toggle() {
        let content = ContentResolver::default();
        let mut settings = Settings {
            quote_category: "breathing".to_string(),
            ..Settings::default()
        };

        for _ in 0..20 {
            assert_eq!(content.pick_quote(&settings).unwrap().category, "breathing");
        }

        settings.quote_category = "no-such-category".to_string();
        assert!(content.pick_quote(&settings).is_some());

        settings.show_quotes = false;
        assert!(content.pick_quote(&settings).is_none());
    }

    #[test]
    fn sound_ref_only_when_enabled() {
        let content = ContentResolver::new("https://ext.local/sounds/");
        let mut settings = Settings::default();
        assert_eq!(
            content.sound_ref(&settings).as_deref(),
            Some("https://ext.local/sounds/gentle-bell.mp3")
        );

        settings.sound_enabled = false;
        assert!(content.sound_ref(&settings).is_none());
    }
}
