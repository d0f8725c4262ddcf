use serde::{Deserialize, Serialize};

pub const DEFAULT_STATUSES: [&str; 4] = ["Visuelt ok", "Sprekk", "USB feil", "Knust"];

pub const DEFAULT_SCHOOLS: [&str; 12] = [
    "Akkarfjord oppvekstsenter",
    "Baksalen skole",
    "Breilia skole",
    "Fjordtun skole",
    "Forsøl skole",
    "Fuglenes skole",
    "Kokelv oppvekstsenter",
    "Kvalsund skole",
    "Reindalen skole",
    "Voksenopplæringa",
    "Barnehager",
    "Ukjent",
];

/// Fixed, numbered menu of labels. Entry `n` is selected by typing `n`,
/// counting from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn statuses() -> Self {
        Self::new(DEFAULT_STATUSES)
    }

    pub fn schools() -> Self {
        Self::new(DEFAULT_SCHOOLS)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Maps a typed menu key to its label. Anything that is not one of the
    /// listed numbers yields `None`.
    pub fn select(&self, input: &str) -> Option<&str> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: usize = trimmed.parse().ok()?;
        index
            .checked_sub(1)
            .and_then(|idx| self.labels.get(idx))
            .map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (idx + 1, label.as_str()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|candidate| candidate == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_one_based_number() {
        let statuses = Vocabulary::statuses();
        assert_eq!(statuses.select("1"), Some("Visuelt ok"));
        assert_eq!(statuses.select(" 2 "), Some("Sprekk"));
        assert_eq!(statuses.select("4"), Some("Knust"));
    }

    #[test]
    fn rejects_out_of_range_and_non_numeric_keys() {
        let statuses = Vocabulary::statuses();
        assert_eq!(statuses.select("0"), None);
        assert_eq!(statuses.select("5"), None);
        assert_eq!(statuses.select(""), None);
        assert_eq!(statuses.select("Sprekk"), None);
        assert_eq!(statuses.select("+1"), None);
    }

    #[test]
    fn school_menu_has_double_digit_keys() {
        let schools = Vocabulary::schools();
        assert_eq!(schools.len(), 12);
        assert_eq!(schools.select("3"), Some("Breilia skole"));
        assert_eq!(schools.select("10"), Some("Voksenopplæringa"));
        assert_eq!(schools.select("12"), Some("Ukjent"));
        assert!(schools.contains("Forsøl skole"));
    }

    #[test]
    fn entries_are_numbered_in_order() {
        let vocab = Vocabulary::new(["a", "b"]);
        let entries: Vec<_> = vocab.entries().collect();
        assert_eq!(entries, vec![(1, "a"), (2, "b")]);
    }
}
