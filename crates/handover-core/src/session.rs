use crate::Vocabulary;

/// Sticky status/school selections for the lifetime of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDefaults {
    pub status: Option<String>,
    pub school: Option<String>,
}

impl SessionDefaults {
    /// Applies a status menu answer. A valid key overrides the sticky value;
    /// anything else keeps it. Returns the value now in effect.
    pub fn choose_status(&mut self, vocabulary: &Vocabulary, input: &str) -> Option<&str> {
        choose(&mut self.status, vocabulary, input)
    }

    pub fn choose_school(&mut self, vocabulary: &Vocabulary, input: &str) -> Option<&str> {
        choose(&mut self.school, vocabulary, input)
    }
}

fn choose<'a>(slot: &'a mut Option<String>, vocabulary: &Vocabulary, input: &str) -> Option<&'a str> {
    if let Some(label) = vocabulary.select(input) {
        *slot = Some(label.to_string());
    }
    slot.as_deref()
}
