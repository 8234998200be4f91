//! The greeting list as seen by the metadata layer.
//!
//! The host owns the actual text. This is the working copy the session edits in
//! lock-step with the identity map; hosts read it back after each operation.

use serde::{Deserialize, Serialize};

/// Address of one greeting: the head slot or a position in the alternate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Head,
    Alternate(usize),
}

/// The head greeting plus the ordinary (alternate) list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greetings {
    /// Distinguished head slot, never part of the ordinary list.
    pub head: String,
    /// Ordinary list, addressed by zero-based position.
    pub alternates: Vec<String>,
}

impl Greetings {
    pub fn new(head: impl Into<String>, alternates: Vec<String>) -> Self {
        Self {
            head: head.into(),
            alternates,
        }
    }

    /// Number of ordinary positions.
    pub fn len(&self) -> usize {
        self.alternates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternates.is_empty()
    }

    pub fn text(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Head => Some(&self.head),
            Slot::Alternate(position) => self.alternates.get(position).map(String::as_str),
        }
    }

    /// Replace the text at `slot`. Returns false if the position does not exist.
    pub fn set_text(&mut self, slot: Slot, text: String) -> bool {
        match slot {
            Slot::Head => {
                self.head = text;
                true
            }
            Slot::Alternate(position) => match self.alternates.get_mut(position) {
                Some(entry) => {
                    *entry = text;
                    true
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_lookup() {
        let greetings = Greetings::new("Hi", vec!["A".into(), "B".into()]);
        assert_eq!(greetings.text(Slot::Head), Some("Hi"));
        assert_eq!(greetings.text(Slot::Alternate(1)), Some("B"));
        assert_eq!(greetings.text(Slot::Alternate(2)), None);
    }

    #[test]
    fn test_set_text_out_of_range() {
        let mut greetings = Greetings::new("Hi", vec!["A".into()]);
        assert!(!greetings.set_text(Slot::Alternate(3), "X".into()));
        assert!(greetings.set_text(Slot::Alternate(0), "X".into()));
        assert_eq!(greetings.alternates, vec!["X".to_string()]);
    }
}
