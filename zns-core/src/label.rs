use std::fmt;

/// Maximum length of a single label, in UTF-8 octets (§3).
pub const MAX_LABEL_OCTETS: usize = 63;

/// A single path component in a name, normalised to canonical form
/// (case-folded, precomposed) on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Label(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label exceeds {MAX_LABEL_OCTETS} octets")]
    TooLong,
}

impl Label {
    pub fn new(raw: &str) -> Result<Self, LabelError> {
        if raw.is_empty() {
            return Err(LabelError::Empty);
        }
        // Canonical form is case-folded and precomposed; inputs here are
        // expected already-precomposed UTF-8, so only the fold is applied.
        let normalised: String = raw.to_lowercase();
        if normalised.is_empty() {
            return Err(LabelError::Empty);
        }
        if normalised.len() > MAX_LABEL_OCTETS {
            return Err(LabelError::TooLong);
        }
        Ok(Label(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a dotted name into its labels, rightmost first, per §4.4 step 1.
pub fn split_name_rightmost_first(name: &str) -> Result<Vec<Label>, LabelError> {
    name.split('.')
        .rev()
        .map(Label::new)
        .collect::<Result<Vec<_>, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert_eq!(Label::new(""), Err(LabelError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let raw = "a".repeat(64);
        assert_eq!(Label::new(&raw), Err(LabelError::TooLong));
    }

    #[test]
    fn case_folds() {
        let l = Label::new("Example").unwrap();
        assert_eq!(l.as_str(), "example");
    }

    #[test]
    fn splits_rightmost_first() {
        let labels = split_name_rightmost_first("www.example.zkey").unwrap();
        let strs: Vec<&str> = labels.iter().map(Label::as_str).collect();
        assert_eq!(strs, vec!["zkey", "example", "www"]);
    }
}
