//! Creation-event classification over raw log lines

use regex::{Regex, RegexBuilder};

/// Instruction names the launcher logs when a token is created
pub const DEFAULT_CREATION_PATTERNS: &[&str] = &[
    r"instruction:\s*create(v2)?\s*$",
    r"instruction:\s*initializemint2?\b",
];

#[derive(Debug, Clone)]
pub struct CreationClassifier {
    patterns: Vec<Regex>,
}

impl CreationClassifier {
    /// Compile case-insensitive patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True if any line matches any pattern
    pub fn is_creation(&self, logs: &[String]) -> bool {
        logs.iter()
            .any(|line| self.patterns.iter().any(|re| re.is_match(line)))
    }
}

impl Default for CreationClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CREATION_PATTERNS).expect("default creation patterns compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_create_instruction() {
        let classifier = CreationClassifier::default();
        assert!(classifier.is_creation(&lines(&[
            "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]",
            "Program log: Instruction: Create",
        ])));
        assert!(classifier.is_creation(&lines(&["Program log: instruction: CREATEV2"])));
        assert!(classifier.is_creation(&lines(&["Program log: Instruction: InitializeMint2"])));
    }

    #[test]
    fn test_ignores_trades() {
        let classifier = CreationClassifier::default();
        assert!(!classifier.is_creation(&lines(&[
            "Program log: Instruction: Buy",
            "Program log: Instruction: CreateIdempotent",
            "Program log: Instruction: Sell",
        ])));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(CreationClassifier::new(&["instruction: (create"]).is_err());
    }
}
