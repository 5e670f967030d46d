//! Opaque identifier generation.
//!
//! Identifiers are drawn independently at random, so uniqueness is only
//! probabilistic. Callers insert with a fresh identifier and retry on a
//! uniqueness violation instead of assuming the draw never collides.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Lowercase alphanumerics, 36 symbols.
pub const DEFAULT_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of identifiers minted by the platform itself.
pub const DEFAULT_LENGTH: usize = 26;

/// Shortest identifier accepted by configuration validation.
pub const MIN_LENGTH: usize = 8;

/// Length and symbol set of generated identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSpec {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default = "default_alphabet")]
    pub alphabet: String,
}

fn default_length() -> usize {
    DEFAULT_LENGTH
}

fn default_alphabet() -> String {
    DEFAULT_ALPHABET.to_string()
}

impl Default for IdentifierSpec {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            alphabet: DEFAULT_ALPHABET.to_string(),
        }
    }
}

impl IdentifierSpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.length < MIN_LENGTH {
            anyhow::bail!(
                "Identifier length {} is too short (minimum {})",
                self.length,
                MIN_LENGTH
            );
        }
        let symbols: Vec<char> = self.alphabet.chars().collect();
        if symbols.len() < 2 {
            anyhow::bail!("Identifier alphabet needs at least two symbols");
        }
        let mut seen = symbols.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != symbols.len() {
            anyhow::bail!("Identifier alphabet contains duplicate symbols");
        }
        if symbols
            .iter()
            .any(|c| !c.is_ascii_alphanumeric())
        {
            anyhow::bail!("Identifier alphabet must be ASCII alphanumeric");
        }
        Ok(())
    }
}

/// Source of fresh identifiers.
pub trait IdentifierSource {
    fn next_identifier(&self) -> String;
}

/// Uniform random identifiers over an [`IdentifierSpec`].
#[derive(Debug, Clone)]
pub struct RandomIdentifiers {
    symbols: Vec<char>,
    length: usize,
}

impl RandomIdentifiers {
    /// Generator over `spec`, which must pass [`IdentifierSpec::validate`].
    pub fn new(spec: &IdentifierSpec) -> anyhow::Result<Self> {
        spec.validate()?;
        Ok(Self {
            symbols: spec.alphabet.chars().collect(),
            length: spec.length,
        })
    }
}

impl Default for RandomIdentifiers {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_ALPHABET.chars().collect(),
            length: DEFAULT_LENGTH,
        }
    }
}

impl IdentifierSource for RandomIdentifiers {
    fn next_identifier(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| self.symbols[rng.random_range(0..self.symbols.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_matches_platform_format() {
        let spec = IdentifierSpec::default();
        assert_eq!(spec.alphabet.chars().count(), 36);
        assert_eq!(spec.length, 26);
        spec.validate().unwrap();
    }

    #[test]
    fn generated_identifiers_respect_spec() {
        let spec = IdentifierSpec {
            length: 12,
            alphabet: "abc123".to_string(),
        };
        let ids = RandomIdentifiers::new(&spec).unwrap();
        for _ in 0..50 {
            let id = ids.next_identifier();
            assert_eq!(id.len(), 12);
            assert!(id.chars().all(|c| spec.alphabet.contains(c)));
        }
    }

    #[test]
    fn rejects_duplicate_symbols() {
        let spec = IdentifierSpec {
            length: 26,
            alphabet: "aabc".to_string(),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_short_length() {
        let spec = IdentifierSpec {
            length: 4,
            alphabet: DEFAULT_ALPHABET.to_string(),
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn generator_refuses_an_empty_alphabet() {
        let spec = IdentifierSpec {
            length: 26,
            alphabet: String::new(),
        };
        assert!(RandomIdentifiers::new(&spec).is_err());
    }

    #[test]
    fn default_generator_uses_platform_format() {
        let id = RandomIdentifiers::default().next_identifier();
        assert_eq!(id.len(), DEFAULT_LENGTH);
        assert!(id.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
    }
}
