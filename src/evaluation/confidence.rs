use std::fmt;

use serde::Serialize;

/// How sure the evaluation is that a module or package is used.
///
/// Levels are totally ordered; anything above [`Confidence::None`] passes.
/// [`Confidence::Skipped`] ranks highest so that a skipped item is never
/// reported, whatever other evidence exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    #[default]
    None = 0,
    VeryLow = 5,
    Low = 10,
    Medium = 15,
    High = 20,
    VeryHigh = 25,
    Skipped = 30,
}

impl Confidence {
    pub fn passes(self) -> bool {
        self > Confidence::None
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confidence::None => "none",
            Confidence::VeryLow => "very low",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::VeryHigh => "very high",
            Confidence::Skipped => "skipped",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Confidence::None < Confidence::VeryLow);
        assert!(Confidence::High < Confidence::VeryHigh);
        assert!(Confidence::VeryHigh < Confidence::Skipped);
        assert_eq!(
            [Confidence::Medium, Confidence::Skipped, Confidence::None]
                .into_iter()
                .max(),
            Some(Confidence::Skipped)
        );
    }

    #[test]
    fn test_passes() {
        assert!(!Confidence::None.passes());
        assert!(Confidence::VeryLow.passes());
        assert!(Confidence::Skipped.passes());
    }

    #[test]
    fn test_values() {
        assert_eq!(Confidence::Medium.value(), 15);
        assert_eq!(Confidence::Skipped.value(), 30);
        assert_eq!(Confidence::VeryHigh.to_string(), "very high");
    }
}
