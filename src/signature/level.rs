use std::fmt;
use std::str::FromStr;

use super::errors::DocumentError;

/// Baseline signature levels, in increasing order of assurance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureLevel {
    /// Basic signature
    B,
    /// With a signature time-stamp
    T,
    /// With embedded validation data
    LT,
    /// With an archive time-stamp over the validation data
    LTA,
}

impl SignatureLevel {
    pub const ALL: [SignatureLevel; 4] = [
        SignatureLevel::B,
        SignatureLevel::T,
        SignatureLevel::LT,
        SignatureLevel::LTA,
    ];

    fn suffix(self) -> &'static str {
        match self {
            SignatureLevel::B => "B",
            SignatureLevel::T => "T",
            SignatureLevel::LT => "LT",
            SignatureLevel::LTA => "LTA",
        }
    }
}

impl fmt::Display for SignatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BASELINE-{}", self.suffix())
    }
}

impl FromStr for SignatureLevel {
    type Err = DocumentError;

    /// Accepts `BASELINE-LT` as well as the bare `LT`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let suffix = upper.strip_prefix("BASELINE-").unwrap_or(&upper);
        Self::ALL
            .into_iter()
            .find(|level| level.suffix() == suffix)
            .ok_or_else(|| DocumentError::Unsupported(format!("signature level {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(SignatureLevel::B < SignatureLevel::T);
        assert!(SignatureLevel::T < SignatureLevel::LT);
        assert!(SignatureLevel::LT < SignatureLevel::LTA);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("BASELINE-LT".parse::<SignatureLevel>().unwrap(), SignatureLevel::LT);
        assert_eq!("lta".parse::<SignatureLevel>().unwrap(), SignatureLevel::LTA);
        assert_eq!(SignatureLevel::T.to_string(), "BASELINE-T");
        assert!("BASELINE-X".parse::<SignatureLevel>().is_err());
    }
}
