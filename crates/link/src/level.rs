use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Battery charge percentage, or the `-1` sentinel when no reading exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BatteryLevel(i8);

impl BatteryLevel {
    /// No reading has been obtained yet.
    pub const UNKNOWN: Self = Self(-1);
    pub const MAX_PERCENT: u8 = 100;

    /// Build from a percentage. Returns `None` above 100.
    pub fn new(pct: u8) -> Option<Self> {
        (pct <= Self::MAX_PERCENT).then_some(Self(pct as i8))
    }

    /// The percentage, or `None` for the sentinel.
    pub fn percent(self) -> Option<u8> {
        u8::try_from(self.0).ok()
    }

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    /// Raw wire value in [-1, 100].
    pub fn as_i8(self) -> i8 {
        self.0
    }

    /// Parse a `/battery` response body. Surrounding whitespace is ignored.
    pub fn parse_body(body: &str) -> Result<Self, ParseLevelError> {
        let trimmed = body.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ParseLevelError::NotAnInteger(truncate(trimmed)))?;
        match value {
            -1 => Ok(Self::UNKNOWN),
            0..=100 => Ok(Self(value as i8)),
            other => Err(ParseLevelError::OutOfRange(other)),
        }
    }
}

impl Default for BatteryLevel {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatteryLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_body(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseLevelError {
    #[error("not an integer: {0:?}")]
    NotAnInteger(String),
    #[error("level {0} outside [-1, 100]")]
    OutOfRange(i64),
}

/// Keep error payloads short when a peer answers with a whole HTML page.
fn truncate(body: &str) -> String {
    const MAX_CHARS: usize = 32;
    body.chars().take(MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_default_and_prints_minus_one() {
        assert_eq!(BatteryLevel::default(), BatteryLevel::UNKNOWN);
        assert_eq!(BatteryLevel::UNKNOWN.to_string(), "-1");
        assert!(BatteryLevel::UNKNOWN.is_unknown());
        assert_eq!(BatteryLevel::UNKNOWN.percent(), None);
    }

    #[test]
    fn new_rejects_above_hundred() {
        assert_eq!(BatteryLevel::new(100).and_then(|l| l.percent()), Some(100));
        assert_eq!(BatteryLevel::new(0).and_then(|l| l.percent()), Some(0));
        assert!(BatteryLevel::new(101).is_none());
    }

    #[test]
    fn parse_accepts_full_range() {
        for pct in 0..=100u8 {
            let level = BatteryLevel::parse_body(&pct.to_string()).unwrap();
            assert_eq!(level.percent(), Some(pct));
        }
        assert_eq!(BatteryLevel::parse_body("-1").unwrap(), BatteryLevel::UNKNOWN);
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(BatteryLevel::parse_body(" 42\n").unwrap().percent(), Some(42));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            BatteryLevel::parse_body("abc"),
            Err(ParseLevelError::NotAnInteger(_))
        ));
        assert!(matches!(
            BatteryLevel::parse_body(""),
            Err(ParseLevelError::NotAnInteger(_))
        ));
        assert!(matches!(
            BatteryLevel::parse_body("42.5"),
            Err(ParseLevelError::NotAnInteger(_))
        ));
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert_eq!(
            BatteryLevel::parse_body("150"),
            Err(ParseLevelError::OutOfRange(150))
        );
        assert_eq!(
            BatteryLevel::parse_body("-5"),
            Err(ParseLevelError::OutOfRange(-5))
        );
    }

    #[test]
    fn long_garbage_is_truncated_in_error() {
        let body = "x".repeat(500);
        match BatteryLevel::parse_body(&body) {
            Err(ParseLevelError::NotAnInteger(snippet)) => assert_eq!(snippet.len(), 32),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
