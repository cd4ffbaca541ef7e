use std::fmt;
use std::str::FromStr;

/// A byte count that parses from human-readable strings such as `"512"`, `"64kb"`,
/// `"50mb"` or `"1.5gb"`. Units are binary (1kb = 1024 bytes) and case-insensitive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

const UNITS: [(&str, u64); 9] = [
    ("tib", 1 << 40),
    ("gib", 1 << 30),
    ("mib", 1 << 20),
    ("kib", 1 << 10),
    ("tb", 1 << 40),
    ("gb", 1 << 30),
    ("mb", 1 << 20),
    ("kb", 1 << 10),
    ("b", 1),
];

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Panics on an invalid string; meant for compile-time constant defaults.
impl From<&str> for ByteSize {
    fn from(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|e| panic!("invalid byte size literal {value:?}: {e}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseByteSizeError(String);

impl fmt::Display for ParseByteSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse {:?} as a byte size", self.0)
    }
}

impl std::error::Error for ParseByteSizeError {}

impl FromStr for ByteSize {
    type Err = ParseByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let err = || ParseByteSizeError(s.to_string());

        let (number, multiplier) = UNITS
            .iter()
            .find_map(|(suffix, mult)| normalized.strip_suffix(suffix).map(|n| (n.trim(), *mult)))
            .unwrap_or((normalized.as_str(), 1));

        if number.is_empty() {
            return Err(err());
        }

        if let Ok(n) = number.parse::<u64>() {
            return n.checked_mul(multiplier).map(ByteSize).ok_or_else(err);
        }

        let n = number.parse::<f64>().map_err(|_| err())?;
        if !n.is_finite() || n < 0. {
            return Err(err());
        }
        let bytes = n * multiplier as f64;
        if bytes > u64::MAX as f64 {
            return Err(err());
        }
        Ok(ByteSize(bytes.round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (suffix, mult) in UNITS.iter().skip(4) {
            if *mult > 1 && self.0 >= *mult && self.0 % *mult == 0 {
                return write!(f, "{}{suffix}", self.0 / *mult);
            }
        }
        write!(f, "{}b", self.0)
    }
}
