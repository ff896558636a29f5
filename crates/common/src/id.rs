//! ID generation utilities.

use std::fmt;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use ulid::Ulid;

static RMA_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^RMA-(\d{4})-(\d{6})$").expect("valid RMA pattern")
});

/// Largest serial that fits the six digit RMA suffix.
const MAX_RMA_SERIAL: u32 = 999_999;

/// A return merchandise authorization number, `RMA-<year>-<6 digits>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RmaNumber {
    year: i32,
    serial: u32,
}

impl RmaNumber {
    /// Build an RMA number from its parts.
    ///
    /// Returns `None` if the serial does not fit into six digits or the year
    /// is not a four digit year.
    #[must_use]
    pub const fn new(year: i32, serial: u32) -> Option<Self> {
        if serial > MAX_RMA_SERIAL || year < 1000 || year > 9999 {
            return None;
        }
        Some(Self { year, serial })
    }

    /// Parse an RMA number string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let caps = RMA_PATTERN.captures(value)?;
        let year = caps.get(1)?.as_str().parse().ok()?;
        let serial = caps.get(2)?.as_str().parse().ok()?;
        Self::new(year, serial)
    }

    /// Year component.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Six digit serial component.
    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }
}

impl fmt::Display for RmaNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RMA-{:04}-{:06}", self.year, self.serial)
    }
}

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a random RMA number for `year`.
    ///
    /// Uniqueness is not guaranteed; callers check the store and retry.
    #[must_use]
    pub fn generate_rma_number(&self, year: i32) -> RmaNumber {
        let serial = rand::thread_rng().gen_range(1..=MAX_RMA_SERIAL);
        RmaNumber {
            year: year.clamp(1000, 9999),
            serial,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_rma_number_format() {
        let id_gen = IdGenerator::new();
        for _ in 0..100 {
            let rma = id_gen.generate_rma_number(2025).to_string();
            assert_eq!(rma.len(), "RMA-2025-000000".len());
            assert!(rma.starts_with("RMA-2025-"));
            assert!(RmaNumber::parse(&rma).is_some());
        }
    }

    #[test]
    fn test_display_pads_serial() {
        let rma = RmaNumber::new(2025, 123).unwrap();
        assert_eq!(rma.to_string(), "RMA-2025-000123");
    }

    #[test]
    fn test_parse() {
        let rma = RmaNumber::parse("RMA-2025-000123").unwrap();
        assert_eq!(rma.year(), 2025);
        assert_eq!(rma.serial(), 123);

        assert!(RmaNumber::parse("RMA-2025-123").is_none());
        assert!(RmaNumber::parse("rma-2025-000123").is_none());
        assert!(RmaNumber::parse("RMA-2025-0001234").is_none());
        assert!(RmaNumber::parse("").is_none());
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(RmaNumber::new(2025, 1_000_000).is_none());
        assert!(RmaNumber::new(25, 1).is_none());
    }
}
