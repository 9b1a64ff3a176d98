//! Status codes, timestamps, data values and diagnostics

use serde::{Deserialize, Serialize};

use super::Variant;

/// A 32-bit OPC UA status code. The top two bits carry the severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0);
    pub const UNCERTAIN: StatusCode = StatusCode(0x4000_0000);
    pub const BAD: StatusCode = StatusCode(0x8000_0000);

    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// Number of 100 ns ticks between 1601-01-01 and 1970-01-01.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// UTC timestamp in 100 ns ticks since 1601-01-01.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateTime(pub i64);

impl DateTime {
    pub const MIN: DateTime = DateTime(0);

    pub const fn from_ticks(ticks: i64) -> Self {
        DateTime(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub const fn from_unix_millis(millis: i64) -> Self {
        DateTime(UNIX_EPOCH_TICKS + millis * 10_000)
    }

    pub const fn unix_millis(self) -> i64 {
        (self.0 - UNIX_EPOCH_TICKS) / 10_000
    }
}

/// A value with its quality and source/server timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: DateTime,
    pub source_picoseconds: u16,
    pub server_timestamp: DateTime,
    pub server_picoseconds: u16,
}

impl DataValue {
    /// Wrap a bare value with good status and no timestamps.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self { value: value.into(), ..Self::default() }
    }

    /// Whether the value carries nothing beyond the bare value.
    pub fn is_raw(&self) -> bool {
        self.status == StatusCode::GOOD
            && self.source_timestamp == DateTime::MIN
            && self.source_picoseconds == 0
            && self.server_timestamp == DateTime::MIN
            && self.server_picoseconds == 0
    }
}

/// Vendor diagnostics attached to a failed operation, possibly nested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    pub symbolic_id: i32,
    pub namespace_uri: i32,
    pub locale: i32,
    pub localized_text: i32,
    pub additional_info: String,
    pub inner_status_code: StatusCode,
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl DiagnosticInfo {
    /// Number of diagnostics in the chain, counting this one.
    pub fn depth(&self) -> usize {
        1 + self.inner_diagnostic_info.as_ref().map_or(0, |inner| inner.depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::UNCERTAIN.is_good());
        assert!(!StatusCode::UNCERTAIN.is_bad());
        assert!(StatusCode(0x8034_0000).is_bad());
    }

    #[test]
    fn unix_conversion_round_trips() {
        let stamp = DateTime::from_unix_millis(1_700_000_000_123);
        assert_eq!(stamp.unix_millis(), 1_700_000_000_123);
        assert_eq!(DateTime::from_unix_millis(0).ticks(), UNIX_EPOCH_TICKS);
    }

    #[test]
    fn raw_data_values_have_no_metadata() {
        assert!(DataValue::new(5i32).is_raw());
        let mut value = DataValue::new(5i32);
        value.status = StatusCode::BAD;
        assert!(!value.is_raw());
    }

    #[test]
    fn diagnostic_depth_counts_chain() {
        let inner = DiagnosticInfo { symbolic_id: 2, ..Default::default() };
        let outer = DiagnosticInfo {
            symbolic_id: 1,
            inner_diagnostic_info: Some(Box::new(inner)),
            ..Default::default()
        };
        assert_eq!(outer.depth(), 2);
    }
}
