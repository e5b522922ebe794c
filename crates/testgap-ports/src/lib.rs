//! Shared port traits for testgap's hexagonal architecture.
//!
//! Adapters implement these traits; the application crate is generic over
//! them so tests can substitute in-memory fakes.

use std::fmt::Display;

use testgap_domain::{CoverageCounterRecord, ParsedMethod};

/// Port for turning source text into method declarations.
pub trait SourceParser {
    type Error: Display;

    /// Parse one file. `path` is repo-relative and only used for reporting.
    ///
    /// Fails on source text that cannot be parsed without errors; a partial
    /// method set would hide coverage gaps.
    fn parse(&self, path: &str, source: &str) -> Result<Vec<ParsedMethod>, Self::Error>;

    /// Whether this parser handles `path` at all.
    fn accepts(&self, path: &str) -> bool;
}

/// Port for decoding one coverage report into counter records.
pub trait CoverageDecoder {
    type Error: Display;

    /// Decode a report document. Records are not merged.
    fn decode(&self, text: &str) -> Result<Vec<CoverageCounterRecord>, Self::Error>;
}

/// Port for obtaining the current UTC time.
pub trait Clock {
    /// Returns the current time in UTC.
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}
