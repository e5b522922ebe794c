//! JaCoCo XML coverage decoder for testgap.
//!
//! This crate reads JaCoCo XML reports and produces one
//! [`CoverageCounterRecord`] per compiled method, carrying the method's
//! covered instruction count. Several reports are combined with
//! [`merge_reports`].

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;
use tracing::debug;

use testgap_domain::{CounterKey, CoverageCounterRecord, DomainError};
use testgap_ports::CoverageDecoder;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while decoding JaCoCo reports.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JacocoError {
    /// The document is well-formed XML but not a JaCoCo report.
    #[error("Invalid JaCoCo report: {0}")]
    InvalidFormat(String),

    /// The document is not well-formed XML.
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

// ============================================================================
// Decoding
// ============================================================================

/// Decoder for the JaCoCo XML report format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JacocoDecoder;

impl CoverageDecoder for JacocoDecoder {
    type Error = JacocoError;

    fn decode(&self, text: &str) -> Result<Vec<CoverageCounterRecord>, Self::Error> {
        parse_jacoco(text)
    }
}

/// A `<method>` element whose counters are still being read.
struct OpenMethod {
    name: String,
    descriptor: String,
    line: Option<u32>,
    covered: Option<u64>,
}

/// Parse a JaCoCo XML report into method counter records.
///
/// Only `INSTRUCTION` counters directly below `<method>` are read. A
/// method without such a counter counts as 0 covered. `<group>` nesting
/// is allowed at any depth.
///
/// # Examples
///
/// ```
/// use testgap_adapters_coverage::parse_jacoco;
///
/// let xml = r#"<report name="r"><package name="p"><class name="p/A">
///   <method name="run" desc="()V" line="3">
///     <counter type="INSTRUCTION" missed="1" covered="4"/>
///   </method>
/// </class></package></report>"#;
///
/// let records = parse_jacoco(xml).unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].declaring_type, "p/A");
/// assert_eq!(records[0].covered_instructions, 4);
/// ```
pub fn parse_jacoco(text: &str) -> Result<Vec<CoverageCounterRecord>, JacocoError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut class: Option<String> = None;
    let mut method: Option<OpenMethod> = None;
    let mut records = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| JacocoError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = element_name(e);
                let parent = stack.last().map(String::as_str);

                match (parent, name.as_str()) {
                    (None, "report") => seen_root = true,
                    (None, other) => {
                        return Err(JacocoError::InvalidFormat(format!(
                            "expected <report> root element, found <{}>",
                            other
                        )));
                    }
                    (_, "class") => {
                        if parent != Some("package") {
                            return Err(invalid("<class> outside <package>"));
                        }
                        class = Some(required_attr(e, "name", "class")?);
                    }
                    (_, "method") => {
                        if parent != Some("class") {
                            return Err(invalid("<method> outside <class>"));
                        }
                        let line = match optional_attr(e, "line")? {
                            Some(raw) => Some(parse_number::<u32>(&raw, "line")?),
                            None => None,
                        };
                        method = Some(OpenMethod {
                            name: required_attr(e, "name", "method")?,
                            descriptor: required_attr(e, "desc", "method")?,
                            line,
                            covered: None,
                        });
                    }
                    (Some("method"), "counter") => {
                        if optional_attr(e, "type")?.as_deref() == Some("INSTRUCTION") {
                            let covered = required_attr(e, "covered", "counter")?;
                            let covered = parse_number::<u64>(&covered, "covered")?;
                            let missed = required_attr(e, "missed", "counter")?;
                            parse_number::<u64>(&missed, "missed")?;
                            if let Some(open) = method.as_mut() {
                                open.covered = Some(covered);
                            }
                        }
                    }
                    _ => {}
                }

                if is_empty {
                    close_element(&name, &mut class, &mut method, &mut records)?;
                } else {
                    stack.push(name);
                }
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.pop();
                close_element(&name, &mut class, &mut method, &mut records)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(invalid("document has no <report> element"));
    }
    if !stack.is_empty() {
        return Err(invalid("document ends inside an open element"));
    }

    debug!(methods = records.len(), "decoded JaCoCo report");
    Ok(records)
}

fn close_element(
    name: &str,
    class: &mut Option<String>,
    method: &mut Option<OpenMethod>,
    records: &mut Vec<CoverageCounterRecord>,
) -> Result<(), JacocoError> {
    match name {
        "method" => {
            let open = method
                .take()
                .ok_or_else(|| invalid("unbalanced </method>"))?;
            let declaring_type = class
                .clone()
                .ok_or_else(|| invalid("<method> outside <class>"))?;
            records.push(CoverageCounterRecord {
                declaring_type,
                name: open.name,
                descriptor: open.descriptor,
                line: open.line,
                covered_instructions: open.covered.unwrap_or(0),
            });
        }
        "class" => *class = None,
        _ => {}
    }
    Ok(())
}

fn invalid(message: &str) -> JacocoError {
    JacocoError::InvalidFormat(message.to_string())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn optional_attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, JacocoError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| JacocoError::InvalidFormat(err.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| JacocoError::InvalidFormat(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(e: &BytesStart<'_>, key: &str, element: &str) -> Result<String, JacocoError> {
    optional_attr(e, key)?.ok_or_else(|| {
        JacocoError::InvalidFormat(format!("<{}> is missing attribute `{}`", element, key))
    })
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, JacocoError> {
    raw.trim().parse().map_err(|_| {
        JacocoError::InvalidFormat(format!("`{}` is not a valid {} value", raw, what))
    })
}

// ============================================================================
// Merging
// ============================================================================

/// Merge several decoded reports, summing records of the same method.
///
/// The result is ordered by counter key.
pub fn merge_reports(
    reports: Vec<Vec<CoverageCounterRecord>>,
) -> Result<Vec<CoverageCounterRecord>, DomainError> {
    let mut by_key: BTreeMap<CounterKey, Vec<CoverageCounterRecord>> = BTreeMap::new();
    for record in reports.into_iter().flatten() {
        by_key.entry(record.key()).or_default().push(record);
    }
    by_key
        .into_values()
        .map(CoverageCounterRecord::merge)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Integration Tests (with actual fixture files)
// ============================================================================
