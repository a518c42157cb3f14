//! Default save names built from a user date pattern.
//!
//! A pattern mixes literal text with date fields in braces, for example
//! `{dd}-{MMM}-{yyyy}-{HH}{mm}` renders as `05-Mar-2024-1407`. Field names
//! follow the familiar `yyyy`/`MM`/`dd` conventions and are translated to
//! chrono format specifiers.

use chrono::{DateTime, Local, Utc};
use thiserror::Error;

/// Errors in a date pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    #[error("unbalanced braces in date pattern")]
    UnbalancedBraces,

    #[error("empty {{}} in date pattern")]
    EmptyField,

    #[error("date pattern contains no {{...}} field")]
    NoFields,

    #[error("unknown date field {{{0}}}")]
    UnknownField(String),

    #[error("date field {{{0}}} must not repeat consecutively")]
    RepeatedField(String),
}

/// One piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternPart {
    Literal(String),
    /// A date field with its chrono specifier.
    Field {
        name: String,
        specifier: &'static str,
    },
}

/// A validated date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    parts: Vec<PatternPart>,
}

impl DatePattern {
    pub fn parts(&self) -> &[PatternPart] {
        &self.parts
    }

    /// The equivalent chrono format string.
    pub fn chrono_format(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                PatternPart::Literal(text) => text.replace('%', "%%"),
                PatternPart::Field { specifier, .. } => specifier.to_string(),
            })
            .collect()
    }

    /// Renders `now` in UTC or in the local time zone.
    pub fn render(&self, now: DateTime<Utc>, use_utc: bool) -> String {
        let format = self.chrono_format();
        if use_utc {
            now.format(&format).to_string()
        } else {
            now.with_timezone(&Local).format(&format).to_string()
        }
    }
}

fn field_specifier(name: &str) -> Option<&'static str> {
    Some(match name {
        "yyyy" => "%Y",
        "yy" => "%y",
        "MMMM" => "%B",
        "MMM" => "%b",
        "MM" => "%m",
        "M" => "%-m",
        "dd" => "%d",
        "d" => "%-d",
        "DDD" => "%j",
        "EEEE" => "%A",
        "EEE" | "E" => "%a",
        "HH" => "%H",
        "H" => "%-H",
        "hh" => "%I",
        "h" => "%-I",
        "mm" => "%M",
        "ss" => "%S",
        "a" => "%p",
        "Z" | "ZZZ" => "%z",
        _ => return None,
    })
}

/// Parses and validates a date pattern.
pub fn parse_date_pattern(pattern: &str) -> Result<DatePattern, DateFormatError> {
    let mut parts: Vec<PatternPart> = Vec::new();
    let mut literal = String::new();
    let mut field: Option<String> = None;

    for c in pattern.chars() {
        match c {
            '{' => {
                if field.is_some() {
                    return Err(DateFormatError::UnbalancedBraces);
                }
                if !literal.is_empty() {
                    parts.push(PatternPart::Literal(std::mem::take(&mut literal)));
                }
                field = Some(String::new());
            }
            '}' => {
                let name = field.take().ok_or(DateFormatError::UnbalancedBraces)?;
                if name.is_empty() {
                    return Err(DateFormatError::EmptyField);
                }
                if let Some(PatternPart::Field { name: previous, .. }) = parts.last() {
                    if *previous == name {
                        return Err(DateFormatError::RepeatedField(name));
                    }
                }
                let specifier = field_specifier(&name)
                    .ok_or_else(|| DateFormatError::UnknownField(name.clone()))?;
                parts.push(PatternPart::Field { name, specifier });
            }
            c => match field.as_mut() {
                Some(name) => name.push(c),
                None => literal.push(c),
            },
        }
    }

    if field.is_some() {
        return Err(DateFormatError::UnbalancedBraces);
    }
    if !literal.is_empty() {
        parts.push(PatternPart::Literal(literal));
    }
    if !parts.iter().any(|p| matches!(p, PatternPart::Field { .. })) {
        return Err(DateFormatError::NoFields);
    }
    Ok(DatePattern { parts })
}

/// Default file name (without extension) for a session saved at `now`.
pub fn default_filename(
    pattern: &str,
    now: DateTime<Utc>,
    use_utc: bool,
) -> Result<String, DateFormatError> {
    let rendered = parse_date_pattern(pattern)?.render(now, use_utc);
    // path separators would escape the files directory
    Ok(rendered.replace(['/', '\\'], "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_default_pattern() {
        let name = default_filename("{dd}-{MMM}-{yyyy}-{HH}{mm}", at(), true).unwrap();
        assert_eq!(name, "05-Mar-2024-1407");
    }

    #[test]
    fn test_literals_are_escaped() {
        let name = default_filename("track 100% {yyyy}{MM}{dd}", at(), true).unwrap();
        assert_eq!(name, "track 100% 20240305");
    }

    #[test]
    fn test_path_separators_replaced() {
        let name = default_filename("{dd}/{MM}/{yy}", at(), true).unwrap();
        assert_eq!(name, "05-03-24");
    }

    #[test]
    fn test_rejects_invalid_patterns() {
        assert_eq!(
            parse_date_pattern("{dd-{MM}"),
            Err(DateFormatError::UnbalancedBraces)
        );
        assert_eq!(parse_date_pattern("dd}"), Err(DateFormatError::UnbalancedBraces));
        assert_eq!(parse_date_pattern("{yyyy"), Err(DateFormatError::UnbalancedBraces));
        assert_eq!(parse_date_pattern("{}-{dd}"), Err(DateFormatError::EmptyField));
        assert_eq!(parse_date_pattern("plain"), Err(DateFormatError::NoFields));
        assert_eq!(
            parse_date_pattern("{HH}{HH}"),
            Err(DateFormatError::RepeatedField("HH".to_string()))
        );
        assert_eq!(
            parse_date_pattern("{qq}"),
            Err(DateFormatError::UnknownField("qq".to_string()))
        );
    }

    #[test]
    fn test_same_field_separated_by_literal_is_allowed() {
        assert!(parse_date_pattern("{HH}h{HH}").is_ok());
    }
}
