//! URL template substitution.
//!
//! A template names the tile it locates through placeholders. Three dialects
//! are understood and may be mixed:
//!
//! | meaning | brace form                          | percent form  |
//! |---------|-------------------------------------|---------------|
//! | level   | `{level}`, `{z}`, `{TileMatrix}`    | `%TILEMATRIX` |
//! | row     | `{row}`, `{y}`, `{TileRow}`         | `%ROW`        |
//! | column  | `{col}`, `{x}`, `{TileCol}`         | `%COL`        |
//!
//! Unknown brace placeholders are kept verbatim. For bottom-origin layers the
//! row is flipped (`2^level - 1 - row`) when substituted.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::config::Origin;
use crate::coord::TileAddress;

/// Template parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A required placeholder is absent
    #[error("URL template '{template}' has no {missing} placeholder")]
    MissingPlaceholder {
        template: String,
        missing: &'static str,
    },

    /// A brace was opened and never closed
    #[error("URL template '{0}' has an unterminated placeholder")]
    Unterminated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Level,
    Row,
    Col,
}

/// Parsed URL template.
///
/// # Example
///
/// ```
/// use tilestream::coord::{CrsId, TileAddress};
/// use tilestream::layer::{Origin, UrlTemplate};
///
/// let template: UrlTemplate = "https://t.example.com/{z}/{x}/{y}.png".parse().unwrap();
/// let address = TileAddress::new(3, 2, 5, CrsId::Epsg3857).unwrap();
///
/// assert_eq!(template.expand(&address, Origin::Top), "https://t.example.com/3/5/2.png");
/// assert_eq!(template.expand(&address, Origin::Bottom), "https://t.example.com/3/5/5.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parses a template, requiring level, row and column placeholders.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            if c == '{' {
                let end = rest
                    .find('}')
                    .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
                let name = &rest[1..end];
                match placeholder(name) {
                    Some(segment) => {
                        flush(&mut literal, &mut segments);
                        segments.push(segment);
                    }
                    None => literal.push_str(&rest[..=end]),
                }
                rest = &rest[end + 1..];
            } else if c == '%' {
                match percent_placeholder(rest) {
                    Some((segment, len)) => {
                        flush(&mut literal, &mut segments);
                        segments.push(segment);
                        rest = &rest[len..];
                    }
                    None => {
                        literal.push(c);
                        rest = &rest[1..];
                    }
                }
            } else {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        flush(&mut literal, &mut segments);

        for (segment, missing) in [
            (Segment::Level, "level"),
            (Segment::Row, "row"),
            (Segment::Col, "column"),
        ] {
            if !segments.contains(&segment) {
                return Err(TemplateError::MissingPlaceholder {
                    template: template.to_string(),
                    missing,
                });
            }
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Substitutes the address into the template.
    pub fn expand(&self, address: &TileAddress, origin: Origin) -> String {
        let row = match origin {
            Origin::Top => u64::from(address.row),
            Origin::Bottom => address
                .level_size()
                .saturating_sub(1)
                .saturating_sub(u64::from(address.row)),
        };

        let mut url = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Level => url.push_str(&address.level.to_string()),
                Segment::Row => url.push_str(&row.to_string()),
                Segment::Col => url.push_str(&address.col.to_string()),
            }
        }
        url
    }

    /// The template as originally written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for UrlTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn placeholder(name: &str) -> Option<Segment> {
    match name {
        "level" | "z" | "TileMatrix" => Some(Segment::Level),
        "row" | "y" | "TileRow" => Some(Segment::Row),
        "col" | "x" | "TileCol" => Some(Segment::Col),
        _ => None,
    }
}

fn percent_placeholder(text: &str) -> Option<(Segment, usize)> {
    // Longest token first: %TILEMATRIX must not be read as a literal.
    [
        ("%TILEMATRIX", Segment::Level),
        ("%ROW", Segment::Row),
        ("%COL", Segment::Col),
    ]
    .into_iter()
    .find(|(token, _)| text.starts_with(*token))
    .map(|(token, segment)| (segment, token.len()))
}
