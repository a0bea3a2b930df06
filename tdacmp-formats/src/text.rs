//! Line-oriented diagram formats
//!
//! Gudhi: `<dimension> <birth> <death>` per line. Diamorse: `#` header, then
//! `<birth> <death> <dimension> ...` per line. Both use `inf` for an infinite
//! death, ignore blank lines and `#` comments.

use crate::diagram::{Diagram, Pair, BUCKET_COUNT};
use crate::error::{FormatError, Result};
use crate::format::{route_pair, DecodeOptions};
use std::fmt::Write as _;

#[derive(Clone, Copy)]
enum Columns {
    DimensionFirst,
    DimensionLast,
}

fn decode_lines(text: &str, options: &DecodeOptions, columns: Columns) -> Result<Diagram> {
    let mut diagram = Diagram::new();
    let mut record = 0;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = index + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(FormatError::Parse {
                line: number,
                message: format!("expected 3 fields, found {}", fields.len()),
            });
        }
        let (dim, birth, death) = match columns {
            Columns::DimensionFirst => (fields[0], fields[1], fields[2]),
            Columns::DimensionLast => (fields[2], fields[0], fields[1]),
        };
        let tag: i64 = dim.parse().map_err(|_| FormatError::Parse {
            line: number,
            message: format!("invalid dimension '{}'", dim),
        })?;
        if !(0..BUCKET_COUNT as i64).contains(&tag) {
            return Err(FormatError::InvalidPairType { record, tag });
        }
        let pair = Pair::new(parse_value(birth, number)?, parse_value(death, number)?);
        route_pair(&mut diagram, options, record, tag, pair)?;
        record += 1;
    }
    diagram.sort();
    Ok(diagram)
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    token.parse().map_err(|_| FormatError::Parse {
        line,
        message: format!("invalid value '{}'", token),
    })
}

pub(crate) fn decode_gudhi(text: &str, options: &DecodeOptions) -> Result<Diagram> {
    decode_lines(text, options, Columns::DimensionFirst)
}

pub(crate) fn decode_diamorse(text: &str, options: &DecodeOptions) -> Result<Diagram> {
    decode_lines(text, options, Columns::DimensionLast)
}

/// Gudhi lines; this is also the solver interchange format
pub fn encode_gudhi(diagram: &Diagram) -> String {
    let mut out = String::new();
    for p in diagram.persistence_pairs() {
        let _ = writeln!(out, "{} {} {}", p.dimension, p.birth, p.death);
    }
    out
}

pub(crate) fn encode_diamorse(diagram: &Diagram) -> String {
    let mut out = String::from("# birth death dimension\n");
    for p in diagram.persistence_pairs() {
        let _ = writeln!(out, "{} {} {}", p.birth, p.death, p.dimension);
    }
    out
}

/// Solver input: one `<dim> <birth> <death>` line per pair
pub fn write_interchange(diagram: &Diagram) -> String {
    encode_gudhi(diagram)
}
