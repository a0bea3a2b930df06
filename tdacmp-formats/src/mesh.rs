//! Mesh-based diagram (legacy VTK ASCII unstructured grid)
//!
//! Each pair `i` is a line cell between two points; the pair's coordinate is
//! `(x, y)` of point `2i + 1`. The last cell is the diagonal, tagged `-1` in
//! the `PairType` cell array, and owns no point of its own, so a well-formed
//! mesh has `2 * cells - 2` points.
//!
//! Diagonal records only survive decoding when their point exists; the
//! synthesized diagonal cell written by [`encode`] never does.

use crate::diagram::{Diagram, Pair};
use crate::error::{FormatError, Result};
use crate::format::{route_pair, DecodeOptions, DIAGONAL_TAG};
use std::fmt::Write as _;

/// First-line signature
pub const MESH_SIGNATURE: &str = "# vtk DataFile";

const PAIR_TYPE_ARRAY: &str = "PairType";
const IS_FINITE_ARRAY: &str = "IsFinite";
const VTK_LINE: u8 = 3;

struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    peeked: Option<(usize, &'a str)>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(lines: impl Iterator<Item = (usize, &'a str)> + 'a) -> Self {
        let inner = lines.flat_map(|(n, line)| line.split_whitespace().map(move |t| (n, t)));
        Self {
            inner: Box::new(inner),
            peeked: None,
            last_line: 0,
        }
    }

    fn peek(&mut self) -> Option<&'a str> {
        if self.peeked.is_none() {
            self.peeked = self.inner.next();
        }
        self.peeked.map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.peeked.take().or_else(|| self.inner.next())?;
        self.last_line = token.0;
        Some(token.1)
    }

    fn error(&self, message: impl Into<String>) -> FormatError {
        FormatError::Parse {
            line: self.last_line,
            message: message.into(),
        }
    }

    fn expect(&mut self, what: &str) -> Result<&'a str> {
        self.next()
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {}", what)))
    }

    fn count(&mut self, what: &str) -> Result<usize> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {} '{}'", what, token)))
    }

    fn float(&mut self, what: &str) -> Result<f64> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {} '{}'", what, token)))
    }

    fn integer(&mut self, what: &str) -> Result<i64> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {} '{}'", what, token)))
    }

    fn skip(&mut self, n: usize, what: &str) -> Result<()> {
        for _ in 0..n {
            self.expect(what)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Cells(usize),
    Points(usize),
}

#[derive(Default)]
struct MeshArrays {
    points: Vec<f64>,
    cell_count: usize,
    pair_type: Option<Vec<i64>>,
    is_finite: Option<Vec<i64>>,
}

fn parse(text: &str) -> Result<MeshArrays> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
    match lines.next() {
        Some((_, first)) if first.starts_with(MESH_SIGNATURE) => {}
        _ => return Err(FormatError::UnknownFormat("missing VTK signature".into())),
    }
    // title line is free text
    lines.next();
    match lines.next() {
        Some((_, encoding)) if encoding.trim().eq_ignore_ascii_case("ASCII") => {}
        Some((_, encoding)) => {
            return Err(FormatError::UnknownFormat(format!(
                "unsupported VTK encoding '{}'",
                encoding.trim()
            )))
        }
        None => return Err(FormatError::UnknownFormat("truncated VTK header".into())),
    }

    let mut tokens = Tokens::new(lines);
    let mut arrays = MeshArrays::default();
    let mut section = Section::None;

    while let Some(keyword) = tokens.next() {
        match keyword.to_ascii_uppercase().as_str() {
            "DATASET" => {
                tokens.expect("dataset type")?;
            }
            "POINTS" => {
                let n = tokens.count("point count")?;
                tokens.expect("point data type")?;
                let mut points = Vec::with_capacity(n.min(1 << 20) * 3);
                for _ in 0..n.saturating_mul(3) {
                    points.push(tokens.float("point coordinate")?);
                }
                arrays.points = points;
            }
            "CELLS" => {
                tokens.count("cell count")?;
                let size = tokens.count("cell list size")?;
                tokens.skip(size, "cell connectivity")?;
            }
            "CELL_TYPES" => {
                let n = tokens.count("cell type count")?;
                tokens.skip(n, "cell type")?;
            }
            "CELL_DATA" => {
                let n = tokens.count("cell data count")?;
                arrays.cell_count = n;
                section = Section::Cells(n);
            }
            "POINT_DATA" => {
                section = Section::Points(tokens.count("point data count")?);
            }
            "SCALARS" => {
                let name = tokens.expect("array name")?;
                tokens.expect("array data type")?;
                let mut components = 1;
                if let Some(next) = tokens.peek() {
                    if let Ok(n) = next.parse::<usize>() {
                        tokens.next();
                        components = n;
                    }
                }
                if tokens.peek().map(|t| t.eq_ignore_ascii_case("LOOKUP_TABLE")) == Some(true) {
                    tokens.next();
                    tokens.expect("lookup table name")?;
                }
                read_array(&mut tokens, &mut arrays, section, name, components)?;
            }
            "FIELD" => {
                tokens.expect("field name")?;
                let n = tokens.count("field array count")?;
                for _ in 0..n {
                    let name = tokens.expect("array name")?;
                    let components = tokens.count("component count")?;
                    let tuples = tokens.count("tuple count")?;
                    tokens.expect("array data type")?;
                    let sized = match section {
                        Section::Cells(_) => Section::Cells(tuples),
                        _ => Section::Points(tuples),
                    };
                    read_array(&mut tokens, &mut arrays, sized, name, components)?;
                }
            }
            other => return Err(tokens.error(format!("unsupported keyword '{}'", other))),
        }
    }
    Ok(arrays)
}

fn read_array(
    tokens: &mut Tokens<'_>,
    arrays: &mut MeshArrays,
    section: Section,
    name: &str,
    components: usize,
) -> Result<()> {
    let tuples = match section {
        Section::Cells(n) | Section::Points(n) => n,
        Section::None => return Err(tokens.error(format!("array '{}' outside a data section", name))),
    };
    let total = tuples.saturating_mul(components);
    let wanted = matches!(section, Section::Cells(_))
        && (name == PAIR_TYPE_ARRAY || name == IS_FINITE_ARRAY);
    if !wanted {
        return tokens.skip(total, "array value");
    }
    let mut values = Vec::with_capacity(tuples.min(1 << 20));
    for i in 0..total {
        let v = tokens.integer(name)?;
        if i % components.max(1) == 0 {
            values.push(v);
        }
    }
    if name == PAIR_TYPE_ARRAY {
        arrays.pair_type = Some(values);
    } else {
        arrays.is_finite = Some(values);
    }
    Ok(())
}

pub(crate) fn decode(text: &str, options: &DecodeOptions) -> Result<Diagram> {
    let arrays = parse(text)?;
    let points = arrays.points.len() / 3;
    if points == 0 && arrays.cell_count == 0 {
        return Ok(Diagram::new());
    }
    let pair_type = arrays
        .pair_type
        .ok_or(FormatError::MissingArray(PAIR_TYPE_ARRAY))?;
    let cells = pair_type.len();
    let expected = (2 * cells).saturating_sub(2);
    if cells == 0 || expected != points {
        return Err(FormatError::PointCountMismatch {
            cells,
            points,
            expected,
        });
    }

    let mut diagram = Diagram::new();
    for (record, &tag) in pair_type.iter().enumerate() {
        let point = 2 * record + 1;
        let coordinate = arrays.points.get(point * 3..point * 3 + 2);
        if tag == DIAGONAL_TAG {
            if let Some(xy) = coordinate {
                if options.keep_diagonal {
                    diagram.push_diagonal(Pair::new(xy[0], xy[1]));
                }
            }
            continue;
        }
        let xy = coordinate.ok_or(FormatError::PointOutOfRange {
            record,
            point,
            points,
        })?;
        let finite = arrays
            .is_finite
            .as_ref()
            .and_then(|f| f.get(record))
            .map_or(true, |v| *v != 0);
        if options.finite_only && !finite {
            continue;
        }
        route_pair(&mut diagram, options, record, tag, Pair::new(xy[0], xy[1]))?;
    }
    diagram.sort();
    Ok(diagram)
}

pub(crate) fn encode(diagram: &Diagram) -> String {
    let pairs: Vec<_> = diagram.persistence_pairs().collect();
    let n = pairs.len();
    let mut out = String::new();
    out.push_str("# vtk DataFile Version 3.0\n");
    out.push_str("Persistence diagram\n");
    out.push_str("ASCII\n");
    out.push_str("DATASET UNSTRUCTURED_GRID\n");
    let _ = writeln!(out, "POINTS {} double", 2 * n);
    for p in &pairs {
        let _ = writeln!(out, "{} {} 0", p.birth, p.birth);
        let _ = writeln!(out, "{} {} 0", p.birth, p.death);
    }
    if n == 0 {
        out.push_str("CELLS 0 0\nCELL_TYPES 0\n");
        return out;
    }

    let cells = n + 1;
    let _ = writeln!(out, "CELLS {} {}", cells, 3 * cells);
    for i in 0..n {
        let _ = writeln!(out, "2 {} {}", 2 * i, 2 * i + 1);
    }
    let (low, high) = diagonal_endpoints(&pairs);
    let _ = writeln!(out, "2 {} {}", low, high);
    let _ = writeln!(out, "CELL_TYPES {}", cells);
    for _ in 0..cells {
        let _ = writeln!(out, "{}", VTK_LINE);
    }
    let _ = writeln!(out, "CELL_DATA {}", cells);
    let _ = writeln!(out, "SCALARS {} int 1", PAIR_TYPE_ARRAY);
    out.push_str("LOOKUP_TABLE default\n");
    for p in &pairs {
        let _ = writeln!(out, "{}", p.dimension);
    }
    let _ = writeln!(out, "{}", DIAGONAL_TAG);
    let _ = writeln!(out, "SCALARS {} int 1", IS_FINITE_ARRAY);
    out.push_str("LOOKUP_TABLE default\n");
    for p in &pairs {
        let _ = writeln!(out, "{}", u8::from(p.death.is_finite()));
    }
    out.push_str("1\n");
    out
}

/// Birth point of the earliest pair and death point of the latest
fn diagonal_endpoints(pairs: &[crate::diagram::PersistencePair]) -> (usize, usize) {
    let low = pairs
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.birth.total_cmp(&b.1.birth))
        .map_or(0, |(i, _)| 2 * i);
    let high = pairs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.death.is_finite())
        .max_by(|a, b| a.1.death.total_cmp(&b.1.death))
        .map_or(low, |(i, _)| 2 * i + 1);
    (low, high)
}
