//! Complex re-encoding and diagram reconstruction from cell pairs

use crate::complex::Complex;
use crate::diagram::{Diagram, Pair};
use crate::error::{FormatError, Result};
use crate::format::{route_pair, DecodeOptions};

/// Explicit-complex binary layout
pub fn encode_complex(complex: &Complex) -> Vec<u8> {
    complex.encode()
}

/// Sparse-column CSV of the vertex boundary matrix
///
/// Four lines: cell counts for dimensions `0..=D`, filtration values, 1-based
/// row indices (sorted within each column) and 1-based column pointers.
pub fn complex_to_sparse_csv(complex: &Complex) -> Result<String> {
    if let Some(cell) = complex.first_non_simplex() {
        return Err(FormatError::NonSimplicial {
            cell: cell.id,
            dimension: cell.dimension,
            arity: cell.vertices.len(),
        });
    }

    let dims = complex.dims();
    let counts: Vec<String> = dims[..=complex.dimension()]
        .iter()
        .map(ToString::to_string)
        .collect();
    let values: Vec<String> = complex.values().iter().map(ToString::to_string).collect();

    let mut rows = Vec::new();
    for cell in complex.cells() {
        let mut column = cell.vertices.to_vec();
        column.sort_unstable();
        rows.extend(column.into_iter().map(|v| (v + 1).to_string()));
    }
    let pointers: Vec<String> = complex
        .offsets()
        .iter()
        .map(|o| (o + 1).to_string())
        .collect();

    Ok(format!(
        "{}\n{}\n{}\n{}\n",
        counts.join(","),
        values.join(","),
        rows.join(","),
        pointers.join(",")
    ))
}

/// Diagram from `(birth cell, death cell)` index pairs
///
/// The pair type is the dimension of the birth cell; a missing death cell
/// means the class never dies. Pairs whose birth and death values coincide
/// are dropped.
pub fn diagram_from_cell_pairs(complex: &Complex, pairs: &[(usize, Option<usize>)]) -> Result<Diagram> {
    let cells = complex.cell_count();
    let lookup = |id: usize| {
        complex
            .cell(id)
            .ok_or(FormatError::CellOutOfRange { cell: id, cells })
    };

    let mut diagram = Diagram::new();
    for (record, &(birth_cell, death_cell)) in pairs.iter().enumerate() {
        let birth = lookup(birth_cell)?;
        let death = match death_cell {
            Some(id) => lookup(id)?.value,
            None => f64::INFINITY,
        };
        if birth.value == death {
            continue;
        }
        route_pair(
            &mut diagram,
            &DecodeOptions::default(),
            record,
            birth.dimension as i64,
            Pair::new(birth.value, death),
        )?;
    }
    diagram.sort();
    Ok(diagram)
}
