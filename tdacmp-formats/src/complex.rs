//! Explicit filtered cell complex
//!
//! Binary layout (little endian, 8-byte words):
//!
//! ```text
//! magic | type tag (0) | matrix kind (0) | N | D
//! N dimension tags | N filtration values | N + 1 column offsets
//! offsets[N] boundary entries (vertex indices)
//! ```
//!
//! Cell `i` owns `entries[offsets[i]..offsets[i + 1]]`. Vertices have empty
//! boundaries, edges exactly two vertices, 2-cells at least three and 3-cells
//! at least four (polygonal and polyhedral cells are accepted).

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{FormatError, Result};
use crate::DIPHA_MAGIC;
use std::fmt::Write as _;
use std::ops::Range;

/// Type tag of an explicit complex file
pub const COMPLEX_FILE_TYPE: i64 = 0;

/// Matrix kind tag for boundary matrices
pub const BOUNDARY_MATRIX: i64 = 0;

/// Matrix kind tag for co-boundary matrices (recognised, not supported)
pub const COBOUNDARY_MATRIX: i64 = 1;

/// Highest supported cell dimension
pub const MAX_DIMENSION: usize = 3;

/// Borrowed view of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell<'a> {
    pub id: usize,
    pub dimension: usize,
    pub vertices: &'a [usize],
    pub value: f64,
}

/// Immutable filtered complex
#[derive(Debug, Clone, PartialEq)]
pub struct Complex {
    dimension: usize,
    dims: [usize; MAX_DIMENSION + 1],
    values: Vec<f64>,
    offsets: Vec<usize>,
    entries: Vec<usize>,
}

impl Complex {
    /// Decode the explicit-complex binary layout in a single forward scan
    pub fn decode(buf: &[u8]) -> Result<Complex> {
        let mut reader = ByteReader::new(buf);

        let magic = reader.read_i64("magic number")?;
        if magic != DIPHA_MAGIC {
            return Err(FormatError::BadMagic {
                found: magic,
                expected: DIPHA_MAGIC,
            });
        }
        let file_type = reader.read_i64("file type")?;
        if file_type != COMPLEX_FILE_TYPE {
            return Err(FormatError::UnexpectedFileType {
                found: file_type,
                expected: COMPLEX_FILE_TYPE,
            });
        }
        let matrix_kind = reader.read_i64("matrix kind")?;
        if matrix_kind != BOUNDARY_MATRIX {
            return Err(FormatError::UnsupportedMatrixKind(matrix_kind));
        }

        let cell_count = reader.read_count("cell count")?;
        let raw_dimension = reader.read_i64("global dimension")?;
        let dimension = usize::try_from(raw_dimension)
            .ok()
            .filter(|d| *d <= MAX_DIMENSION)
            .ok_or(FormatError::InvalidCount {
                field: "global dimension",
                value: raw_dimension,
            })?;

        let cell_dims = reader.read_i64_array(cell_count, "cell dimensions")?;
        let dims = count_dimensions(&cell_dims, dimension)?;
        let values = reader.read_f64_array(cell_count, "filtration values")?;

        let offset_count = cell_count.checked_add(1).ok_or(FormatError::InvalidCount {
            field: "cell count",
            value: i64::MAX,
        })?;
        let raw_offsets = reader.read_i64_array(offset_count, "boundary offsets")?;
        let offsets = check_offsets(&raw_offsets)?;
        let declared = offsets.last().copied().unwrap_or(0);

        let available = reader.remaining() / 8;
        if declared != available || reader.remaining() % 8 != 0 {
            return Err(FormatError::EntryCountMismatch {
                declared,
                available,
            });
        }
        let raw_entries = reader.read_i64_array(declared, "boundary entries")?;
        let mut entries = Vec::with_capacity(declared);
        for (cell, window) in offsets.windows(2).enumerate() {
            for &index in &raw_entries[window[0]..window[1]] {
                let vertex = usize::try_from(index)
                    .ok()
                    .filter(|v| *v < dims[0])
                    .ok_or(FormatError::BoundaryIndexOutOfRange {
                        cell,
                        index,
                        vertices: dims[0],
                    })?;
                entries.push(vertex);
            }
        }

        let complex = Complex {
            dimension,
            dims,
            values,
            offsets,
            entries,
        };
        complex.check_arities()?;
        Ok(complex)
    }

    /// Encode back into the explicit-complex binary layout
    pub fn encode(&self) -> Vec<u8> {
        let n = self.cell_count();
        let words = 5 + 3 * n + 1 + self.entries.len();
        let mut writer = ByteWriter::with_capacity(words * 8);
        writer.write_i64(DIPHA_MAGIC);
        writer.write_i64(COMPLEX_FILE_TYPE);
        writer.write_i64(BOUNDARY_MATRIX);
        writer.write_i64(n as i64);
        writer.write_i64(self.dimension as i64);
        for (dim, count) in self.dims.iter().enumerate() {
            for _ in 0..*count {
                writer.write_i64(dim as i64);
            }
        }
        for value in &self.values {
            writer.write_f64(*value);
        }
        for offset in &self.offsets {
            writer.write_i64(*offset as i64);
        }
        for entry in &self.entries {
            writer.write_i64(*entry as i64);
        }
        writer.into_inner()
    }

    fn check_arities(&self) -> Result<()> {
        for cell in self.cells() {
            let arity = cell.vertices.len();
            let ok = match cell.dimension {
                0 => arity == 0,
                1 => arity == 2,
                d => arity > d,
            };
            if !ok {
                return Err(FormatError::BoundaryArity {
                    cell: cell.id,
                    dimension: cell.dimension,
                    arity,
                });
            }
        }
        Ok(())
    }

    /// Global dimension D
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Cell counts for dimensions 0..=3
    pub fn dims(&self) -> [usize; MAX_DIMENSION + 1] {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.values.len()
    }

    /// Filtration values indexed by global cell id
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Column pointers of the boundary matrix (N + 1 entries)
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Global id range of the cells of dimension `dim`
    pub fn cells_of_dimension(&self, dim: usize) -> Range<usize> {
        if dim > MAX_DIMENSION {
            return self.cell_count()..self.cell_count();
        }
        let start: usize = self.dims[..dim].iter().sum();
        start..start + self.dims[dim]
    }

    /// Dimension of cell `id`
    pub fn cell_dimension(&self, id: usize) -> Option<usize> {
        if id >= self.cell_count() {
            return None;
        }
        let mut end = 0;
        for (dim, count) in self.dims.iter().enumerate() {
            end += count;
            if id < end {
                return Some(dim);
            }
        }
        None
    }

    pub fn cell(&self, id: usize) -> Option<Cell<'_>> {
        let dimension = self.cell_dimension(id)?;
        Some(Cell {
            id,
            dimension,
            vertices: &self.entries[self.offsets[id]..self.offsets[id + 1]],
            value: self.values[id],
        })
    }

    /// Cells in global id order
    pub fn cells(&self) -> impl Iterator<Item = Cell<'_>> + '_ {
        (0..=MAX_DIMENSION).flat_map(move |dim| {
            self.cells_of_dimension(dim).map(move |id| Cell {
                id,
                dimension: dim,
                vertices: &self.entries[self.offsets[id]..self.offsets[id + 1]],
                value: self.values[id],
            })
        })
    }

    /// First 2-cell or 3-cell that is not a triangle/tetrahedron
    pub fn first_non_simplex(&self) -> Option<Cell<'_>> {
        self.cells()
            .find(|c| c.dimension >= 2 && c.vertices.len() != c.dimension + 1)
    }

    /// Every 2-cell is a triangle and every 3-cell a tetrahedron
    pub fn is_simplicial(&self) -> bool {
        self.first_non_simplex().is_none()
    }

    /// Per-dimension counts and value ranges
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Number of cells: {}", self.cell_count());
        let _ = writeln!(out, "Global dataset dimension: {}", self.dimension);
        for dim in 0..=self.dimension {
            let range = self.cells_of_dimension(dim);
            let values = &self.values[range.clone()];
            let _ = write!(out, "  {} cells of dimension {}", range.len(), dim);
            if let Some((lo, hi)) = value_range(values) {
                let _ = write!(out, ", values in [{}, {}]", lo, hi);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "Non-null boundary matrix entries: {}", self.entries.len());
        let _ = write!(
            out,
            "Simplicial: {}",
            if self.is_simplicial() { "yes" } else { "no" }
        );
        out
    }
}

fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(values.iter().fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v))))
}

fn count_dimensions(cell_dims: &[i64], max: usize) -> Result<[usize; MAX_DIMENSION + 1]> {
    let mut dims = [0usize; MAX_DIMENSION + 1];
    let mut previous = 0usize;
    for (cell, &raw) in cell_dims.iter().enumerate() {
        let dimension = usize::try_from(raw)
            .ok()
            .filter(|d| *d <= max)
            .ok_or(FormatError::InvalidCellDimension {
                cell,
                dimension: raw,
                max,
            })?;
        if dimension < previous {
            return Err(FormatError::UnorderedCells {
                cell,
                dimension,
                previous,
            });
        }
        previous = dimension;
        dims[dimension] += 1;
    }
    Ok(dims)
}

fn check_offsets(raw: &[i64]) -> Result<Vec<usize>> {
    let mut offsets = Vec::with_capacity(raw.len());
    let mut previous = 0usize;
    for (column, &value) in raw.iter().enumerate() {
        let offset = usize::try_from(value)
            .ok()
            .filter(|o| *o >= previous && (column > 0 || *o == 0))
            .ok_or(FormatError::NonMonotonicOffsets { column })?;
        previous = offset;
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Incremental construction of a [`Complex`]
///
/// Vertices are numbered in insertion order. Higher cells may be added in any
/// order; `build` groups them by dimension, keeping insertion order within a
/// dimension.
#[derive(Debug, Default)]
pub struct ComplexBuilder {
    vertex_values: Vec<f64>,
    cells: Vec<(usize, Vec<usize>, f64)>,
}

impl ComplexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, returning its index
    pub fn add_vertex(&mut self, value: f64) -> usize {
        self.vertex_values.push(value);
        self.vertex_values.len() - 1
    }

    /// Add a cell of dimension 1..=3 bounded by `vertices`
    pub fn add_cell(&mut self, dimension: usize, vertices: &[usize], value: f64) -> &mut Self {
        self.cells.push((dimension, vertices.to_vec(), value));
        self
    }

    /// Validate and freeze
    pub fn build(self) -> Result<Complex> {
        let mut cells = self.cells;
        cells.sort_by_key(|(dim, _, _)| *dim);

        let vertex_count = self.vertex_values.len();
        let mut dims = [0usize; MAX_DIMENSION + 1];
        dims[0] = vertex_count;
        let mut values = self.vertex_values;
        let mut offsets = vec![0usize; vertex_count + 1];
        let mut entries = Vec::new();

        for (position, (dimension, vertices, value)) in cells.into_iter().enumerate() {
            let cell = vertex_count + position;
            if dimension == 0 || dimension > MAX_DIMENSION {
                return Err(FormatError::InvalidCellDimension {
                    cell,
                    dimension: dimension as i64,
                    max: MAX_DIMENSION,
                });
            }
            if let Some(&bad) = vertices.iter().find(|v| **v >= vertex_count) {
                return Err(FormatError::BoundaryIndexOutOfRange {
                    cell,
                    index: bad as i64,
                    vertices: vertex_count,
                });
            }
            dims[dimension] += 1;
            values.push(value);
            entries.extend_from_slice(&vertices);
            offsets.push(entries.len());
        }

        let dimension = (0..=MAX_DIMENSION).rev().find(|d| dims[*d] > 0).unwrap_or(0);
        let complex = Complex {
            dimension,
            dims,
            values,
            offsets,
            entries,
        };
        complex.check_arities()?;
        Ok(complex)
    }
}
