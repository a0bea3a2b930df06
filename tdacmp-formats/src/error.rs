//! Decoding errors
//!
//! One variant per broken invariant so a corrupt or truncated input can be
//! diagnosed from the message alone.

use thiserror::Error;

/// Malformed, truncated or unrecognised diagram/complex input
#[derive(Debug, Error)]
pub enum FormatError {
    /// Fewer bytes remain than the layout requires
    #[error("Truncated input while reading {what}: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Leading magic number mismatch
    #[error("Bad magic number {found} (expected {expected})")]
    BadMagic { found: i64, expected: i64 },

    /// File type tag is not the one this decoder handles
    #[error("Unexpected file type tag {found} (expected {expected})")]
    UnexpectedFileType { found: i64, expected: i64 },

    /// Complex stored as anything but a boundary matrix
    #[error("Unsupported matrix kind {0} (only boundary matrices are supported)")]
    UnsupportedMatrixKind(i64),

    /// A count or dimension field is negative or too large
    #[error("Invalid {field}: {value}")]
    InvalidCount { field: &'static str, value: i64 },

    /// Per-cell dimension tag outside 0..=global dimension
    #[error("Cell {cell} has dimension {dimension}, outside 0..={max}")]
    InvalidCellDimension { cell: usize, dimension: i64, max: usize },

    /// Cells are not ordered by non-decreasing dimension
    #[error("Cell {cell} of dimension {dimension} follows a cell of dimension {previous}")]
    UnorderedCells { cell: usize, dimension: usize, previous: usize },

    /// Boundary offsets decrease or do not start at zero
    #[error("Boundary offset table is not monotonic at column {column}")]
    NonMonotonicOffsets { column: usize },

    /// Entry count from the offset table disagrees with the available bytes
    #[error("Boundary matrix declares {declared} entries but {available} are available")]
    EntryCountMismatch { declared: usize, available: usize },

    /// A cell's boundary has the wrong number of vertices
    #[error("Cell {cell} of dimension {dimension} has {arity} boundary vertices")]
    BoundaryArity { cell: usize, dimension: usize, arity: usize },

    /// A boundary entry does not name a vertex
    #[error("Cell {cell} references vertex {index}, but only {vertices} vertices exist")]
    BoundaryIndexOutOfRange { cell: usize, index: i64, vertices: usize },

    /// Operation requires triangles/tetrahedra only
    #[error("Cell {cell} of dimension {dimension} is not a simplex ({arity} vertices)")]
    NonSimplicial { cell: usize, dimension: usize, arity: usize },

    /// Cell id outside the complex
    #[error("Cell id {cell} out of range ({cells} cells)")]
    CellOutOfRange { cell: usize, cells: usize },

    /// Pair-type tag outside -1..=2
    #[error("Invalid pair type tag {tag} in record {record}")]
    InvalidPairType { record: usize, tag: i64 },

    /// Mesh point count inconsistent with the number of pair records
    #[error("Mesh has {points} points for {cells} pair records (expected {expected})")]
    PointCountMismatch { cells: usize, points: usize, expected: usize },

    /// Mesh record refers to a point that does not exist
    #[error("Mesh record {record} needs point {point}, but only {points} points exist")]
    PointOutOfRange { record: usize, point: usize, points: usize },

    /// Required mesh array absent
    #[error("Missing mesh array '{0}'")]
    MissingArray(&'static str),

    /// Text parse failure
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Nothing recognisable in the input
    #[error("Unrecognised diagram format: {0}")]
    UnknownFormat(String),

    /// File read failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for decoders
pub type Result<T> = std::result::Result<T, FormatError>;
