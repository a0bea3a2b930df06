//! # tdacmp formats
//!
//! Decoders and encoders for filtered complexes and persistence diagrams.
//!
//! **Complexes:** explicit boundary-matrix binary files ([`Complex`]).
//!
//! **Diagrams:** magic-prefixed binary, legacy VTK mesh, Gudhi text and
//! Diamorse text, all decoded into the canonical [`Diagram`] after format
//! sniffing ([`DiagramFormat::sniff`]).

pub mod binary;
pub mod bytes;
pub mod complex;
pub mod convert;
pub mod diagram;
pub mod error;
pub mod format;
pub mod mesh;
pub mod text;

/// Magic number leading every binary complex and diagram file
pub const DIPHA_MAGIC: i64 = 8067171840;

pub use complex::{Cell, Complex, ComplexBuilder};
pub use convert::{complex_to_sparse_csv, diagram_from_cell_pairs, encode_complex};
pub use diagram::{dist_to_empty, Diagram, DiagramShape, DiagramSummary, Pair, PairType, PersistencePair};
pub use error::{FormatError, Result};
pub use format::{
    convert_diagram, decode_as, decode_diagram, encode_diagram, load_diagram, DecodeOptions,
    DiagramFormat,
};
pub use text::write_interchange;

/// Read and decode an explicit complex file
pub fn load_complex(path: &std::path::Path) -> Result<Complex> {
    let buf = std::fs::read(path)?;
    Complex::decode(&buf)
}
