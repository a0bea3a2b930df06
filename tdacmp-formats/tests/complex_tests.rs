//! Explicit complex decoding tests
//!
//! The fixture is a 2-D polygonal complex: a triangle ABE, a quadrangle BCIE,
//! a pentagon BCFGH and a hexagon EIDKJL over twelve vertices A..L with
//! values 0..11.

use tdacmp_formats::bytes::ByteWriter;
use tdacmp_formats::{complex_to_sparse_csv, encode_complex, Complex, FormatError, DIPHA_MAGIC};

const EDGES: [[i64; 2]; 15] = [
    [0, 1],
    [0, 4],
    [1, 4],
    [4, 8],
    [1, 2],
    [2, 8],
    [2, 5],
    [5, 6],
    [6, 7],
    [1, 7],
    [3, 8],
    [3, 10],
    [9, 10],
    [9, 11],
    [4, 11],
];
const EDGE_VALUES: [f64; 15] = [1., 4., 4., 8., 2., 8., 5., 6., 7., 7., 8., 10., 10., 11., 11.];
const FACE_VALUES: [f64; 4] = [4., 8., 7., 11.];

fn faces() -> Vec<Vec<i64>> {
    vec![
        vec![0, 1, 4],
        vec![1, 2, 8, 4],
        vec![1, 2, 5, 6, 7],
        vec![4, 8, 3, 10, 9, 11],
    ]
}

struct Fixture {
    magic: i64,
    file_type: i64,
    matrix_kind: i64,
    global_dim: i64,
    entries: Vec<i64>,
    offsets_override: Option<Vec<i64>>,
}

impl Default for Fixture {
    fn default() -> Self {
        let mut entries: Vec<i64> = EDGES.iter().flatten().copied().collect();
        entries.extend(faces().into_iter().flatten());
        Self {
            magic: DIPHA_MAGIC,
            file_type: 0,
            matrix_kind: 0,
            global_dim: 2,
            entries,
            offsets_override: None,
        }
    }
}

impl Fixture {
    fn offsets(&self) -> Vec<i64> {
        if let Some(o) = &self.offsets_override {
            return o.clone();
        }
        let mut offsets = vec![0i64; 12];
        let mut off = 0;
        for _ in 0..15 {
            offsets.push(off);
            off += 2;
        }
        for face in faces() {
            offsets.push(off);
            off += face.len() as i64;
        }
        offsets.push(off);
        offsets
    }

    fn bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.write_i64(self.magic);
        w.write_i64(self.file_type);
        w.write_i64(self.matrix_kind);
        w.write_i64(31);
        w.write_i64(self.global_dim);
        for (dim, count) in [(0, 12), (1, 15), (2, 4)] {
            for _ in 0..count {
                w.write_i64(dim);
            }
        }
        for v in 0..12 {
            w.write_f64(v as f64);
        }
        for v in EDGE_VALUES.iter().chain(FACE_VALUES.iter()) {
            w.write_f64(*v);
        }
        for o in self.offsets() {
            w.write_i64(o);
        }
        for e in &self.entries {
            w.write_i64(*e);
        }
        w.into_inner()
    }
}

// =============================================================================
// Well-formed input
// =============================================================================

#[test]
fn test_polygonal_complex_decodes() {
    let complex = Complex::decode(&Fixture::default().bytes()).unwrap();

    assert_eq!(complex.dims(), [12, 15, 4, 0]);
    assert_eq!(complex.dimension(), 2);
    assert_eq!(complex.cell_count(), 31);

    let first_edge = complex.cell(12).unwrap();
    assert_eq!(first_edge.dimension, 1);
    assert_eq!(first_edge.vertices, &[0, 1]);
    assert_eq!(first_edge.value, 1.0);

    let arities: Vec<usize> = complex
        .cells_of_dimension(2)
        .map(|id| complex.cell(id).unwrap().vertices.len())
        .collect();
    assert_eq!(arities, vec![3, 4, 5, 6]);
    assert_eq!(complex.cell(30).unwrap().vertices, &[4, 8, 3, 10, 9, 11]);

    for vertex in complex.cells_of_dimension(0) {
        let cell = complex.cell(vertex).unwrap();
        assert!(cell.vertices.is_empty());
        assert_eq!(cell.value, vertex as f64);
    }
    assert!(!complex.is_simplicial());
}

#[test]
fn test_encode_reproduces_input_bytes() {
    let bytes = Fixture::default().bytes();
    let complex = Complex::decode(&bytes).unwrap();
    assert_eq!(encode_complex(&complex), bytes);
}

#[test]
fn test_describe_reports_counts() {
    let complex = Complex::decode(&Fixture::default().bytes()).unwrap();
    let text = complex.describe();
    assert!(text.contains("Number of cells: 31"));
    assert!(text.contains("12 cells of dimension 0, values in [0, 11]"));
    assert!(text.contains("4 cells of dimension 2, values in [4, 11]"));
    assert!(text.contains("Non-null boundary matrix entries: 48"));
}

#[test]
fn test_polygons_rejected_for_sparse_csv() {
    let complex = Complex::decode(&Fixture::default().bytes()).unwrap();
    assert!(matches!(
        complex_to_sparse_csv(&complex),
        Err(FormatError::NonSimplicial { cell: 28, arity: 4, .. })
    ));
}

// =============================================================================
// Malformed input
// =============================================================================

#[test]
fn test_bad_magic() {
    let fixture = Fixture {
        magic: 42,
        ..Fixture::default()
    };
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::BadMagic { found: 42, .. })
    ));
}

#[test]
fn test_diagram_file_is_not_a_complex() {
    let fixture = Fixture {
        file_type: 2,
        ..Fixture::default()
    };
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::UnexpectedFileType { found: 2, expected: 0 })
    ));
}

#[test]
fn test_coboundary_matrix_rejected() {
    let fixture = Fixture {
        matrix_kind: 1,
        ..Fixture::default()
    };
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::UnsupportedMatrixKind(1))
    ));
}

#[test]
fn test_cell_dimension_above_global_dimension() {
    let fixture = Fixture {
        global_dim: 1,
        ..Fixture::default()
    };
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::InvalidCellDimension { cell: 27, dimension: 2, max: 1 })
    ));
}

#[test]
fn test_truncated_entries() {
    let mut bytes = Fixture::default().bytes();
    bytes.truncate(bytes.len() - 8);
    assert!(matches!(
        Complex::decode(&bytes),
        Err(FormatError::EntryCountMismatch { declared: 48, available: 47 })
    ));
}

#[test]
fn test_truncated_header() {
    let bytes = Fixture::default().bytes();
    assert!(matches!(
        Complex::decode(&bytes[..20]),
        Err(FormatError::Truncated { what: "matrix kind", .. })
    ));
}

#[test]
fn test_vertex_index_out_of_range() {
    let mut fixture = Fixture::default();
    fixture.entries[1] = 12;
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::BoundaryIndexOutOfRange { cell: 12, index: 12, vertices: 12 })
    ));
}

#[test]
fn test_non_monotonic_offsets() {
    let mut fixture = Fixture::default();
    let mut offsets = fixture.offsets();
    offsets.swap(13, 14);
    fixture.offsets_override = Some(offsets);
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::NonMonotonicOffsets { column: 14 })
    ));
}

#[test]
fn test_edge_with_three_vertices() {
    let mut fixture = Fixture::default();
    let mut offsets = fixture.offsets();
    // first edge swallows one entry of the second
    offsets[13] = 3;
    fixture.offsets_override = Some(offsets);
    assert!(matches!(
        Complex::decode(&fixture.bytes()),
        Err(FormatError::BoundaryArity { cell: 12, dimension: 1, arity: 3 })
    ));
}
