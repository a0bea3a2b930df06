//! Format detection and dispatch

use crate::binary;
use crate::bytes::peek_i64;
use crate::complex::COMPLEX_FILE_TYPE;
use crate::diagram::{Diagram, Pair, BUCKET_COUNT};
use crate::error::{FormatError, Result};
use crate::mesh::{self, MESH_SIGNATURE};
use crate::text;
use crate::DIPHA_MAGIC;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Pair-type tag of diagonal bookkeeping records
pub const DIAGONAL_TAG: i64 = -1;

/// Supported diagram encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// Magic-prefixed binary records
    Binary,
    /// Legacy VTK ASCII unstructured grid
    Mesh,
    /// `<dim> <birth> <death>` lines
    Gudhi,
    /// `#` header, `<birth> <death> <dim>` lines
    Diamorse,
}

impl DiagramFormat {
    pub const ALL: [DiagramFormat; 4] = [
        DiagramFormat::Binary,
        DiagramFormat::Mesh,
        DiagramFormat::Gudhi,
        DiagramFormat::Diamorse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramFormat::Binary => "binary",
            DiagramFormat::Mesh => "mesh",
            DiagramFormat::Gudhi => "gudhi",
            DiagramFormat::Diamorse => "diamorse",
        }
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            DiagramFormat::Binary => "dipha",
            DiagramFormat::Mesh => "vtk",
            DiagramFormat::Gudhi => "gudhi",
            DiagramFormat::Diamorse => "diamorse",
        }
    }

    /// Detect the format from leading content
    ///
    /// Anything that is neither magic-prefixed nor a VTK or `#`-headed file
    /// is read as Gudhi text, so an empty input is an empty Gudhi diagram.
    pub fn sniff(buf: &[u8]) -> Result<DiagramFormat> {
        if peek_i64(buf, 0) == Some(DIPHA_MAGIC) {
            return match peek_i64(buf, 8) {
                Some(binary::DIAGRAM_FILE_TYPE) => Ok(DiagramFormat::Binary),
                Some(COMPLEX_FILE_TYPE) => Err(FormatError::UnknownFormat(
                    "explicit complex, not a persistence diagram".into(),
                )),
                Some(found) => Err(FormatError::UnexpectedFileType {
                    found,
                    expected: binary::DIAGRAM_FILE_TYPE,
                }),
                None => Err(FormatError::Truncated {
                    what: "file type",
                    offset: 8,
                    needed: 8,
                    available: buf.len() - 8,
                }),
            };
        }
        let head = buf.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(buf);
        if head.starts_with(MESH_SIGNATURE.as_bytes()) {
            Ok(DiagramFormat::Mesh)
        } else if head.starts_with(b"#") {
            Ok(DiagramFormat::Diamorse)
        } else {
            Ok(DiagramFormat::Gudhi)
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "dipha" => Ok(DiagramFormat::Binary),
            "mesh" | "vtk" | "vtu" | "ttk" => Ok(DiagramFormat::Mesh),
            "gudhi" | "text" => Ok(DiagramFormat::Gudhi),
            "diamorse" => Ok(DiagramFormat::Diamorse),
            other => Err(FormatError::UnknownFormat(other.to_string())),
        }
    }
}

/// Decoder switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Keep tag -1 records in [`Diagram::diagonal`]
    pub keep_diagonal: bool,
    /// Drop pairs with a non-finite coordinate
    pub finite_only: bool,
}

impl DecodeOptions {
    pub fn keep_diagonal(mut self, keep: bool) -> Self {
        self.keep_diagonal = keep;
        self
    }

    pub fn finite_only(mut self, finite: bool) -> Self {
        self.finite_only = finite;
        self
    }
}

/// Route one decoded record into its bucket
pub(crate) fn route_pair(
    diagram: &mut Diagram,
    options: &DecodeOptions,
    record: usize,
    tag: i64,
    pair: Pair,
) -> Result<()> {
    if tag == DIAGONAL_TAG {
        if options.keep_diagonal {
            diagram.push_diagonal(pair);
        }
        return Ok(());
    }
    let bucket = usize::try_from(tag)
        .ok()
        .filter(|b| *b < BUCKET_COUNT)
        .ok_or(FormatError::InvalidPairType { record, tag })?;
    if options.finite_only && !pair.is_finite() {
        return Ok(());
    }
    diagram.push(bucket, pair);
    Ok(())
}

fn as_text(buf: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(buf)
        .map_err(|e| FormatError::UnknownFormat(format!("input is not UTF-8 text ({})", e)))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Decode with a known format
pub fn decode_as(buf: &[u8], format: DiagramFormat, options: &DecodeOptions) -> Result<Diagram> {
    match format {
        DiagramFormat::Binary => binary::decode(buf, options),
        DiagramFormat::Mesh => mesh::decode(as_text(buf)?, options),
        DiagramFormat::Gudhi => text::decode_gudhi(as_text(buf)?, options),
        DiagramFormat::Diamorse => text::decode_diamorse(as_text(buf)?, options),
    }
}

/// Sniff and decode
pub fn decode_diagram(buf: &[u8], options: &DecodeOptions) -> Result<Diagram> {
    let format = DiagramFormat::sniff(buf)?;
    decode_as(buf, format, options)
}

/// Read, sniff and decode a diagram file
pub fn load_diagram(path: &Path, options: &DecodeOptions) -> Result<Diagram> {
    let buf = std::fs::read(path)?;
    let format = DiagramFormat::sniff(&buf)?;
    let diagram = decode_as(&buf, format, options)?;
    debug!(
        path = %path.display(),
        format = %format,
        pairs = diagram.len(),
        "Decoded diagram"
    );
    Ok(diagram)
}

/// Serialise a diagram in the given format
pub fn encode_diagram(diagram: &Diagram, format: DiagramFormat) -> Vec<u8> {
    match format {
        DiagramFormat::Binary => binary::encode(diagram),
        DiagramFormat::Mesh => mesh::encode(diagram).into_bytes(),
        DiagramFormat::Gudhi => text::encode_gudhi(diagram).into_bytes(),
        DiagramFormat::Diamorse => text::encode_diamorse(diagram).into_bytes(),
    }
}

/// Sniff, decode and re-encode
pub fn convert_diagram(buf: &[u8], target: DiagramFormat, options: &DecodeOptions) -> Result<Vec<u8>> {
    let diagram = decode_diagram(buf, options)?;
    Ok(encode_diagram(&diagram, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteWriter;

    fn header(file_type: i64) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.write_i64(DIPHA_MAGIC);
        w.write_i64(file_type);
        w.write_i64(0);
        w.into_inner()
    }

    #[test]
    fn test_sniff() {
        assert_eq!(DiagramFormat::sniff(&header(2)).unwrap(), DiagramFormat::Binary);
        assert!(matches!(
            DiagramFormat::sniff(&header(0)),
            Err(FormatError::UnknownFormat(_))
        ));
        assert!(matches!(
            DiagramFormat::sniff(&header(7)),
            Err(FormatError::UnexpectedFileType { found: 7, expected: 2 })
        ));
        assert_eq!(
            DiagramFormat::sniff(b"# vtk DataFile Version 3.0\n").unwrap(),
            DiagramFormat::Mesh
        );
        assert_eq!(DiagramFormat::sniff(b"# birth death\n").unwrap(), DiagramFormat::Diamorse);
        assert_eq!(DiagramFormat::sniff(b"0 0 1\n").unwrap(), DiagramFormat::Gudhi);
        assert_eq!(DiagramFormat::sniff(b"").unwrap(), DiagramFormat::Gudhi);
    }

    #[test]
    fn test_empty_source_is_empty_diagram() {
        assert!(decode_diagram(b"", &DecodeOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_format_names() {
        assert_eq!("DIPHA".parse::<DiagramFormat>().unwrap(), DiagramFormat::Binary);
        assert_eq!("vtk".parse::<DiagramFormat>().unwrap(), DiagramFormat::Mesh);
        assert!("pdf".parse::<DiagramFormat>().is_err());
        for format in DiagramFormat::ALL {
            assert_eq!(format.as_str().parse::<DiagramFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_non_utf8_text_rejected() {
        assert!(matches!(
            decode_diagram(&[0xff, 0xfe, 0x00], &DecodeOptions::default()),
            Err(FormatError::UnknownFormat(_))
        ));
    }
}
