//! Binary persistence diagram
//!
//! `magic | type tag (2) | pair count | (tag i64, birth f64, death f64) * count`

use crate::bytes::{ByteReader, ByteWriter};
use crate::diagram::{Diagram, Pair};
use crate::error::{FormatError, Result};
use crate::format::{route_pair, DecodeOptions, DIAGONAL_TAG};
use crate::DIPHA_MAGIC;

/// Type tag of a persistence diagram file
pub const DIAGRAM_FILE_TYPE: i64 = 2;

const RECORD_BYTES: usize = 24;

pub(crate) fn decode(buf: &[u8], options: &DecodeOptions) -> Result<Diagram> {
    let mut reader = ByteReader::new(buf);

    let magic = reader.read_i64("magic number")?;
    if magic != DIPHA_MAGIC {
        return Err(FormatError::BadMagic {
            found: magic,
            expected: DIPHA_MAGIC,
        });
    }
    let file_type = reader.read_i64("file type")?;
    if file_type != DIAGRAM_FILE_TYPE {
        return Err(FormatError::UnexpectedFileType {
            found: file_type,
            expected: DIAGRAM_FILE_TYPE,
        });
    }
    let count = reader.read_count("pair count")?;
    let needed = count.saturating_mul(RECORD_BYTES);
    if needed > reader.remaining() {
        return Err(FormatError::Truncated {
            what: "pair records",
            offset: reader.position(),
            needed,
            available: reader.remaining(),
        });
    }

    let mut diagram = Diagram::new();
    for record in 0..count {
        let tag = reader.read_i64("pair type")?;
        let birth = reader.read_f64("birth")?;
        let death = reader.read_f64("death")?;
        route_pair(&mut diagram, options, record, tag, Pair::new(birth, death))?;
    }
    diagram.sort();
    Ok(diagram)
}

pub(crate) fn encode(diagram: &Diagram) -> Vec<u8> {
    let count = diagram.len() + diagram.diagonal().len();
    let mut writer = ByteWriter::with_capacity(24 + count * RECORD_BYTES);
    writer.write_i64(DIPHA_MAGIC);
    writer.write_i64(DIAGRAM_FILE_TYPE);
    writer.write_i64(count as i64);
    for pair in diagram.persistence_pairs() {
        writer.write_i64(pair.dimension as i64);
        writer.write_f64(pair.birth);
        writer.write_f64(pair.death);
    }
    for pair in diagram.diagonal() {
        writer.write_i64(DIAGONAL_TAG);
        writer.write_f64(pair.birth);
        writer.write_f64(pair.death);
    }
    writer.into_inner()
}
