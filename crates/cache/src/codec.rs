//! Snapshot encoding: JSON, optionally wrapped in gzip or zlib.
//!
//! The compression format is detected from magic bytes when decoding, so
//! entries written before a configuration change stay readable.

use crate::error::{ErrorKind, Result};
use crate::models::Snapshot;
use blockcache_config::Compression;
use blockcache_graph::BlockStructure;
use exn::ResultExt;
use flate2::Compression as Level;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use tracing::instrument;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Detect the compression of an encoded snapshot.
///
/// Uncompressed snapshots are JSON objects and always start with `{`, which
/// neither gzip nor zlib headers can.
pub fn detect(bytes: &[u8]) -> Compression {
    match bytes {
        [a, b, ..] if [*a, *b] == GZIP_MAGIC => Compression::Gzip,
        // RFC 1950: deflate method, and the header checksum makes the first
        // two bytes a multiple of 31.
        [cmf, flg, ..] if cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0 => {
            Compression::Zlib
        },
        _ => Compression::None,
    }
}

#[instrument(skip(structure), fields(root = %structure.root(), blocks = structure.len(), output_size))]
pub fn encode(structure: &BlockStructure, compression: Compression) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(&Snapshot::from(structure)).or_raise(|| ErrorKind::Serialize)?;
    let output = match compression {
        Compression::None => json,
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Level::default());
            encoder.write_all(&json).or_raise(|| ErrorKind::Compression)?;
            encoder.finish().or_raise(|| ErrorKind::Compression)?
        },
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
            encoder.write_all(&json).or_raise(|| ErrorKind::Compression)?;
            encoder.finish().or_raise(|| ErrorKind::Compression)?
        },
    };
    tracing::Span::current().record("output_size", output.len());
    Ok(output)
}

pub fn decode(bytes: &[u8]) -> Result<BlockStructure> {
    let mut json = Vec::new();
    let json = match detect(bytes) {
        Compression::None => bytes,
        Compression::Gzip => {
            GzDecoder::new(bytes).read_to_end(&mut json).or_raise(|| ErrorKind::InvalidData)?;
            json.as_slice()
        },
        Compression::Zlib => {
            ZlibDecoder::new(bytes).read_to_end(&mut json).or_raise(|| ErrorKind::InvalidData)?;
            json.as_slice()
        },
    };
    let snapshot: Snapshot = serde_json::from_slice(json).or_raise(|| ErrorKind::InvalidData)?;
    BlockStructure::try_from(snapshot)
}
