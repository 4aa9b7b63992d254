// Spool record BLOB: [version: u8][zlib(JSON payload)].
// Records written without the prefix (bare zlib stream) are read as legacy.

use crate::error::SpoolError;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

pub(super) const BLOB_VERSION: u8 = 1;

/// First byte of a zlib stream with the default 32K window.
const ZLIB_CMF: u8 = 0x78;

pub(super) fn encode(json: &[u8]) -> Result<Vec<u8>, SpoolError> {
    let mut encoder = ZlibEncoder::new(vec![BLOB_VERSION], Compression::default());
    encoder.write_all(json)?;
    Ok(encoder.finish()?)
}

pub(super) fn decode(bytes: &[u8]) -> Result<Vec<u8>, SpoolError> {
    let compressed = match bytes.first() {
        Some(&BLOB_VERSION) => &bytes[1..],
        Some(&ZLIB_CMF) => bytes,
        Some(&other) => return Err(SpoolError::Version(other)),
        None => return Ok(Vec::new()),
    };
    let mut out = Vec::new();
    ZlibDecoder::new(compressed).read_to_end(&mut out)?;
    Ok(out)
}
