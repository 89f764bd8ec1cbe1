use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ProtocolError, ProtocolResult};

pub const ZSTD: &str = "ZSTD";
pub const GZIP: &str = "GZIP";
pub const NONE: &str = "NONE";

const ZSTD_LEVEL: i32 = 3;

/// Compression applied to every batch file.
pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> ProtocolResult<Vec<u8>>;

    /// Decompress, failing if the output would exceed `max_size` bytes.
    fn decompress(&self, data: &[u8], max_size: usize) -> ProtocolResult<Vec<u8>>;
}

/// zstd compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> &'static str {
        ZSTD
    }

    fn compress(&self, data: &[u8]) -> ProtocolResult<Vec<u8>> {
        zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| ProtocolError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], max_size: usize) -> ProtocolResult<Vec<u8>> {
        let decoder =
            zstd::Decoder::new(data).map_err(|e| ProtocolError::Compression(e.to_string()))?;
        read_bounded(decoder, max_size)
    }
}

/// gzip compression, as used by parameter sets written for other Sidetree
/// nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn algorithm(&self) -> &'static str {
        GZIP
    }

    fn compress(&self, data: &[u8]) -> ProtocolResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| ProtocolError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| ProtocolError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], max_size: usize) -> ProtocolResult<Vec<u8>> {
        read_bounded(GzDecoder::new(data), max_size)
    }
}

/// Read at most one byte past `max_size` so oversized output is detected
/// without inflating all of it.
fn read_bounded(decoder: impl Read, max_size: usize) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    decoder
        .take(max_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;
    if out.len() > max_size {
        return Err(ProtocolError::SizeExceeded {
            what: "decompressed file",
            size: out.len(),
            max: max_size,
        });
    }
    Ok(out)
}

/// Identity compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> &'static str {
        NONE
    }

    fn compress(&self, data: &[u8]) -> ProtocolResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], max_size: usize) -> ProtocolResult<Vec<u8>> {
        if data.len() > max_size {
            return Err(ProtocolError::SizeExceeded {
                what: "decompressed file",
                size: data.len(),
                max: max_size,
            });
        }
        Ok(data.to_vec())
    }
}

/// Compressor for a protocol's `compression_algorithm`.
pub fn compressor_for(algorithm: &str) -> ProtocolResult<Arc<dyn Compressor>> {
    match algorithm {
        ZSTD => Ok(Arc::new(ZstdCompressor)),
        GZIP => Ok(Arc::new(GzipCompressor)),
        NONE => Ok(Arc::new(NoopCompressor)),
        other => Err(ProtocolError::UnsupportedCompression(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_roundtrip() {
        let c = ZstdCompressor;
        let data = br#"{"deltas":["aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"]}"#.repeat(20);
        let packed = c.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn zstd_enforces_max_size() {
        let c = ZstdCompressor;
        let data = vec![0u8; 10_000];
        let packed = c.compress(&data).unwrap();
        assert!(matches!(
            c.decompress(&packed, 9_999),
            Err(ProtocolError::SizeExceeded { .. })
        ));
    }

    #[test]
    fn zstd_rejects_garbage() {
        assert!(ZstdCompressor.decompress(b"not zstd", 100).is_err());
    }

    #[test]
    fn gzip_roundtrip_and_bound() {
        let c = GzipCompressor;
        let data = br#"{"operations":{"create":[]}}"#.repeat(50);
        let packed = c.compress(&data).unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(c.decompress(&packed, data.len()).unwrap(), data);
        assert!(matches!(
            c.decompress(&packed, data.len() - 1),
            Err(ProtocolError::SizeExceeded { .. })
        ));
        assert!(c.decompress(b"not gzip", 100).is_err());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(compressor_for("ZSTD").unwrap().algorithm(), ZSTD);
        assert_eq!(compressor_for("GZIP").unwrap().algorithm(), GZIP);
        assert_eq!(compressor_for("NONE").unwrap().algorithm(), NONE);
        assert!(matches!(
            compressor_for("LZMA"),
            Err(ProtocolError::UnsupportedCompression(_))
        ));
    }
}
