use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::model::CompressionKind;

const GZIP_LEVEL: u32 = 6;
const ZSTD_LEVEL: i32 = 3;

pub fn compress(kind: CompressionKind, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
            encoder
                .write_all(data)
                .map_err(|e| Error::Compression(e.to_string()))?;
            encoder.finish().map_err(|e| Error::Compression(e.to_string()))
        }
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| Error::Compression(e.to_string()))
        }
    }
}

pub fn decompress(kind: CompressionKind, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::Compression(e.to_string()))?;
            Ok(out)
        }
        CompressionKind::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Compression(e.to_string())),
        CompressionKind::Zstd => {
            zstd::decode_all(data).map_err(|e| Error::Compression(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(kind: CompressionKind) {
        let data = b"CREATE TABLE widgets (id serial primary key);".repeat(50);
        let compressed = compress(kind, &data).unwrap();
        let decompressed = decompress(kind, &compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn none_round_trips() {
        round_trip(CompressionKind::None);
    }

    #[test]
    fn gzip_round_trips() {
        round_trip(CompressionKind::Gzip);
    }

    #[test]
    fn lz4_round_trips() {
        round_trip(CompressionKind::Lz4);
    }

    #[test]
    fn zstd_round_trips() {
        round_trip(CompressionKind::Zstd);
    }
}
