//! Record codec
//!
//! Self-delimiting binary framing for key/value records. Streaming decode
//! reports the exact number of bytes consumed so callers can track file
//! offsets while scanning a log.

use std::io::Read;

use crate::error::{RelayError, Result};

/// Fixed header size: key length (4) + value length (4) + CRC32 (4)
pub const HEADER_SIZE: usize = 12;

/// Maximum combined key + value size (16 MB)
///
/// A length prefix above this limit is treated as corruption rather than an
/// allocation request.
pub const MAX_RECORD_SIZE: u32 = 16 * 1024 * 1024;

/// A single key/value record
///
/// ## On-Disk Format
/// ```text
/// ┌────────────┬────────────┬──────────┬─────────┬───────────┐
/// │ key_len(4) │ val_len(4) │ crc32(4) │ key (K) │ value (V) │
/// └────────────┴────────────┴──────────┴─────────┴───────────┘
/// ```
/// All integers are little-endian. The CRC32 covers key bytes followed by
/// value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    /// Create a new record
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Encode the record to a buffer
    pub fn encode(&self) -> Vec<u8> {
        let key = self.key.as_bytes();
        let value = self.value.as_bytes();

        let mut crc = crc32fast::Hasher::new();
        crc.update(key);
        crc.update(value);
        let checksum = crc.finalize();

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);

        buf
    }

    /// Decode one record from a reader
    ///
    /// Returns `Ok(None)` on a clean end of stream (EOF before any header
    /// byte). A partially-read header or truncated body means the file was
    /// cut mid-record and is reported as corruption, as is a checksum
    /// mismatch. On success, returns the record and the number of bytes
    /// consumed.
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Option<(Record, usize)>> {
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;

        while filled < HEADER_SIZE {
            let n = reader.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(RelayError::Corruption(format!(
                    "truncated record header: {} of {} bytes",
                    filled, HEADER_SIZE
                )));
            }
            filled += n;
        }

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let expected_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        if key_len.saturating_add(val_len) > MAX_RECORD_SIZE {
            return Err(RelayError::Corruption(format!(
                "record size {} exceeds limit {}",
                key_len as u64 + val_len as u64,
                MAX_RECORD_SIZE
            )));
        }

        let mut body = vec![0u8; (key_len + val_len) as usize];
        reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RelayError::Corruption("truncated record body".to_string())
            } else {
                RelayError::Io(e)
            }
        })?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&body);
        let actual_crc = crc.finalize();
        if actual_crc != expected_crc {
            return Err(RelayError::Corruption(format!(
                "record checksum mismatch: expected {:#010x}, got {:#010x}",
                expected_crc, actual_crc
            )));
        }

        let value_bytes = body.split_off(key_len as usize);
        let key = String::from_utf8(body)
            .map_err(|_| RelayError::Corruption("record key is not valid UTF-8".to_string()))?;
        let value = String::from_utf8(value_bytes)
            .map_err(|_| RelayError::Corruption("record value is not valid UTF-8".to_string()))?;

        let consumed = HEADER_SIZE + key_len as usize + val_len as usize;
        Ok(Some((Record { key, value }, consumed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_roundtrip() {
        let record = Record::new("key1", "value1");
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encoded_len());

        let mut cursor = Cursor::new(encoded);
        let (decoded, consumed) = Record::decode_from(&mut cursor).unwrap().unwrap();

        assert_eq!(decoded, record);
        assert_eq!(consumed, record.encoded_len());
    }

    #[test]
    fn test_decode_stream_of_records() {
        let records = vec![
            Record::new("a", "1"),
            Record::new("bb", "22"),
            Record::new("ccc", ""),
        ];

        let mut bytes = Vec::new();
        for record in &records {
            bytes.extend_from_slice(&record.encode());
        }

        let mut cursor = Cursor::new(bytes);
        let mut decoded = Vec::new();
        while let Some((record, _)) = Record::decode_from(&mut cursor).unwrap() {
            decoded.push(record);
        }

        assert_eq!(decoded, records);
    }

    #[test]
    fn test_clean_eof() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(Record::decode_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_partial_header_is_corruption() {
        let encoded = Record::new("key", "value").encode();
        let mut cursor = Cursor::new(encoded[..HEADER_SIZE - 3].to_vec());

        let err = Record::decode_from(&mut cursor).unwrap_err();
        assert!(matches!(err, RelayError::Corruption(_)));
    }

    #[test]
    fn test_truncated_body_is_corruption() {
        let encoded = Record::new("key", "value").encode();
        let mut cursor = Cursor::new(encoded[..encoded.len() - 2].to_vec());

        let err = Record::decode_from(&mut cursor).unwrap_err();
        assert!(matches!(err, RelayError::Corruption(_)));
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let mut encoded = Record::new("key", "value").encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;

        let mut cursor = Cursor::new(encoded);
        let err = Record::decode_from(&mut cursor).unwrap_err();
        assert!(matches!(err, RelayError::Corruption(_)));
    }

    #[test]
    fn test_empty_key_and_value() {
        let record = Record::new("", "");
        let mut cursor = Cursor::new(record.encode());

        let (decoded, consumed) = Record::decode_from(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, HEADER_SIZE);
    }

    #[test]
    fn test_oversized_length_prefix_is_corruption() {
        let mut header = Vec::new();
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());

        let mut cursor = Cursor::new(header);
        let err = Record::decode_from(&mut cursor).unwrap_err();
        assert!(matches!(err, RelayError::Corruption(_)));
    }
}
