//! Length-prefixed, checksummed frames for the file backend log.
//!
//! ```text
//! | len (4, LE) | crc32 (4, LE) | payload (len) |
//! ```

use crate::error::{StorageError, StorageResult};

/// Frame header size (length + checksum).
pub(crate) const HEADER_SIZE: usize = 8;

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let crc = data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    });
    !crc
}

/// Wraps a payload in a frame.
pub(crate) fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Frames read back from a log.
#[derive(Debug, Default)]
pub(crate) struct DecodedLog {
    /// Payloads of every complete frame, in order.
    pub payloads: Vec<Vec<u8>>,
    /// Length of the log prefix made of complete frames.
    pub valid_len: u64,
    /// True if the log ends with an incomplete frame.
    pub torn_tail: bool,
}

/// Splits a log into frame payloads.
///
/// An incomplete trailing frame (a write interrupted by a crash) is reported
/// through `torn_tail` rather than as an error. So is a final frame whose
/// checksum fails.
///
/// # Errors
///
/// Returns [`StorageError::Corrupted`] if a frame followed by further frames
/// fails its checksum.
pub(crate) fn decode_all(data: &[u8]) -> StorageResult<DecodedLog> {
    let mut log = DecodedLog::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let rest = &data[pos..];
        if rest.len() < HEADER_SIZE {
            log.torn_tail = true;
            break;
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let expected = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        if rest.len() < HEADER_SIZE + len {
            log.torn_tail = true;
            break;
        }

        let payload = &rest[HEADER_SIZE..HEADER_SIZE + len];
        let actual = crc32(payload);
        if actual != expected {
            // The header reached disk but the payload did not.
            if HEADER_SIZE + len == rest.len() {
                log.torn_tail = true;
                break;
            }
            return Err(StorageError::Corrupted(format!(
                "checksum mismatch at offset {pos}: expected {expected:08x}, got {actual:08x}"
            )));
        }

        log.payloads.push(payload.to_vec());
        pos += HEADER_SIZE + len;
        log.valid_len = pos as u64;
    }

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn decode_complete_frames() {
        let mut log = encode(b"first");
        log.extend(encode(b"second"));

        let decoded = decode_all(&log).unwrap();
        assert_eq!(decoded.payloads, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(decoded.valid_len, log.len() as u64);
        assert!(!decoded.torn_tail);
    }

    #[test]
    fn decode_reports_torn_tail() {
        let mut log = encode(b"kept");
        let valid = log.len();
        let partial = encode(b"interrupted");
        log.extend_from_slice(&partial[..partial.len() - 3]);

        let decoded = decode_all(&log).unwrap();
        assert_eq!(decoded.payloads.len(), 1);
        assert_eq!(decoded.valid_len, valid as u64);
        assert!(decoded.torn_tail);
    }

    #[test]
    fn decode_rejects_bad_checksum_before_later_frames() {
        let mut log = encode(b"payload");
        let last = log.len() - 1;
        log[last] ^= 0xFF;
        log.extend(encode(b"after"));
        assert!(matches!(decode_all(&log), Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn decode_treats_bad_final_checksum_as_torn() {
        let mut log = encode(b"kept");
        let valid = log.len();
        let mut last = encode(b"zeroed");
        last[HEADER_SIZE..].fill(0);
        log.extend(last);

        let decoded = decode_all(&log).unwrap();
        assert_eq!(decoded.payloads, vec![b"kept".to_vec()]);
        assert_eq!(decoded.valid_len, valid as u64);
        assert!(decoded.torn_tail);
    }

    proptest! {
        #[test]
        fn truncated_log_decodes_to_prefix(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8),
            cut in any::<prop::sample::Index>(),
        ) {
            let log: Vec<u8> = payloads.iter().flat_map(|p| encode(p)).collect();
            let cut = cut.index(log.len() + 1);

            let decoded = decode_all(&log[..cut]).unwrap();
            prop_assert!(decoded.valid_len as usize <= cut);
            prop_assert_eq!(decoded.torn_tail, decoded.valid_len as usize != cut);
            prop_assert_eq!(&decoded.payloads[..], &payloads[..decoded.payloads.len()]);
        }
    }
}
