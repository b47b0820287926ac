//! Wire encoding for string tensors.
//!
//! A string tensor's buffer holds variable-length byte strings: a table of
//! `n` little-endian u64 offsets (one per element, in element order,
//! relative to the first byte after the table) followed by the data area,
//! where each element is a little-endian u32 length prefix and then its
//! bytes. Byte content is arbitrary; embedded NULs survive round-trips.

use thiserror::Error;

/// Decoding failures for string tensor buffers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StringCodecError {
    #[error("string tensor buffer too short for {count}-entry offset table")]
    TruncatedTable { count: usize },

    #[error("string tensor offset {offset} for element {index} is out of bounds")]
    OffsetOutOfBounds { index: usize, offset: u64 },

    #[error("string tensor element {index} is truncated")]
    TruncatedElement { index: usize },
}

const OFFSET_WIDTH: usize = 8;
const LEN_WIDTH: usize = 4;

/// Encodes `elements` into a single string tensor buffer.
pub fn encode<E: AsRef<[u8]>>(elements: &[E]) -> Vec<u8> {
    let table_len = elements.len() * OFFSET_WIDTH;
    let data_len: usize = elements
        .iter()
        .map(|e| LEN_WIDTH + e.as_ref().len())
        .sum();

    let mut buf = Vec::with_capacity(table_len + data_len);
    let mut offset = 0u64;
    for element in elements {
        buf.extend_from_slice(&offset.to_le_bytes());
        offset += (LEN_WIDTH + element.as_ref().len()) as u64;
    }
    for element in elements {
        let bytes = element.as_ref();
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    buf
}

/// Decodes a string tensor buffer holding exactly `count` elements.
pub fn decode(buf: &[u8], count: usize) -> Result<Vec<Vec<u8>>, StringCodecError> {
    let table_len = count
        .checked_mul(OFFSET_WIDTH)
        .ok_or(StringCodecError::TruncatedTable { count })?;
    if buf.len() < table_len {
        return Err(StringCodecError::TruncatedTable { count });
    }
    let (table, data) = buf.split_at(table_len);

    let mut elements = Vec::with_capacity(count);
    for index in 0..count {
        let mut raw = [0u8; OFFSET_WIDTH];
        raw.copy_from_slice(&table[index * OFFSET_WIDTH..(index + 1) * OFFSET_WIDTH]);
        let offset = u64::from_le_bytes(raw);

        let start = usize::try_from(offset)
            .ok()
            .filter(|s| s.checked_add(LEN_WIDTH).is_some_and(|end| end <= data.len()))
            .ok_or(StringCodecError::OffsetOutOfBounds { index, offset })?;

        let mut len_raw = [0u8; LEN_WIDTH];
        len_raw.copy_from_slice(&data[start..start + LEN_WIDTH]);
        let len = u32::from_le_bytes(len_raw) as usize;

        let body = start + LEN_WIDTH;
        if body.checked_add(len).map_or(true, |end| end > data.len()) {
            return Err(StringCodecError::TruncatedElement { index });
        }
        elements.push(data[body..body + len].to_vec());
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_strings() {
        let elements = [b"hello".to_vec(), b"".to_vec(), b"world".to_vec()];
        let buf = encode(&elements);
        assert_eq!(decode(&buf, 3).unwrap(), elements);
    }

    #[test]
    fn preserves_embedded_nuls() {
        let elements = [b"a\0b".to_vec(), b"\0\0".to_vec()];
        let buf = encode(&elements);
        assert_eq!(decode(&buf, 2).unwrap(), elements);
    }

    #[test]
    fn empty_tensor_is_empty_buffer() {
        let buf = encode::<&[u8]>(&[]);
        assert!(buf.is_empty());
        assert_eq!(decode(&buf, 0).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn rejects_truncated_table() {
        let buf = encode(&[b"x".as_slice()]);
        assert_eq!(
            decode(&buf[..4], 1),
            Err(StringCodecError::TruncatedTable { count: 1 })
        );
    }

    #[test]
    fn rejects_truncated_element() {
        let mut buf = encode(&[b"abcdef".as_slice()]);
        buf.truncate(buf.len() - 2);
        assert_eq!(
            decode(&buf, 1),
            Err(StringCodecError::TruncatedElement { index: 0 })
        );
    }
}
