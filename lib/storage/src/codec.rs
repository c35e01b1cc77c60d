// Headerless big-endian sketch encodings

use bytes::{Buf, BufMut, BytesMut};

const WORD: usize = 8;

/// Decode big-endian `u64` words. `None` if the length is not a multiple of 8.
pub fn decode_u64s(data: &[u8]) -> Option<Vec<u64>> {
    if data.len() % WORD != 0 {
        return None;
    }
    let mut buf = data;
    let mut values = Vec::with_capacity(data.len() / WORD);
    while buf.has_remaining() {
        values.push(buf.get_u64());
    }
    Some(values)
}

/// Decode big-endian `f64` words. `None` if the length is not a multiple of 8.
pub fn decode_f64s(data: &[u8]) -> Option<Vec<f64>> {
    if data.len() % WORD != 0 {
        return None;
    }
    let mut buf = data;
    let mut values = Vec::with_capacity(data.len() / WORD);
    while buf.has_remaining() {
        values.push(buf.get_f64());
    }
    Some(values)
}

pub fn encode_u64s(values: &[u64]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(values.len() * WORD);
    for &v in values {
        buf.put_u64(v);
    }
    buf
}

pub fn encode_f64s(values: &[f64]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(values.len() * WORD);
    for &v in values {
        buf.put_f64(v);
    }
    buf
}
