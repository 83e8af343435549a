use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{Result, SessionError};

const CHECKSUM_LEN: usize = 4;

/// Converts attribute values to and from their stored byte form.
pub trait Marshaller<V>: Send + Sync {
    /// Encodes `value`.
    fn write(&self, value: &V) -> Result<Bytes>;

    /// Decodes bytes produced by [`Marshaller::write`]. Malformed input yields
    /// [`SessionError::Decode`].
    fn read(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON marshaller with a CRC32 frame.
///
/// Layout: `crc32(payload) as u32 LE || payload`.
pub struct JsonMarshaller<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonMarshaller<V> {
    /// Creates a marshaller.
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for JsonMarshaller<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Marshaller<V> for JsonMarshaller<V>
where
    V: Serialize + DeserializeOwned,
{
    fn write(&self, value: &V) -> Result<Bytes> {
        let payload = serde_json::to_vec(value).map_err(|err| SessionError::Encode(err.to_string()))?;
        let mut buf = BytesMut::with_capacity(CHECKSUM_LEN + payload.len());
        buf.put_u32_le(crc32fast::hash(&payload));
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    fn read(&self, bytes: &[u8]) -> Result<V> {
        if bytes.len() < CHECKSUM_LEN {
            return Err(SessionError::Decode(format!(
                "payload of {} bytes is shorter than its checksum",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(CHECKSUM_LEN);
        let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(SessionError::Decode(format!(
                "checksum mismatch: stored {expected:#010x}, computed {actual:#010x}"
            )));
        }
        serde_json::from_slice(payload).map_err(|err| SessionError::Decode(err.to_string()))
    }
}
