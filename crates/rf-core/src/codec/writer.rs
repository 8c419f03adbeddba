//! Escritura little-endian complementaria de `Reader`.

use super::EncodeError;

#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn count(&mut self, field: &'static str, len: usize) -> Result<(), EncodeError> {
        let v = u32::try_from(len).map_err(|_| EncodeError::TooLarge { field, len })?;
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub(crate) fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    pub(crate) fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    pub(crate) fn bytes(&mut self, field: &'static str, v: &[u8]) -> Result<(), EncodeError> {
        self.count(field, v.len())?;
        self.raw(v);
        Ok(())
    }

    pub(crate) fn string(&mut self, field: &'static str, v: &str) -> Result<(), EncodeError> {
        self.bytes(field, v.as_bytes())
    }
}
