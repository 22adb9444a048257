//! Baseline encoding.
//!
//! A baseline is the full-state snapshot of a replicated entity, sent once to
//! each new observer; afterwards only per-slot deltas flow. The builder
//! writes little-endian fields in slot order and prefixes the finished
//! payload with its operand count.

use bytes::{BufMut, Bytes, BytesMut};

/// Incremental encoder for baseline and delta payloads.
#[derive(Debug, Default)]
pub struct BaselineBuilder {
    fields: BytesMut,
    operands: u16,
}

impl BaselineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u8(&mut self, value: u8) -> &mut Self {
        self.fields.put_u8(value);
        self
    }

    pub fn add_u16(&mut self, value: u16) -> &mut Self {
        self.fields.put_u16_le(value);
        self
    }

    pub fn add_u32(&mut self, value: u32) -> &mut Self {
        self.fields.put_u32_le(value);
        self
    }

    pub fn add_u64(&mut self, value: u64) -> &mut Self {
        self.fields.put_u64_le(value);
        self
    }

    pub fn add_f32(&mut self, value: f32) -> &mut Self {
        self.fields.put_f32_le(value);
        self
    }

    /// ASCII string: u16 length prefix, then the raw bytes.
    pub fn add_ascii(&mut self, value: &str) -> &mut Self {
        self.fields.put_u16_le(value.len() as u16);
        self.fields.put_slice(value.as_bytes());
        self
    }

    pub fn add_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.fields.put_slice(value);
        self
    }

    /// Count `n` operands toward the payload header.
    pub fn increment_operand_count(&mut self, n: u16) -> &mut Self {
        self.operands += n;
        self
    }

    /// Finish: operand count header followed by the encoded fields.
    pub fn finish(self) -> Bytes {
        let mut out = BytesMut::with_capacity(2 + self.fields.len());
        out.put_u16_le(self.operands);
        out.extend_from_slice(&self.fields);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fields_little_endian_with_operand_header() {
        let mut bb = BaselineBuilder::new();
        bb.add_u16(0x1234).add_ascii("ab").increment_operand_count(2);
        let out = bb.finish();

        assert_eq!(
            out.as_ref(),
            &[
                0x02, 0x00, // operand count
                0x34, 0x12, // u16 field
                0x02, 0x00, b'a', b'b', // ascii: length prefix + bytes
            ]
        );
    }

    #[test]
    fn empty_builder_is_just_the_header() {
        assert_eq!(BaselineBuilder::new().finish().as_ref(), &[0x00, 0x00]);
    }
}
