use crate::util::Offset;
use byteorder::{BigEndian, ByteOrder};

/// Growable buffer of big-endian bytes
///
/// Bytes are normally appended at the cursor (the end of the buffer), but anything already
/// written can be overwritten in place. The latter is how placeholder jump offsets get patched
/// once the label they refer to is placed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> ByteVector {
        ByteVector { data: vec![] }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset at which the next appended byte will land
    pub fn cursor(&self) -> Offset {
        Offset(self.data.len())
    }

    /// Extend the buffer by `len` zeroed bytes and return them for writing
    fn appended_space(&mut self, len: usize) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + len, 0);
        &mut self.data[start..]
    }

    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        BigEndian::write_u16(self.appended_space(2), value)
    }

    pub fn put_i16(&mut self, value: i16) {
        BigEndian::write_i16(self.appended_space(2), value)
    }

    pub fn put_i32(&mut self, value: i32) {
        BigEndian::write_i32(self.appended_space(4), value)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append zero bytes until the cursor is a multiple of `alignment`
    pub fn pad_to(&mut self, alignment: usize) {
        let padding = (alignment - self.data.len() % alignment) % alignment;
        self.appended_space(padding);
    }

    /// Read back a previously written byte
    pub fn get_u8(&self, at: Offset) -> u8 {
        self.data[at.0]
    }

    pub fn get_u16(&self, at: Offset) -> u16 {
        BigEndian::read_u16(&self.data[at.0..at.0 + 2])
    }

    pub fn get_i16(&self, at: Offset) -> i16 {
        BigEndian::read_i16(&self.data[at.0..at.0 + 2])
    }

    pub fn get_i32(&self, at: Offset) -> i32 {
        BigEndian::read_i32(&self.data[at.0..at.0 + 4])
    }

    /// Overwrite a byte that was already written
    pub fn patch_u8(&mut self, at: Offset, value: u8) {
        self.data[at.0] = value;
    }

    pub fn patch_u16(&mut self, at: Offset, value: u16) {
        BigEndian::write_u16(&mut self.data[at.0..at.0 + 2], value)
    }

    pub fn patch_i16(&mut self, at: Offset, value: i16) {
        BigEndian::write_i16(&mut self.data[at.0..at.0 + 2], value)
    }

    pub fn patch_i32(&mut self, at: Offset, value: i32) {
        BigEndian::write_i32(&mut self.data[at.0..at.0 + 4], value)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for ByteVector {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("ByteVector[")?;
        for (idx, byte) in self.data.iter().enumerate() {
            if idx > 0 {
                formatter.write_str(" ")?;
            }
            formatter.write_fmt(format_args!("{:02x}", byte))?;
        }
        formatter.write_str("]")
    }
}
