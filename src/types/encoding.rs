//! Binary encoding and decoding traits for deterministic serialization.
//!
//! Encoding determinism is consensus-critical: the same value must produce
//! the same bytes on every node, because those bytes feed signing hashes,
//! transaction ids, and Merkle roots. All integers are little-endian and
//! fixed-width; collections carry an 8-byte length prefix.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - `usize`: encoded as `u64` for portability
//! - `bool`: single byte (0 = false, 1 = true)
//! - `Vec<T>`: 8-byte length prefix followed by elements
//! - `Option<T>`: 1-byte tag (0 = None, 1 = Some) followed by the value
//! - Arrays `[u8; N]` and `[T; N]`: elements in order, no length prefix

/// Sink for writing encoded bytes.
///
/// Implemented by byte buffers and hashers so values can be encoded straight
/// into the target without intermediate allocations.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Counter that measures encoded size without allocating.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Creates a counter initialized to zero.
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been counted yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

/// Trait for types with a deterministic binary representation.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new byte buffer with exact capacity.
    ///
    /// Two passes: one to count, one to encode into a pre-sized buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }

    /// Returns the encoded size in bytes without allocating.
    fn byte_size(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    InvalidValue,
    /// Length prefix exceeds the maximum allowed size.
    LengthOverflow,
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value, advancing the input past consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    ///
    /// Returns `InvalidValue` if trailing bytes remain after decoding.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0])
    }
}

macro_rules! impl_le_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = read_bytes(input, std::mem::size_of::<$t>())?;
                    Ok(<$t>::from_le_bytes(bytes.try_into().unwrap()))
                }
            }
        )*
    };
}

impl_le_int!(u16, u32, u64, u128, i64);

// usize travels as u64 so 32- and 64-bit nodes agree on the wire.
impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Maximum element count accepted when decoding collections.
///
/// Caps allocation before any bytes are trusted, preventing memory
/// exhaustion from a forged length prefix.
const MAX_SEQ_LEN: usize = 1 << 20;

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_SEQ_LEN {
            return Err(DecodeError::LengthOverflow);
        }

        let mut vec = Vec::with_capacity(len);
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl<T: Encode> Encode for Box<[T]> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self.iter() {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Box<[T]> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Vec::<T>::decode(input)?.into_boxed_slice())
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(v) => {
                1u8.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, N)?;
        Ok(bytes.try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_matches_encoded_length() {
        let value: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = value.to_bytes();
        assert_eq!(value.byte_size(), bytes.len());
        assert_eq!(bytes.len(), 8 + 5);
    }

    #[test]
    fn integers_are_little_endian() {
        let value: u32 = 0x12345678;
        assert_eq!(value.to_bytes(), vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(u32::from_bytes(&value.to_bytes()).unwrap(), value);
    }

    #[test]
    fn u128_roundtrip() {
        for value in [0u128, 1, u128::MAX / 3, u128::MAX] {
            assert_eq!(u128::from_bytes(&value.to_bytes()).unwrap(), value);
        }
    }

    #[test]
    fn usize_always_eight_bytes() {
        let value: usize = 42;
        assert_eq!(value.to_bytes().len(), 8);
        assert_eq!(usize::from_bytes(&value.to_bytes()).unwrap(), value);
    }

    #[test]
    fn bool_rejects_invalid_tags() {
        assert_eq!(bool::from_bytes(&[0]).unwrap(), false);
        assert_eq!(bool::from_bytes(&[1]).unwrap(), true);
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn vec_roundtrip_and_empty() {
        let values: Vec<u64> = vec![9, 8, 7];
        assert_eq!(Vec::<u64>::from_bytes(&values.to_bytes()).unwrap(), values);

        let empty: Vec<u64> = vec![];
        assert_eq!(empty.to_bytes().len(), 8);
        assert_eq!(Vec::<u64>::from_bytes(&empty.to_bytes()).unwrap(), empty);
    }

    #[test]
    fn vec_rejects_forged_length_prefix() {
        let forged = ((MAX_SEQ_LEN as u64) + 1).to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&forged),
            Err(DecodeError::LengthOverflow)
        );
    }

    #[test]
    fn option_roundtrip() {
        let none: Option<u64> = None;
        let some: Option<u64> = Some(17);
        assert_eq!(Option::<u64>::from_bytes(&none.to_bytes()).unwrap(), none);
        assert_eq!(Option::<u64>::from_bytes(&some.to_bytes()).unwrap(), some);
        assert_eq!(
            Option::<u64>::from_bytes(&[2u8]),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn byte_array_has_no_length_prefix() {
        let arr: [u8; 4] = [1, 2, 3, 4];
        assert_eq!(arr.to_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(<[u8; 4]>::from_bytes(&arr.to_bytes()).unwrap(), arr);
    }

    #[test]
    fn from_bytes_rejects_trailing_garbage() {
        assert_eq!(u8::from_bytes(&[42, 0xFF]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        assert_eq!(u64::from_bytes(&[1, 2, 3]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn decode_advances_input() {
        let mut input: &[u8] = &[0x01, 0x02, 0x03];
        assert_eq!(u8::decode(&mut input).unwrap(), 0x01);
        assert_eq!(u16::decode(&mut input).unwrap(), 0x0302);
        assert!(input.is_empty());
    }
}
