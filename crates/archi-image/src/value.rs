//! Raw payloads and their array layouts
//!
//! A [`Value`] is the unit of data the image carries: an immutable byte
//! payload described by an [`ArrayLayout`] plus a word of runtime flags.
//! Values are cheap to clone and keep a stable identity, which is what the
//! block cache keys on when two instructions reference the same data.

use crate::error::{ImageError, ImageResult};
use std::rc::Rc;

/// Size in bytes of a machine word, the unit of the wire format.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Number of usable bits in a value's flag word. The top two bits of the
/// tagged representation are reserved by the runtime.
pub const FLAG_BITS: u32 = 62;

/// Largest flag value a tagged word can carry.
pub const MAX_FLAGS: u64 = (1 << FLAG_BITS) - 1;

/// Checks that a flag word fits in the reserved bits.
pub fn ensure_flags(flags: u64) -> ImageResult<()> {
    if flags > MAX_FLAGS {
        return Err(ImageError::FlagsOverflow {
            flags,
            bits: FLAG_BITS,
        });
    }
    Ok(())
}

/// Shape of a payload: `count` elements of `size` bytes, each aligned to
/// `alignment`. An alignment of zero means the data has no alignment
/// requirement of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Number of elements, at least one
    pub count: usize,
    /// Size of one element in bytes
    pub size: usize,
    /// Element alignment, zero or a power of two
    pub alignment: usize,
}

impl ArrayLayout {
    /// Creates a layout after validating its fields.
    pub fn new(count: usize, size: usize, alignment: usize) -> ImageResult<ArrayLayout> {
        let layout = ArrayLayout {
            count,
            size,
            alignment,
        };
        layout.check()?;
        Ok(layout)
    }

    /// Creates a single-element layout.
    pub fn scalar(size: usize, alignment: usize) -> ImageResult<ArrayLayout> {
        ArrayLayout::new(1, size, alignment)
    }

    /// Total payload size this layout describes.
    pub fn byte_len(&self) -> usize {
        self.count * self.size
    }

    /// Alignment with the zero case mapped to one, usable for address math.
    pub fn effective_alignment(&self) -> usize {
        self.alignment.max(1)
    }

    fn check(&self) -> ImageResult<()> {
        if self.count == 0 {
            return Err(ImageError::ZeroCount);
        }
        if self.size == 0 && self.count > 1 {
            return Err(ImageError::ZeroSizeArray { count: self.count });
        }
        if self.alignment != 0 && !self.alignment.is_power_of_two() {
            return Err(ImageError::AlignmentNotPowerOfTwo {
                alignment: self.alignment,
            });
        }
        if self.count > 1 && self.alignment > 1 && self.size % self.alignment != 0 {
            return Err(ImageError::MisalignedElementSize {
                size: self.size,
                alignment: self.alignment,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ValueData {
    payload: Box<[u8]>,
    layout: ArrayLayout,
    flags: u64,
}

/// An immutable payload with layout and flags.
///
/// Clones share the underlying allocation, so a value used by several
/// instructions marshals to a single block in the image.
#[derive(Debug, Clone)]
pub struct Value {
    data: Rc<ValueData>,
}

impl Value {
    /// Creates a value, checking the payload against the layout and the
    /// flags against the reserved bit budget.
    pub fn new(payload: Vec<u8>, layout: ArrayLayout, flags: u64) -> ImageResult<Value> {
        layout.check()?;
        ensure_flags(flags)?;
        if payload.len() != layout.byte_len() {
            return Err(ImageError::PayloadSizeMismatch {
                expected: layout.byte_len(),
                actual: payload.len(),
            });
        }
        Ok(Value::raw(payload, layout, flags))
    }

    fn raw(payload: Vec<u8>, layout: ArrayLayout, flags: u64) -> Value {
        Value {
            data: Rc::new(ValueData {
                payload: payload.into_boxed_slice(),
                layout,
                flags,
            }),
        }
    }

    fn scalar_bytes(bytes: &[u8], alignment: usize) -> Value {
        let layout = ArrayLayout {
            count: 1,
            size: bytes.len(),
            alignment,
        };
        Value::raw(bytes.to_vec(), layout, 0)
    }

    /// Single `u8` scalar.
    pub fn from_u8(v: u8) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 1)
    }

    /// Single `u16` scalar.
    pub fn from_u16(v: u16) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 2)
    }

    /// Single `u32` scalar.
    pub fn from_u32(v: u32) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 4)
    }

    /// Single `u64` scalar.
    pub fn from_u64(v: u64) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 8)
    }

    /// Single word-sized scalar.
    pub fn from_usize(v: usize) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), WORD)
    }

    /// Single `i32` scalar.
    pub fn from_i32(v: i32) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 4)
    }

    /// Single `i64` scalar.
    pub fn from_i64(v: i64) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 8)
    }

    /// Single `f32` scalar.
    pub fn from_f32(v: f32) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 4)
    }

    /// Single `f64` scalar.
    pub fn from_f64(v: f64) -> Value {
        Value::scalar_bytes(&v.to_ne_bytes(), 8)
    }

    /// NUL-terminated string. The terminator is part of the payload, so the
    /// element count is `s.len() + 1`.
    pub fn c_str(s: &str) -> Value {
        let mut payload = Vec::with_capacity(s.len() + 1);
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
        let layout = ArrayLayout {
            count: payload.len(),
            size: 1,
            alignment: 1,
        };
        Value::raw(payload, layout, 0)
    }

    /// Raw byte array. An empty input degrades to a unit value.
    pub fn bytes(payload: Vec<u8>) -> Value {
        if payload.is_empty() {
            return Value::unit();
        }
        let layout = ArrayLayout {
            count: payload.len(),
            size: 1,
            alignment: 1,
        };
        Value::raw(payload, layout, 0)
    }

    /// Array of word-sized indices. An empty input degrades to a unit value.
    pub fn index_array(indices: &[usize]) -> Value {
        if indices.is_empty() {
            return Value::unit();
        }
        let mut payload = Vec::with_capacity(indices.len() * WORD);
        for index in indices {
            payload.extend_from_slice(&index.to_ne_bytes());
        }
        let layout = ArrayLayout {
            count: indices.len(),
            size: WORD,
            alignment: WORD,
        };
        Value::raw(payload, layout, 0)
    }

    /// Zero-sized marker value.
    pub fn unit() -> Value {
        Value::raw(
            Vec::new(),
            ArrayLayout {
                count: 1,
                size: 0,
                alignment: 0,
            },
            0,
        )
    }

    /// Copy of this value carrying different flags. The copy has its own
    /// identity.
    pub fn with_flags(&self, flags: u64) -> ImageResult<Value> {
        ensure_flags(flags)?;
        Ok(Value::raw(self.payload().to_vec(), self.layout(), flags))
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data.payload
    }

    /// Shape of the payload.
    pub fn layout(&self) -> ArrayLayout {
        self.data.layout
    }

    /// Runtime flags.
    pub fn flags(&self) -> u64 {
        self.data.flags
    }

    /// Total payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.payload.len()
    }

    /// Effective alignment of the payload.
    pub fn alignment(&self) -> usize {
        self.data.layout.effective_alignment()
    }

    /// Stable identity of the underlying allocation. Clones share it,
    /// independently constructed values never do.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.data) as usize
    }

    /// Whether two values share one allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_constructors_carry_natural_layouts() {
        let v = Value::from_u32(7);
        assert_eq!(v.payload(), &7u32.to_ne_bytes());
        assert_eq!(v.layout(), ArrayLayout::scalar(4, 4).unwrap());
        assert_eq!(v.flags(), 0);

        let w = Value::from_usize(0xdead_beef);
        assert_eq!(w.byte_len(), WORD);
        assert_eq!(w.alignment(), WORD);
    }

    #[test]
    fn c_str_includes_terminator() {
        let v = Value::c_str("key");
        assert_eq!(v.payload(), b"key\0");
        assert_eq!(v.layout().count, 4);
        assert_eq!(v.layout().size, 1);

        let empty = Value::c_str("");
        assert_eq!(empty.payload(), b"\0");
        assert_eq!(empty.layout().count, 1);
    }

    #[test]
    fn index_array_packs_words() {
        let v = Value::index_array(&[1, 2]);
        assert_eq!(v.byte_len(), 2 * WORD);
        assert_eq!(v.layout().count, 2);
        assert_eq!(v.alignment(), WORD);

        let unit = Value::index_array(&[]);
        assert_eq!(unit.byte_len(), 0);
        assert_eq!(unit.layout().count, 1);
    }

    #[test]
    fn layout_validation_rejects_bad_shapes() {
        assert_eq!(ArrayLayout::new(0, 4, 4), Err(ImageError::ZeroCount));
        assert_eq!(
            ArrayLayout::new(3, 0, 0),
            Err(ImageError::ZeroSizeArray { count: 3 })
        );
        assert_eq!(
            ArrayLayout::new(1, 4, 3),
            Err(ImageError::AlignmentNotPowerOfTwo { alignment: 3 })
        );
        assert_eq!(
            ArrayLayout::new(2, 6, 4),
            Err(ImageError::MisalignedElementSize {
                size: 6,
                alignment: 4
            })
        );
        // zero size is fine for a single element
        assert!(ArrayLayout::new(1, 0, 0).is_ok());
    }

    #[test]
    fn new_checks_payload_against_layout() {
        let layout = ArrayLayout::new(2, 4, 4).unwrap();
        let err = Value::new(vec![0; 7], layout, 0).unwrap_err();
        assert_eq!(
            err,
            ImageError::PayloadSizeMismatch {
                expected: 8,
                actual: 7
            }
        );
        assert!(Value::new(vec![0; 8], layout, 0).is_ok());
    }

    #[test]
    fn flags_must_fit_in_sixty_two_bits() {
        assert!(ensure_flags(MAX_FLAGS).is_ok());
        let err = ensure_flags(MAX_FLAGS + 1).unwrap_err();
        assert!(matches!(err, ImageError::FlagsOverflow { bits: 62, .. }));

        let v = Value::from_u32(1).with_flags(0x3).unwrap();
        assert_eq!(v.flags(), 0x3);
        assert!(Value::from_u32(1).with_flags(1 << 62).is_err());
    }

    #[test]
    fn clones_share_identity_copies_do_not() {
        let a = Value::from_u64(42);
        let b = a.clone();
        let c = Value::from_u64(42);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.identity(), b.identity());
        assert!(!a.ptr_eq(&c));
        assert_ne!(a.identity(), c.identity());
    }
}
