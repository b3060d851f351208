//! Minimal columnar container standing in for the "columnar type system,
//! column containers, and scalar field representation" that `spec.md` §1
//! keeps external. Just enough to round-trip the entry-point ABI from §3
//! and exercise nullability end-to-end (S6).

use crate::function::Scalar;
use crate::types::DataType;

/// One column entry as passed to a compiled function's entry point:
/// `{ data_ptr, null_map_ptr_or_nil }` (spec §3). `repr(C)` because a real
/// codegen backend would read this layout from emitted machine code.
#[repr(C)]
#[derive(Debug)]
pub struct ColumnDescriptor {
    pub data_ptr: *mut u8,
    pub null_map_ptr: *mut u8,
}

/// An owned, fully materialised (never constant-compressed) column. The
/// caller of a compiled function guarantees this shape (spec §3): dense
/// storage, no run-length or constant compression.
#[derive(Clone, Debug)]
pub struct Column {
    pub data_type: DataType,
    data: Vec<u8>,
    element_size: usize,
    null_mask: Option<Vec<u8>>,
}

impl Column {
    /// Builds a dense i32 column, used throughout the integration tests.
    pub fn from_i32(data_type: DataType, values: &[i32]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_ne_bytes());
        }
        Column { data_type, data, element_size: 4, null_mask: None }
    }

    pub fn with_null_mask(mut self, mask: &[u8]) -> Self {
        self.null_mask = Some(mask.to_vec());
        self
    }

    /// Allocates an empty, zeroed column of `row_count` elements of
    /// `element_size` bytes apiece, matching `result_type`. This is what
    /// the executable compiled function (spec §4.6 step 2) creates before
    /// invoking the entry point.
    pub fn new_result(data_type: DataType, element_size: usize, row_count: usize) -> Self {
        let nullable = data_type.is_nullable();
        Column {
            data_type,
            data: vec![0u8; element_size * row_count],
            element_size,
            null_mask: nullable.then(|| vec![0u8; row_count]),
        }
    }

    /// Repeats a constant scalar into a dense column of `row_count` rows.
    /// Only `i32` constants are supported; this is a minimal stand-in for
    /// the production column type's own constant-to-dense conversion.
    pub fn broadcast(value: &Scalar, data_type: DataType, row_count: usize) -> Column {
        match value {
            Scalar::I32(v) => Column::from_i32(data_type, &vec![*v; row_count]),
            Scalar::Null => {
                Column::new_result(data_type, 4, row_count).with_null_mask(&vec![1u8; row_count])
            }
            other => panic!("broadcast of {other:?} not supported by this minimal column type"),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.element_size.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_i32_slice(&self) -> &[i32] {
        bytemuck_cast_i32(&self.data)
    }

    pub fn null_mask(&self) -> Option<&[u8]> {
        self.null_mask.as_deref()
    }

    /// Builds the raw descriptor a compiled entry point receives. The
    /// returned pointers alias `self` — the executable wrapper (§4.6) keeps
    /// the backing `Column` alive for the duration of the call.
    pub fn descriptor(&mut self) -> ColumnDescriptor {
        ColumnDescriptor {
            data_ptr: self.data.as_mut_ptr(),
            null_map_ptr: self
                .null_mask
                .as_mut()
                .map(|m| m.as_mut_ptr())
                .unwrap_or(std::ptr::null_mut()),
        }
    }

    /// Already dense and uncompressed; materialisation is a no-op for this
    /// minimal container. A production column type would decompress a
    /// constant-compressed column here (spec §4.6 step 3).
    pub fn materialize(self) -> Column {
        self
    }

    /// Copies `row_count` elements out of a raw ABI descriptor into a fresh
    /// owned `Column`. Used by the interpreted test backend to read a
    /// `columns[]` entry before evaluating a `CompileDag` node against it.
    ///
    /// # Safety
    /// `desc.data_ptr` must point to at least `row_count * element_size`
    /// readable bytes, and `desc.null_map_ptr` (if non-null) to at least
    /// `row_count` readable bytes.
    pub unsafe fn from_descriptor(desc: &ColumnDescriptor, data_type: DataType, row_count: usize) -> Column {
        let element_size = data_type.element_size();
        let data = unsafe { std::slice::from_raw_parts(desc.data_ptr, row_count * element_size) }.to_vec();
        let null_mask = (!desc.null_map_ptr.is_null())
            .then(|| unsafe { std::slice::from_raw_parts(desc.null_map_ptr, row_count) }.to_vec());
        Column { data_type, data, element_size, null_mask }
    }

    /// Writes this column's first `row_count` elements into a raw ABI
    /// descriptor — the inverse of `from_descriptor`, used to publish a
    /// compiled function's result.
    ///
    /// # Safety
    /// Same preconditions as `from_descriptor`, and `desc.data_ptr`/
    /// `desc.null_map_ptr` must be writable.
    pub unsafe fn write_into(&self, desc: &ColumnDescriptor, row_count: usize) {
        let nbytes = row_count * self.element_size;
        unsafe { std::ptr::copy_nonoverlapping(self.data.as_ptr(), desc.data_ptr, nbytes) };
        if let Some(mask) = &self.null_mask {
            if !desc.null_map_ptr.is_null() {
                unsafe { std::ptr::copy_nonoverlapping(mask.as_ptr(), desc.null_map_ptr, row_count) };
            }
        }
    }
}

fn bytemuck_cast_i32(bytes: &[u8]) -> &[i32] {
    assert_eq!(bytes.len() % 4, 0);
    // SAFETY: `Column::data` is always written as native-endian i32 chunks
    // by the constructors in this module; alignment is satisfied because
    // `Vec<u8>` allocations are at least 4-byte aligned on every supported
    // target for buffers sized in multiples of 4.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i32, bytes.len() / 4) }
}
