//! Bounds-checked access to linear memory bytes.
//!
//! All helpers validate `[offset, offset + len)` against the memory's
//! current size before touching it. Offsets are host-side `usize` values;
//! overflow in the range computation is reported as out of bounds.

use crate::error::MemoryError;

/// Validate that `[offset, offset+len)` lies within a memory of `size` bytes.
pub fn validate_range(size: usize, offset: usize, len: usize) -> Result<(), MemoryError> {
    let out_of_bounds = MemoryError::OutOfBounds { offset, len, size };
    let end = offset.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
    if end > size {
        return Err(out_of_bounds);
    }
    Ok(())
}

/// Copy `buf.len()` bytes out of `mem` starting at `offset`.
pub fn read_bytes(mem: &[u8], offset: usize, buf: &mut [u8]) -> Result<(), MemoryError> {
    validate_range(mem.len(), offset, buf.len())?;
    buf.copy_from_slice(&mem[offset..offset + buf.len()]);
    Ok(())
}

/// Copy `data` into `mem` starting at `offset`.
pub fn write_bytes(mem: &mut [u8], offset: usize, data: &[u8]) -> Result<(), MemoryError> {
    validate_range(mem.len(), offset, data.len())?;
    mem[offset..offset + data.len()].copy_from_slice(data);
    Ok(())
}

/// Read a little-endian `u32` at `offset`.
pub fn read_u32(mem: &[u8], offset: usize) -> Result<u32, MemoryError> {
    let mut bytes = [0u8; 4];
    read_bytes(mem, offset, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Write a little-endian `u32` at `offset`.
pub fn write_u32(mem: &mut [u8], offset: usize, value: u32) -> Result<(), MemoryError> {
    write_bytes(mem, offset, &value.to_le_bytes())
}

/// Size of one linear memory page.
pub const PAGE_SIZE: usize = 65536;
