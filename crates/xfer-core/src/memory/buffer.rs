//! In-memory stores: a bounded contiguous region and a sparse image.

use std::collections::BTreeMap;

use super::traits::{Memory, MemoryError};

/// Value of bytes never written (erased flash).
pub const ERASED: u8 = 0xFF;

/// Contiguous region starting at `base`, growing on write up to `capacity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferMemory {
    base: u32,
    data: Vec<u8>,
    capacity: u32,
}

impl BufferMemory {
    /// Empty region at address 0.
    pub fn new(capacity: u32) -> Self {
        Self::with_base(0, capacity)
    }

    /// Empty region at `base`.
    pub fn with_base(base: u32, capacity: u32) -> Self {
        Self {
            base,
            data: Vec::new(),
            capacity,
        }
    }

    /// Region pre-filled with `data`, capacity equal to its length.
    pub fn from_bytes(base: u32, data: Vec<u8>) -> Self {
        let capacity = data.len() as u32;
        Self {
            base,
            data,
            capacity,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Bytes up to the highest address written.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize, MemoryError> {
        let oob = MemoryError::OutOfBounds { address, len };
        let offset = address.checked_sub(self.base).ok_or(oob.clone())? as usize;
        if offset + len > self.capacity as usize {
            return Err(oob);
        }
        Ok(offset)
    }
}

impl Memory for BufferMemory {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, data.len())?;
        let end = offset + data.len();
        if self.data.len() < end {
            self.data.resize(end, ERASED);
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, buf.len())?;
        let src = self
            .data
            .get(offset..offset + buf.len())
            .ok_or(MemoryError::OutOfBounds {
                address,
                len: buf.len(),
            })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Byte map keyed by absolute address, for HEX images with holes or high
/// load addresses.
///
/// The distance from the lowest to the highest written address is bounded by
/// `span_limit`, so the flattened image never exceeds it.
#[derive(Debug, Clone)]
pub struct SparseMemory {
    bytes: BTreeMap<u32, u8>,
    span_limit: u32,
}

impl Default for SparseMemory {
    fn default() -> Self {
        Self::with_span_limit(u32::MAX)
    }
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty map whose flattened image may hold at most `limit` bytes.
    pub fn with_span_limit(limit: u32) -> Self {
        Self {
            bytes: BTreeMap::new(),
            span_limit: limit,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowest address written.
    pub fn start(&self) -> Option<u32> {
        self.bytes.keys().next().copied()
    }

    /// Contiguous image from the lowest to the highest written address,
    /// holes filled with `ERASED`.
    pub fn to_flat(&self) -> (u32, Vec<u8>) {
        let (Some((&lo, _)), Some((&hi, _))) =
            (self.bytes.first_key_value(), self.bytes.last_key_value())
        else {
            return (0, Vec::new());
        };
        let mut image = vec![ERASED; (hi - lo) as usize + 1];
        for (&addr, &b) in &self.bytes {
            image[(addr - lo) as usize] = b;
        }
        (lo, image)
    }
}

impl Memory for SparseMemory {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len();
        let last = u64::from(address) + len as u64 - 1;
        if last > u64::from(u32::MAX) {
            return Err(MemoryError::OutOfBounds { address, len });
        }

        let lo = self.start().map_or(address, |s| s.min(address));
        let hi = self
            .bytes
            .last_key_value()
            .map_or(last, |(&h, _)| u64::from(h).max(last));
        if hi - u64::from(lo) + 1 > u64::from(self.span_limit) {
            return Err(MemoryError::SpanExceeded {
                address,
                len,
                limit: self.span_limit,
            });
        }

        for (i, &b) in data.iter().enumerate() {
            self.bytes.insert(address + i as u32, b);
        }
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self
                .bytes
                .get(&address.wrapping_add(i as u32))
                .copied()
                .unwrap_or(ERASED);
        }
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.span_limit
    }
}
