//! C1 — Region codec. A Region is the contract's ABI for "a byte slice": a
//! 12-byte little-endian `(offset, capacity, length)` record living in the
//! contract's own linear memory. Only the Region's address crosses the Wasm
//! boundary; its body never does.

use crate::errors::{VmError, VmResult};

pub const REGION_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u32,
    pub capacity: u32,
    pub length: u32,
}

impl Region {
    pub fn new(offset: u32, capacity: u32, length: u32) -> Self {
        Region { offset, capacity, length }
    }

    pub fn encode(self) -> [u8; REGION_SIZE] {
        let mut buf = [0u8; REGION_SIZE];
        buf[0..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        buf[8..12].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() != REGION_SIZE {
            return Err(VmError::region_validation_error(format!(
                "expected {} bytes, got {}",
                REGION_SIZE,
                bytes.len()
            )));
        }
        let offset = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let capacity = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let length = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        Ok(Region { offset, capacity, length })
    }

    /// Enforces the four invariants from the data model: nonzero offset,
    /// length within capacity, no address-space overflow, and containment
    /// within the instance's actual memory size.
    pub fn validate(&self, memory_byte_size: u64) -> VmResult<()> {
        if self.offset == 0 {
            return Err(VmError::region_validation_error("region offset is zero"));
        }
        if self.length > self.capacity {
            return Err(VmError::region_validation_error(format!(
                "region length {} exceeds capacity {}",
                self.length, self.capacity
            )));
        }
        let end = (self.offset as u64)
            .checked_add(self.capacity as u64)
            .ok_or_else(|| VmError::region_validation_error("region end overflows u32 address space"))?;
        if end > u32::MAX as u64 + 1 {
            return Err(VmError::region_validation_error("region end exceeds 2^32"));
        }
        if end > memory_byte_size {
            return Err(VmError::region_validation_error(format!(
                "region end {end} exceeds memory size {memory_byte_size}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let region = Region::new(100, 64, 40);
        let encoded = region.encode();
        let decoded = Region::decode(&encoded).unwrap();
        assert_eq!(region, decoded);
    }

    #[test]
    fn encode_is_little_endian() {
        let region = Region::new(1, 0, 0);
        let encoded = region.encode();
        assert_eq!(&encoded[0..4], &[1, 0, 0, 0]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = Region::decode(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, VmError::RegionValidationError { .. }));
    }

    #[test]
    fn validate_rejects_zero_offset() {
        let region = Region::new(0, 10, 5);
        assert!(region.validate(1 << 20).is_err());
    }

    #[test]
    fn validate_rejects_length_over_capacity() {
        let region = Region::new(10, 5, 6);
        assert!(region.validate(1 << 20).is_err());
    }

    #[test]
    fn validate_rejects_out_of_bounds() {
        let region = Region::new(10, 100, 5);
        assert!(region.validate(50).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_region() {
        let region = Region::new(10, 100, 5);
        assert!(region.validate(1000).is_ok());
    }
}
