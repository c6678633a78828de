//! Content address for stored modules: the SHA-256 of the raw bytecode.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::{VmError, VmResult};

pub const CHECKSUM_LENGTH: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_LENGTH]);

impl Checksum {
    pub fn generate(wasm: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(wasm);
        let digest = hasher.finalize();
        let mut bytes = [0u8; CHECKSUM_LENGTH];
        bytes.copy_from_slice(&digest);
        Checksum(bytes)
    }

    pub fn from_slice(data: &[u8]) -> VmResult<Self> {
        if data.is_empty() {
            return Err(VmError::null_argument("checksum"));
        }
        if data.len() != CHECKSUM_LENGTH {
            return Err(VmError::incorrect_checksum_length(data.len()));
        }
        let mut bytes = [0u8; CHECKSUM_LENGTH];
        bytes.copy_from_slice(data);
        Ok(Checksum(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_matches_sha256() {
        let wasm = b"\0asmfakebytecode";
        let checksum = Checksum::generate(wasm);
        let mut hasher = Sha256::new();
        hasher.update(wasm);
        assert_eq!(checksum.as_slice(), hasher.finalize().as_slice());
    }

    #[test]
    fn from_slice_rejects_empty() {
        let err = Checksum::from_slice(&[]).unwrap_err();
        assert!(matches!(err, VmError::NullArgument { .. }));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = Checksum::from_slice(&[0u8; 31]).unwrap_err();
        assert!(matches!(err, VmError::IncorrectChecksumLength { actual: 31 }));
    }

    #[test]
    fn from_slice_accepts_32_bytes() {
        let checksum = Checksum::from_slice(&[7u8; 32]).unwrap();
        assert_eq!(checksum.as_slice(), &[7u8; 32]);
    }
}
