//! The crate's single error currency. Every fallible operation returns
//! [`VmResult`]; variants map one-to-one onto the error kinds a host
//! embedding this runtime needs to branch on.

use std::fmt;

use crate::gas::GasReport;

pub type VmResult<T> = Result<T, VmError>;

/// Compatibility strings reproduced verbatim so host-side string matching
/// (and existing test suites written against the reference runtime) keeps
/// working unchanged.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("Null/Nil argument: {name}")]
    NullArgument { name: String },

    #[error("Checksum not of length 32")]
    IncorrectChecksumLength { actual: usize },

    #[error("{msg}")]
    InputValidation { msg: String },

    #[error("Error opening Wasm file for reading")]
    CacheMiss { checksum_hex: String },

    #[error("Wasm bytecode could not be deserialized")]
    CompileError { msg: String },

    #[error("Wasm contract must contain exactly one memory")]
    WrongMemoryCount { actual: usize },

    #[error("{msg}")]
    StaticValidationError { msg: String },

    #[error("Region validation error: {msg}")]
    RegionValidationError { msg: String },

    #[error("Wasm contract did not return a single pointer: {msg}")]
    ResultArityError { msg: String },

    #[error("Error calling the VM: {msg}")]
    RuntimeError { msg: String },

    /// Carries the partial `GasReport` (`remaining = 0`) the dispatcher
    /// still surfaces alongside a gas-exceeded failure.
    #[error("Ran out of gas during contract execution")]
    GasDepletion { report: Option<GasReport> },

    #[error("Contract aborted execution: {msg}")]
    ContractAbort { msg: String },

    #[error("Error during host call: {msg}")]
    BackendError { msg: String },

    #[error("Wasm file does not exist")]
    WasmNotFound { checksum_hex: String },

    #[error("Caching error: {msg}")]
    CacheError { msg: String },

    #[error("Error parsing into type {target}: {msg}")]
    ParseError { target: String, msg: String },

    #[error("Error serializing into type {target}: {msg}")]
    SerializeError { target: String, msg: String },
}

impl VmError {
    pub fn null_argument(name: impl Into<String>) -> Self {
        VmError::NullArgument { name: name.into() }
    }

    pub fn incorrect_checksum_length(actual: usize) -> Self {
        VmError::IncorrectChecksumLength { actual }
    }

    pub fn input_validation(msg: impl Into<String>) -> Self {
        VmError::InputValidation { msg: msg.into() }
    }

    pub fn cache_miss(checksum_hex: impl Into<String>) -> Self {
        VmError::CacheMiss { checksum_hex: checksum_hex.into() }
    }

    pub fn compile_error(msg: impl Into<String>) -> Self {
        VmError::CompileError { msg: msg.into() }
    }

    pub fn wrong_memory_count(actual: usize) -> Self {
        VmError::WrongMemoryCount { actual }
    }

    pub fn static_validation_error(msg: impl Into<String>) -> Self {
        VmError::StaticValidationError { msg: msg.into() }
    }

    pub fn region_validation_error(msg: impl Into<String>) -> Self {
        VmError::RegionValidationError { msg: msg.into() }
    }

    pub fn result_arity_error(msg: impl Into<String>) -> Self {
        VmError::ResultArityError { msg: msg.into() }
    }

    pub fn runtime_error(msg: impl fmt::Display) -> Self {
        VmError::RuntimeError { msg: msg.to_string() }
    }

    pub fn contract_abort(msg: impl Into<String>) -> Self {
        VmError::ContractAbort { msg: msg.into() }
    }

    pub fn backend_error(msg: impl fmt::Display) -> Self {
        VmError::BackendError { msg: msg.to_string() }
    }

    pub fn wasm_not_found(checksum_hex: impl Into<String>) -> Self {
        VmError::WasmNotFound { checksum_hex: checksum_hex.into() }
    }

    pub fn cache_error(msg: impl Into<String>) -> Self {
        VmError::CacheError { msg: msg.into() }
    }

    pub fn parse_error(target: impl Into<String>, msg: impl fmt::Display) -> Self {
        VmError::ParseError { target: target.into(), msg: msg.to_string() }
    }

    pub fn serialize_error(target: impl Into<String>, msg: impl fmt::Display) -> Self {
        VmError::SerializeError { target: target.into(), msg: msg.to_string() }
    }

    /// True for the one kind a dispatcher turns into a `GasReport` with
    /// `remaining = 0` instead of propagating as an opaque failure.
    pub fn is_gas_depletion(&self) -> bool {
        matches!(self, VmError::GasDepletion { .. })
    }

    pub fn gas_report(&self) -> Option<GasReport> {
        match self {
            VmError::GasDepletion { report } => *report,
            _ => None,
        }
    }
}

impl From<wasmer::InstantiationError> for VmError {
    fn from(e: wasmer::InstantiationError) -> Self {
        VmError::runtime_error(e)
    }
}

impl From<wasmer::RuntimeError> for VmError {
    /// Host functions raise typed errors across the Wasm boundary via
    /// `RuntimeError::user`, so a trap coming back out is unwrapped back
    /// into its original `VmError` instead of losing its kind to a plain
    /// message (this is how `GasDepletion` survives a round trip through
    /// the contract call).
    fn from(e: wasmer::RuntimeError) -> Self {
        match e.downcast::<VmError>() {
            Ok(inner) => inner,
            Err(e) => VmError::runtime_error(e),
        }
    }
}

impl From<wasmer::CompileError> for VmError {
    fn from(e: wasmer::CompileError) -> Self {
        VmError::compile_error(e.to_string())
    }
}

impl From<wasmer::ExportError> for VmError {
    fn from(e: wasmer::ExportError) -> Self {
        VmError::runtime_error(e)
    }
}

impl From<wasmer::MemoryAccessError> for VmError {
    fn from(e: wasmer::MemoryAccessError) -> Self {
        VmError::region_validation_error(e.to_string())
    }
}

impl From<serde_json::Error> for VmError {
    fn from(e: serde_json::Error) -> Self {
        VmError::parse_error("json", e)
    }
}
