//! Compiles raw bytecode to a [`wasmer::Module`] using an in-process engine,
//! no external library or IPC involved.

use wasmer::{Module, Store};

use crate::errors::{VmError, VmResult};

pub const WASM_MAGIC: &[u8] = b"\0asm";
pub const MIN_WASM_LENGTH: usize = 4;

pub fn new_store() -> Store {
    Store::default()
}

/// Validates the bytecode looks like Wasm at all (empty check, minimum
/// length, magic number) before handing it to the compiler.
pub fn check_wasm_magic(wasm: &[u8]) -> VmResult<()> {
    if wasm.is_empty() {
        return Err(VmError::null_argument("wasm"));
    }
    if wasm.len() < MIN_WASM_LENGTH {
        return Err(VmError::compile_error("Wasm bytecode could not be deserialized"));
    }
    if &wasm[0..4] != WASM_MAGIC {
        return Err(VmError::compile_error("Wasm bytecode could not be deserialized"));
    }
    Ok(())
}

pub fn compile(wasm: &[u8]) -> VmResult<Module> {
    check_wasm_magic(wasm)?;
    let store = new_store();
    Module::new(&store, wasm).map_err(VmError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_wasm_magic_rejects_empty() {
        assert!(matches!(check_wasm_magic(&[]), Err(VmError::NullArgument { .. })));
    }

    #[test]
    fn check_wasm_magic_rejects_short_input() {
        assert!(check_wasm_magic(&[0, 1]).is_err());
    }

    #[test]
    fn check_wasm_magic_rejects_missing_magic() {
        assert!(check_wasm_magic(b"nope").is_err());
    }

    #[test]
    fn compile_accepts_minimal_module() {
        let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
        assert!(compile(&wasm).is_ok());
    }
}
