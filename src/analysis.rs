//! C4 — static analyzer. Runs at store time and again on demand
//! (`AnalyzeCode`); a pure function of the compiled module, so it is safe
//! to call repeatedly with no side effects.

use wasmer::{ExternType, Module};

use crate::capabilities::{required_capabilities_for, IBC_ENTRY_POINTS, REQUIRED_EXPORTS};
use crate::errors::{VmError, VmResult};

/// Placeholder pending a real version-signaling convention; see the open
/// question recorded in DESIGN.md.
const CONTRACT_MIGRATE_VERSION_PLACEHOLDER: u64 = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub has_ibc_entry_points: bool,
    pub required_capabilities: Vec<String>,
    pub contract_migrate_version: Option<u64>,
    pub entrypoints: Vec<String>,
}

/// Counts exported memories and fails unless exactly one is present. This
/// alone is also what `StoreCodeUnchecked`'s relaxed validation runs.
pub fn check_memory_count(module: &Module) -> VmResult<()> {
    let memory_count = module
        .exports()
        .filter(|e| matches!(e.ty(), ExternType::Memory(_)))
        .count();
    if memory_count != 1 {
        return Err(VmError::wrong_memory_count(memory_count));
    }
    Ok(())
}

/// Fails unless every export named in `REQUIRED_EXPORTS` (`allocate`,
/// `deallocate`) is present, per the contract-to-runtime ABI (§6). Run only
/// on the full validation path; `StoreCodeUnchecked` skips it.
fn check_required_exports(module: &Module) -> VmResult<()> {
    let exported_functions: Vec<String> = module
        .exports()
        .filter(|e| matches!(e.ty(), ExternType::Function(_)))
        .map(|e| e.name().to_string())
        .collect();
    for name in REQUIRED_EXPORTS {
        if !exported_functions.iter().any(|e| e == name) {
            return Err(VmError::static_validation_error(format!(
                "Wasm contract doesn't export required function \"{name}\""
            )));
        }
    }
    Ok(())
}

/// Full static validation run at `StoreCode` time and by `AnalyzeCode`.
pub fn analyze(module: &Module) -> VmResult<AnalysisReport> {
    check_memory_count(module)?;
    check_required_exports(module)?;

    let entrypoints: Vec<String> = module
        .exports()
        .filter(|e| matches!(e.ty(), ExternType::Function(_)))
        .map(|e| e.name().to_string())
        .collect();

    let has_ibc_entry_points = IBC_ENTRY_POINTS
        .iter()
        .any(|name| entrypoints.iter().any(|e| e == name));

    let required_capabilities = required_capabilities_for(has_ibc_entry_points);

    let contract_migrate_version = if entrypoints.iter().any(|e| e == "migrate") && !has_ibc_entry_points {
        Some(CONTRACT_MIGRATE_VERSION_PLACEHOLDER)
    } else {
        None
    };

    Ok(AnalysisReport {
        has_ibc_entry_points,
        required_capabilities,
        contract_migrate_version,
        entrypoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm_backend::compile;

    fn minimal_contract_wat() -> Vec<u8> {
        wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) i32.const 1024)
                (func (export "deallocate") (param i32))
                (func (export "instantiate") (param i32 i32 i32) (result i32) i32.const 0)
            )"#,
        )
        .unwrap()
    }

    #[test]
    fn analyze_reports_entrypoints_and_no_ibc() {
        let wasm = minimal_contract_wat();
        let module = compile(&wasm).unwrap();
        let report = analyze(&module).unwrap();
        assert!(!report.has_ibc_entry_points);
        assert!(report.required_capabilities.is_empty());
        assert!(report.entrypoints.contains(&"allocate".to_string()));
        assert!(report.entrypoints.contains(&"deallocate".to_string()));
        assert!(report.contract_migrate_version.is_none());
    }

    #[test]
    fn analyze_rejects_missing_memory() {
        let wasm = wat::parse_str(
            r#"(module
                (func (export "allocate") (param i32) (result i32) i32.const 0)
                (func (export "deallocate") (param i32))
            )"#,
        )
        .unwrap();
        let module = compile(&wasm).unwrap();
        let err = analyze(&module).unwrap_err();
        assert!(matches!(err, VmError::WrongMemoryCount { actual: 0 }));
    }

    #[test]
    fn analyze_rejects_missing_deallocate_export() {
        let wasm = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) i32.const 0)
            )"#,
        )
        .unwrap();
        let module = compile(&wasm).unwrap();
        let err = analyze(&module).unwrap_err();
        assert!(matches!(err, VmError::StaticValidationError { .. }));
    }

    #[test]
    fn analyze_detects_ibc_entry_points_and_required_capabilities() {
        let wasm = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) i32.const 0)
                (func (export "deallocate") (param i32))
                (func (export "ibc_channel_open") (param i32 i32) (result i32) i32.const 0)
            )"#,
        )
        .unwrap();
        let module = compile(&wasm).unwrap();
        let report = analyze(&module).unwrap();
        assert!(report.has_ibc_entry_points);
        assert_eq!(report.required_capabilities, vec!["iterator", "stargate"]);
    }
}
