//! End-to-end dispatcher tests (§8 S4-S6): a hand-written `.wat` contract
//! exercising the full store -> instantiate -> execute -> query path through
//! real host functions, not mocked-out pieces.
//!
//! The contract is deliberately tiny: a bump allocator plus three entry
//! points that round-trip their `msg` Region straight through `db_write`/
//! `db_read`. It does not parse JSON itself (msg bytes are opaque to it);
//! only the env blob the dispatcher adapts needs to be valid JSON.

use cw_engine::backend::Storage;
use cw_engine::cache::CacheOptions;
use cw_engine::errors::VmError;
use cw_engine::testing::{mock_env_json, mock_info_json, MockApi, MockQuerier, SharedStorage};
use cw_engine::Vm;

/// `config` Region descriptor lives at address 8, its bytes at 20; the
/// bump allocator starts handing out memory at 1024 so the two never
/// collide.
fn echo_contract_wat() -> Vec<u8> {
    wat::parse_str(
        r#"(module
            (import "env" "db_read" (func $db_read (param i32) (result i32)))
            (import "env" "db_write" (func $db_write (param i32 i32)))
            (memory (export "memory") 2)
            (global $next (mut i32) (i32.const 1024))

            (data (i32.const 8) "\14\00\00\00\06\00\00\00\06\00\00\00")
            (data (i32.const 20) "config")

            (func (export "allocate") (param $size i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get $size)))
                (local.get $ptr))

            (func (export "deallocate") (param $ptr i32))

            (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
                (call $db_write (i32.const 8) (local.get $msg))
                (local.get $msg))

            (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
                (call $db_write (i32.const 8) (local.get $msg))
                (local.get $msg))

            (func (export "query") (param $env i32) (param $msg i32) (result i32)
                (call $db_read (i32.const 8)))
        )"#,
    )
    .unwrap()
}

const DEFAULT_GAS_LIMIT: u64 = 5_000_000_000;

#[test]
fn s4_instantiate_then_query_round_trips_through_storage() {
    let vm = Vm::new(CacheOptions::default());
    let wasm = echo_contract_wat();
    let checksum = vm.store_code(&wasm, true).unwrap();

    let report = vm
        .analyze_code(&checksum)
        .expect("analysis should succeed for a single-memory contract");
    assert!(!report.has_ibc_entry_points);
    assert!(report.entrypoints.contains(&"allocate".to_string()));
    assert!(report.entrypoints.contains(&"deallocate".to_string()));

    let storage = SharedStorage::new();

    let (instantiate_result, inst_report) = vm
        .instantiate(
            &checksum,
            &mock_env_json("contract0"),
            &mock_info_json("creator", &[]),
            br#"{"verifier":"fred","beneficiary":"bob","funder":"creator"}"#,
            MockApi::new(),
            storage.clone(),
            MockQuerier::new(),
            DEFAULT_GAS_LIMIT,
        )
        .unwrap();
    assert_eq!(
        instantiate_result,
        br#"{"verifier":"fred","beneficiary":"bob","funder":"creator"}"#
    );
    assert!(inst_report.remaining < inst_report.limit);

    let (query_result, _query_report) = vm
        .query(
            &checksum,
            &mock_env_json("contract0"),
            br#"{"raw":{"key":"config"}}"#,
            MockApi::new(),
            storage,
            MockQuerier::new(),
            DEFAULT_GAS_LIMIT,
        )
        .unwrap();
    assert_eq!(
        query_result,
        br#"{"verifier":"fred","beneficiary":"bob","funder":"creator"}"#
    );
}

#[test]
fn s5_pin_then_three_executes_reports_three_hits() {
    let vm = Vm::new(CacheOptions::default());
    let wasm = echo_contract_wat();
    let checksum = vm.store_code(&wasm, true).unwrap();
    vm.pin(&checksum).unwrap();

    let storage = SharedStorage::new();
    for _ in 0..3 {
        vm.execute(
            &checksum,
            &mock_env_json("contract0"),
            &mock_info_json("creator", &[]),
            b"ping",
            MockApi::new(),
            storage.clone(),
            MockQuerier::new(),
            DEFAULT_GAS_LIMIT,
        )
        .unwrap();
    }

    let metrics = vm.get_pinned_metrics();
    let (_, metric) = metrics.iter().find(|(c, _)| *c == checksum).unwrap();
    assert_eq!(metric.hits, 3);
    let bytecode_len = vm.get_code(&checksum).unwrap().len();
    assert_eq!(metric.size, checksum.to_hex().len() / 2 + bytecode_len);

    vm.unpin(&checksum).unwrap();
    assert!(vm.get_pinned_metrics().is_empty());
}

#[test]
fn s6_gas_exhaustion_reports_zero_remaining() {
    let vm = Vm::new(CacheOptions::default());
    let wasm = echo_contract_wat();
    let checksum = vm.store_code(&wasm, true).unwrap();

    let err = vm
        .execute(
            &checksum,
            &mock_env_json("contract0"),
            &mock_info_json("creator", &[]),
            b"ping",
            MockApi::new(),
            SharedStorage::new(),
            MockQuerier::new(),
            10, // far below the GAS_COST_DB_WRITE charge
        )
        .unwrap_err();

    assert!(err.is_gas_depletion(), "expected GasDepletion, got {err:?}");
    let report = err.gas_report().unwrap();
    assert_eq!(report.remaining, 0);
    assert!(matches!(err, VmError::GasDepletion { .. }));
}

#[test]
fn store_code_rejects_contract_with_no_memory() {
    let vm = Vm::new(CacheOptions::default());
    let wasm = wat::parse_str(
        r#"(module
            (func (export "allocate") (param i32) (result i32) i32.const 0)
            (func (export "deallocate") (param i32))
        )"#,
    )
    .unwrap();
    let err = vm.store_code(&wasm, true).unwrap_err();
    assert_eq!(err.to_string(), "Wasm contract must contain exactly one memory");
}

#[test]
fn instantiate_rejects_short_checksum() {
    use cw_engine::checksum::Checksum;
    let err = Checksum::from_slice(&[0u8; 31]).unwrap_err();
    assert!(matches!(err, VmError::IncorrectChecksumLength { actual: 31 }));
    assert_eq!(err.to_string(), "Checksum not of length 32");
}

/// Opens a fresh ascending iterator over the whole store and returns the
/// first element `db_next` hands back, as the Region `db_next` itself wrote.
fn scan_first_contract_wat() -> Vec<u8> {
    wat::parse_str(
        r#"(module
            (import "env" "db_scan" (func $db_scan (param i32 i32 i32) (result i32)))
            (import "env" "db_next" (func $db_next (param i32) (result i32)))
            (memory (export "memory") 2)
            (global $next (mut i32) (i32.const 1024))

            (func (export "allocate") (param $size i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get $size)))
                (local.get $ptr))

            (func (export "deallocate") (param $ptr i32))

            (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
                (call $db_next (call $db_scan (i32.const 0) (i32.const 0) (i32.const 1))))
        )"#,
    )
    .unwrap()
}

/// Regression test for the dense-id/host-id mixup: each dispatcher call gets
/// a fresh `Environment` whose iterator registry always hands the contract
/// dense id 0 for its first `db_scan`, while a `SharedStorage` reused across
/// calls keeps handing out climbing host iterator ids (0, 1, ...). `db_next`
/// must translate the dense id back to the call's own host id rather than
/// using it directly, or a later call ends up reading a stale iterator left
/// over from an earlier one.
#[test]
fn db_next_resolves_dense_id_to_host_iterator_across_repeated_calls() {
    let vm = Vm::new(CacheOptions::default());
    let wasm = scan_first_contract_wat();
    let checksum = vm.store_code(&wasm, true).unwrap();

    let storage = SharedStorage::new();
    let mut seed = storage.clone();
    seed.set(b"a", b"1").0.unwrap();
    seed.set(b"b", b"2").0.unwrap();

    for _ in 0..2 {
        let (result, _) = vm
            .execute(
                &checksum,
                &mock_env_json("contract0"),
                &mock_info_json("creator", &[]),
                b"ping",
                MockApi::new(),
                storage.clone(),
                MockQuerier::new(),
                DEFAULT_GAS_LIMIT,
            )
            .unwrap();

        let key_len = u32::from_le_bytes(result[0..4].try_into().unwrap()) as usize;
        let key = &result[4..4 + key_len];
        let value = &result[4 + key_len..];
        assert_eq!(key, b"a", "every call scans fresh and must see the first key again");
        assert_eq!(value, b"1");
    }
}
