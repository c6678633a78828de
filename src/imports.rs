//! C6 — the host-function surface. Every function here is registered
//! under the `env` namespace and is what the contract actually calls
//! through its own `extern "C"` declarations. Arguments and results are
//! Region pointers (`u32`) or scalar flags/gas counts, per the ABI.

use ed25519_dalek::{Signature as EdSignature, Verifier as EdVerifier, VerifyingKey as EdVerifyingKey};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use wasmer::{FunctionEnvMut, RuntimeError};

use crate::backend::{BackendApi, Order, Querier, Storage};
use crate::environment::Environment;
use crate::errors::VmError;
use crate::gas::{
    GAS_COST_ADDR_VALIDATE, GAS_COST_CANONICALIZE, GAS_COST_DB_NEXT, GAS_COST_DB_READ,
    GAS_COST_DB_REMOVE, GAS_COST_DB_SCAN, GAS_COST_DB_WRITE, GAS_COST_DEBUG,
    GAS_COST_ED25519_BATCH_VERIFY_BASE, GAS_COST_ED25519_BATCH_VERIFY_PER_ITEM,
    GAS_COST_ED25519_VERIFY, GAS_COST_HUMANIZE, GAS_COST_PER_REQUEST_BYTE,
    GAS_COST_SECP256K1_RECOVER_PUBKEY, GAS_COST_SECP256K1_VERIFY,
};
use crate::memory::{read_from_memory, write_optional_to_memory, write_to_memory};

fn to_rt(e: VmError) -> RuntimeError {
    RuntimeError::user(Box::new(e))
}

fn read_region<A, S, Q>(
    fenv: &FunctionEnvMut<'_, Environment<A, S, Q>>,
    ptr: u32,
) -> Result<Vec<u8>, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let env = fenv.data().clone();
    env.with_memory(|memory, _funcs| read_from_memory(fenv, memory, ptr))
        .map_err(to_rt)
}

fn write_region<A, S, Q>(
    fenv: &mut FunctionEnvMut<'_, Environment<A, S, Q>>,
    data: &[u8],
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let env = fenv.data().clone();
    let (_, mut store) = fenv.data_and_store_mut();
    env.with_memory(|memory, funcs| write_to_memory(&mut store, memory, funcs, data))
        .map_err(to_rt)
}

fn write_optional_region<A, S, Q>(
    fenv: &mut FunctionEnvMut<'_, Environment<A, S, Q>>,
    data: Option<&[u8]>,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let env = fenv.data().clone();
    let (_, mut store) = fenv.data_and_store_mut();
    env.with_memory(|memory, funcs| write_optional_to_memory(&mut store, memory, funcs, data))
        .map_err(to_rt)
}

pub fn do_db_read<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, key_ptr: u32) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let key = read_region(&fenv, key_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_DB_READ).map_err(to_rt)?;
    let (result, gas_info) = env.with_storage(|s| s.get(&key)).map_err(to_rt)?;
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    let value = result.map_err(to_rt)?;
    write_optional_region(&mut fenv, value.as_deref())
}

pub fn do_db_write<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    key_ptr: u32,
    value_ptr: u32,
) -> Result<(), RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let key = read_region(&fenv, key_ptr)?;
    let value = read_region(&fenv, value_ptr)?;
    let env = fenv.data().clone();
    if env.is_storage_readonly() {
        return Err(to_rt(VmError::backend_error("cannot write to storage during a read-only call")));
    }
    env.charge_gas(GAS_COST_DB_WRITE).map_err(to_rt)?;
    let (result, gas_info) = env.with_storage(|s| s.set(&key, &value)).map_err(to_rt)?;
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    result.map_err(to_rt)
}

pub fn do_db_remove<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, key_ptr: u32) -> Result<(), RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let key = read_region(&fenv, key_ptr)?;
    let env = fenv.data().clone();
    if env.is_storage_readonly() {
        return Err(to_rt(VmError::backend_error("cannot write to storage during a read-only call")));
    }
    env.charge_gas(GAS_COST_DB_REMOVE).map_err(to_rt)?;
    let (result, gas_info) = env.with_storage(|s| s.remove(&key)).map_err(to_rt)?;
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    result.map_err(to_rt)
}

pub fn do_db_scan<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    start_ptr: u32,
    end_ptr: u32,
    order: i32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let start = if start_ptr == 0 { None } else { Some(read_region(&fenv, start_ptr)?) };
    let end = if end_ptr == 0 { None } else { Some(read_region(&fenv, end_ptr)?) };
    let order = Order::from_i32(order).map_err(to_rt)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_DB_SCAN).map_err(to_rt)?;
    let (result, gas_info) = env
        .with_storage(|s| s.scan(start.as_deref(), end.as_deref(), order))
        .map_err(to_rt)?;
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    let host_iter_id = result.map_err(to_rt)?;
    Ok(env.register_iterator(host_iter_id))
}

pub fn do_db_next<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, iterator_id: u32) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_DB_NEXT).map_err(to_rt)?;
    let host_iter_id = env.resolve_iterator(iterator_id).map_err(to_rt)?;
    let (result, gas_info) = env.with_storage(|s| s.next(host_iter_id)).map_err(to_rt)?;
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    match result.map_err(to_rt)? {
        // Exhausted: an empty, non-null Region, not the null pointer —
        // a contract-side wrapper dereferences the returned Region.
        None => write_region(&mut fenv, &[]),
        Some((key, value)) => {
            let mut encoded = (key.len() as u32).to_le_bytes().to_vec();
            encoded.extend_from_slice(&key);
            encoded.extend_from_slice(&value);
            write_region(&mut fenv, &encoded)
        }
    }
}

pub fn do_addr_validate<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, source_ptr: u32) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let human = read_region(&fenv, source_ptr)?;
    let human = String::from_utf8(human).map_err(|e| to_rt(VmError::input_validation(e.to_string())))?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_ADDR_VALIDATE).map_err(to_rt)?;
    let (result, gas_info) = env.api.canonical_address(&human);
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    match result {
        Ok(_) => Ok(0),
        Err(err) => write_region(&mut fenv, err.to_string().as_bytes()),
    }
}

pub fn do_addr_canonicalize<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    source_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let human = read_region(&fenv, source_ptr)?;
    let human = String::from_utf8(human).map_err(|e| to_rt(VmError::input_validation(e.to_string())))?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_CANONICALIZE).map_err(to_rt)?;
    let (result, gas_info) = env.api.canonical_address(&human);
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    let canonical = result.map_err(to_rt)?;
    write_region(&mut fenv, &canonical)
}

pub fn do_addr_humanize<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    source_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let canonical = read_region(&fenv, source_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_HUMANIZE).map_err(to_rt)?;
    let (result, gas_info) = env.api.human_address(&canonical);
    if gas_info.externally_used > 0 {
        env.charge_external_gas(gas_info.externally_used).map_err(to_rt)?;
    }
    let human = result.map_err(to_rt)?;
    write_region(&mut fenv, human.as_bytes())
}

pub fn do_query_chain<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    request_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let mut fenv = fenv;
    let request = read_region(&fenv, request_ptr)?;
    let env = fenv.data().clone();
    let sub_gas_limit = env.gas_left();
    env.charge_gas((request.len() as u64) * GAS_COST_PER_REQUEST_BYTE).map_err(to_rt)?;
    let (result, gas_info) = env.with_querier(|q| q.query_raw(&request, sub_gas_limit)).map_err(to_rt)?;
    env.charge_external_gas(gas_info.externally_used.max(gas_info.cost)).map_err(to_rt)?;
    let response = result.map_err(to_rt)?;
    write_region(&mut fenv, &response)
}

pub fn do_secp256k1_verify<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    hash_ptr: u32,
    sig_ptr: u32,
    pubkey_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let hash = read_region(&fenv, hash_ptr)?;
    let sig = read_region(&fenv, sig_ptr)?;
    let pubkey = read_region(&fenv, pubkey_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_SECP256K1_VERIFY).map_err(to_rt)?;

    let verifying_key = match VerifyingKey::from_sec1_bytes(&pubkey) {
        Ok(key) => key,
        Err(_) => return Ok(2),
    };
    let signature = match EcdsaSignature::from_slice(&sig) {
        Ok(s) => s,
        Err(_) => return Ok(3),
    };
    match verifying_key.verify_prehash(&hash, &signature) {
        Ok(()) => Ok(0),
        Err(_) => Ok(1),
    }
}

pub fn do_secp256k1_recover_pubkey<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    hash_ptr: u32,
    sig_ptr: u32,
    recovery_param: u32,
) -> Result<u64, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let hash = read_region(&fenv, hash_ptr)?;
    let sig = read_region(&fenv, sig_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_SECP256K1_RECOVER_PUBKEY).map_err(to_rt)?;

    let signature = match EcdsaSignature::from_slice(&sig) {
        Ok(s) => s,
        Err(_) => return Ok(pack_error(3)),
    };
    let recovery_id = match RecoveryId::from_byte(recovery_param as u8) {
        Some(id) => id,
        None => return Ok(pack_error(4)),
    };
    match VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id) {
        Ok(key) => {
            let mut fenv = fenv;
            let encoded = key.to_encoded_point(false);
            let ptr = write_region(&mut fenv, encoded.as_bytes())?;
            Ok(ptr as u64)
        }
        Err(_) => Ok(pack_error(5)),
    }
}

fn pack_error(code: u32) -> u64 {
    (code as u64) << 32
}

pub fn do_ed25519_verify<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    msg_ptr: u32,
    sig_ptr: u32,
    pubkey_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let msg = read_region(&fenv, msg_ptr)?;
    let sig = read_region(&fenv, sig_ptr)?;
    let pubkey = read_region(&fenv, pubkey_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_ED25519_VERIFY).map_err(to_rt)?;
    Ok(ed25519_verify_one(&msg, &sig, &pubkey))
}

fn ed25519_verify_one(msg: &[u8], sig: &[u8], pubkey: &[u8]) -> u32 {
    let Ok(pubkey_bytes): Result<[u8; 32], _> = pubkey.try_into() else {
        return 2;
    };
    let Ok(verifying_key) = EdVerifyingKey::from_bytes(&pubkey_bytes) else {
        return 2;
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = sig.try_into() else {
        return 3;
    };
    let signature = EdSignature::from_bytes(&sig_bytes);
    match verifying_key.verify(msg, &signature) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

pub fn do_ed25519_batch_verify<A, S, Q>(
    fenv: FunctionEnvMut<'_, Environment<A, S, Q>>,
    messages_ptr: u32,
    signatures_ptr: u32,
    public_keys_ptr: u32,
) -> Result<u32, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let messages = read_length_prefixed_list(&fenv, messages_ptr)?;
    let signatures = read_length_prefixed_list(&fenv, signatures_ptr)?;
    let public_keys = read_length_prefixed_list(&fenv, public_keys_ptr)?;

    let env = fenv.data().clone();
    let charge = GAS_COST_ED25519_BATCH_VERIFY_BASE
        + GAS_COST_ED25519_BATCH_VERIFY_PER_ITEM * messages.len().max(1) as u64;
    env.charge_gas(charge).map_err(to_rt)?;

    if messages.len() != signatures.len() || (public_keys.len() != 1 && public_keys.len() != messages.len()) {
        return Ok(10);
    }
    for (i, msg) in messages.iter().enumerate() {
        let pubkey = if public_keys.len() == 1 { &public_keys[0] } else { &public_keys[i] };
        let code = ed25519_verify_one(msg, &signatures[i], pubkey);
        if code != 0 {
            return Ok(code);
        }
    }
    Ok(0)
}

/// Decodes a region whose payload is a sequence of 4-byte-length-prefixed
/// byte strings, the wire shape `ed25519_batch_verify` uses for its three
/// list arguments.
fn read_length_prefixed_list<A, S, Q>(
    fenv: &FunctionEnvMut<'_, Environment<A, S, Q>>,
    ptr: u32,
) -> Result<Vec<Vec<u8>>, RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let raw = read_region(fenv, ptr)?;
    let mut items = Vec::new();
    let mut cursor = 0usize;
    while cursor + 4 <= raw.len() {
        let len = u32::from_le_bytes(raw[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if cursor + len > raw.len() {
            return Err(to_rt(VmError::input_validation("malformed length-prefixed list")));
        }
        items.push(raw[cursor..cursor + len].to_vec());
        cursor += len;
    }
    Ok(items)
}

pub fn do_abort<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, msg_ptr: u32) -> Result<(), RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let msg = read_region(&fenv, msg_ptr)?;
    let msg = String::from_utf8_lossy(&msg).into_owned();
    tracing::warn!(%msg, "contract called abort");
    Err(to_rt(VmError::contract_abort(msg)))
}

pub fn do_debug<A, S, Q>(fenv: FunctionEnvMut<'_, Environment<A, S, Q>>, msg_ptr: u32) -> Result<(), RuntimeError>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let msg = read_region(&fenv, msg_ptr)?;
    let env = fenv.data().clone();
    env.charge_gas(GAS_COST_DEBUG).map_err(to_rt)?;
    if env.print_debug {
        tracing::debug!(contract_message = %String::from_utf8_lossy(&msg), "contract debug");
    }
    Ok(())
}
