//! C7 — entry-point dispatcher. One algorithm, parameterised by entry point
//! name and whether it carries an `info` argument, shared by every call in
//! §6's host-to-runtime API.

use serde_json::Value;

use crate::backend::{BackendApi, Querier, Storage};
use crate::cache::Cache;
use crate::checksum::Checksum;
use crate::errors::{VmError, VmResult};
use crate::gas::GasReport;
use crate::instance::{Instance, InstanceOptions};

/// Entry points that additionally take an `info` Region, per §4.7 step 8.
const INFO_BEARING_ENTRY_POINTS: &[&str] = &["instantiate", "execute", "migrate"];

/// Verifies the env blob carries the three fields every contract version
/// requires, then returns it unchanged — adaptation/rewriting for older
/// contract versions is intentionally a no-op seam here; see DESIGN.md.
fn adapt_env(env: &[u8]) -> VmResult<Vec<u8>> {
    let parsed: Value = serde_json::from_slice(env)?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| VmError::input_validation("env must be a JSON object"))?;

    let chain_id = obj
        .get("block")
        .and_then(|b| b.get("chain_id"))
        .and_then(Value::as_str);
    if chain_id.map(str::is_empty).unwrap_or(true) {
        return Err(VmError::input_validation("env.block.chain_id must be a non-empty string"));
    }

    let contract_address = obj
        .get("contract")
        .and_then(|c| c.get("address"))
        .and_then(Value::as_str);
    if contract_address.map(str::is_empty).unwrap_or(true) {
        return Err(VmError::input_validation("env.contract.address must be a non-empty string"));
    }

    if !obj.contains_key("transaction") {
        return Err(VmError::input_validation("env.transaction must be present (nullable)"));
    }

    Ok(env.to_vec())
}

/// `query`'s extra rule: `msg` must be a JSON object with exactly one
/// top-level field.
fn validate_query_shape(msg: &[u8]) -> VmResult<()> {
    let parsed: Value = serde_json::from_slice(msg)?;
    let obj = parsed
        .as_object()
        .ok_or_else(|| VmError::input_validation("query msg must be a JSON object"))?;
    if obj.len() != 1 {
        return Err(VmError::input_validation(format!(
            "query msg must have exactly one top-level field, got {}",
            obj.len()
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn call_raw<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    info: Option<&[u8]>,
    msg: &[u8],
    entry_point: &str,
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
    print_debug: bool,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    let span = tracing::info_span!("dispatch", entry_point, checksum = %checksum, gas_limit);
    let _enter = span.enter();

    let wants_info = INFO_BEARING_ENTRY_POINTS.contains(&entry_point);
    if wants_info && info.is_none() {
        return Err(VmError::null_argument("info"));
    }
    if entry_point == "query" {
        validate_query_shape(msg)?;
    }

    let module = cache.get_instance_module(checksum)?;
    let adapted_env = adapt_env(env)?;

    let options = InstanceOptions { gas_limit, print_debug };
    let mut instance = Instance::from_module(&module, api, options)?;
    instance.env().set_storage(storage);
    instance.env().set_querier(querier);
    instance.env().set_storage_readonly(entry_point == "query");
    instance.env().begin_call();

    let run = (|| -> VmResult<(Vec<u8>, GasReport)> {
        let env_ptr = instance.write_to_memory(&adapted_env)?;
        let msg_ptr = instance.write_to_memory(msg)?;

        let mut args = vec![env_ptr];
        if wants_info {
            let info_ptr = instance.write_to_memory(info.unwrap())?;
            args.push(info_ptr);
        }
        args.push(msg_ptr);

        let result_ptr = instance.call_entry_point(entry_point, &args)?;
        let result = instance.read_from_memory(result_ptr)?;
        Ok((result, instance.gas_report()))
    })();

    instance.env().end_call();

    match &run {
        Ok((_, report)) => tracing::info!(remaining = report.remaining, used_internally = report.used_internally, "dispatch ok"),
        Err(err) => tracing::warn!(error = %err, "dispatch failed"),
    }

    run
}

#[allow(clippy::too_many_arguments)]
pub fn call_instantiate<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    info: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw(cache, checksum, env, Some(info), msg, "instantiate", api, storage, querier, gas_limit, false)
}

#[allow(clippy::too_many_arguments)]
pub fn call_execute<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    info: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw(cache, checksum, env, Some(info), msg, "execute", api, storage, querier, gas_limit, false)
}

pub fn call_query<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw(cache, checksum, env, None, msg, "query", api, storage, querier, gas_limit, false)
}

#[allow(clippy::too_many_arguments)]
pub fn call_migrate<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    // `migrate` is info-bearing per §4.7 but has no caller-supplied info in
    // the reference ABI beyond env+msg in the common path; the variant that
    // does carry one is `migrate_with_info`.
    call_raw_no_info(cache, checksum, env, msg, "migrate", api, storage, querier, gas_limit)
}

#[allow(clippy::too_many_arguments)]
pub fn call_migrate_with_info<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    migrate_info: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw(cache, checksum, env, Some(migrate_info), msg, "migrate", api, storage, querier, gas_limit, false)
}

#[allow(clippy::too_many_arguments)]
pub fn call_sudo<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw_no_info(cache, checksum, env, msg, "sudo", api, storage, querier, gas_limit)
}

#[allow(clippy::too_many_arguments)]
pub fn call_reply<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    reply_msg: &[u8],
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw_no_info(cache, checksum, env, reply_msg, "reply", api, storage, querier, gas_limit)
}

#[allow(clippy::too_many_arguments)]
fn call_raw_no_info<A, S, Q>(
    cache: &Cache,
    checksum: &Checksum,
    env: &[u8],
    msg: &[u8],
    entry_point: &str,
    api: A,
    storage: S,
    querier: Q,
    gas_limit: u64,
) -> VmResult<(Vec<u8>, GasReport)>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    call_raw(cache, checksum, env, None, msg, entry_point, api, storage, querier, gas_limit, false)
}

macro_rules! ibc_entry_point {
    ($fn_name:ident, $entry_point:literal) => {
        #[allow(clippy::too_many_arguments)]
        pub fn $fn_name<A, S, Q>(
            cache: &Cache,
            checksum: &Checksum,
            env: &[u8],
            msg: &[u8],
            api: A,
            storage: S,
            querier: Q,
            gas_limit: u64,
        ) -> VmResult<(Vec<u8>, GasReport)>
        where
            A: BackendApi + Send + 'static,
            S: Storage + Send + 'static,
            Q: Querier + Send + 'static,
        {
            call_raw_no_info(cache, checksum, env, msg, $entry_point, api, storage, querier, gas_limit)
        }
    };
}

ibc_entry_point!(call_ibc_channel_open, "ibc_channel_open");
ibc_entry_point!(call_ibc_channel_connect, "ibc_channel_connect");
ibc_entry_point!(call_ibc_channel_close, "ibc_channel_close");
ibc_entry_point!(call_ibc_packet_receive, "ibc_packet_receive");
ibc_entry_point!(call_ibc_packet_ack, "ibc_packet_ack");
ibc_entry_point!(call_ibc_packet_timeout, "ibc_packet_timeout");
ibc_entry_point!(call_ibc_source_callback, "ibc_source_callback");
ibc_entry_point!(call_ibc_destination_callback, "ibc_destination_callback");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapt_env_requires_chain_id_contract_address_and_transaction() {
        let ok = br#"{"block":{"chain_id":"testing"},"contract":{"address":"contract0"},"transaction":null}"#;
        assert!(adapt_env(ok).is_ok());

        let missing_chain_id = br#"{"block":{},"contract":{"address":"c"},"transaction":null}"#;
        assert!(adapt_env(missing_chain_id).is_err());

        let missing_transaction = br#"{"block":{"chain_id":"testing"},"contract":{"address":"c"}}"#;
        assert!(adapt_env(missing_transaction).is_err());
    }

    #[test]
    fn validate_query_shape_requires_single_field() {
        assert!(validate_query_shape(br#"{"raw":{"key":"config"}}"#).is_ok());
        assert!(validate_query_shape(br#"{"raw":{},"other":{}}"#).is_err());
        assert!(validate_query_shape(br#"{}"#).is_err());
        assert!(validate_query_shape(br#"[]"#).is_err());
    }
}
