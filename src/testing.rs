//! Mock host collaborators, gated behind the `testing` Cargo feature so they
//! can never be mistaken for production `Storage`/`BackendApi`/`Querier`
//! implementations (open question in the design notes, resolved: mocks are
//! test-only).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::backend::{BackendApi, GasInfo, Order, Querier, Storage};
use crate::errors::{VmError, VmResult};

#[derive(Debug, Default)]
pub struct MockStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    iterators: HashMap<u32, std::vec::IntoIter<(Vec<u8>, Vec<u8>)>>,
    next_iterator_id: u32,
}

impl MockStorage {
    pub fn new() -> Self {
        MockStorage::default()
    }
}

impl Storage for MockStorage {
    fn get(&self, key: &[u8]) -> (VmResult<Option<Vec<u8>>>, GasInfo) {
        (Ok(self.data.get(key).cloned()), GasInfo::free())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> (VmResult<()>, GasInfo) {
        self.data.insert(key.to_vec(), value.to_vec());
        (Ok(()), GasInfo::free())
    }

    fn remove(&mut self, key: &[u8]) -> (VmResult<()>, GasInfo) {
        self.data.remove(key);
        (Ok(()), GasInfo::free())
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> (VmResult<u32>, GasInfo) {
        let mut items: Vec<(Vec<u8>, Vec<u8>)> = self
            .data
            .range(range_bounds(start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if order == Order::Descending {
            items.reverse();
        }
        let id = self.next_iterator_id;
        self.next_iterator_id += 1;
        self.iterators.insert(id, items.into_iter());
        (Ok(id), GasInfo::free())
    }

    fn next(&mut self, iterator_id: u32) -> (VmResult<Option<(Vec<u8>, Vec<u8>)>>, GasInfo) {
        match self.iterators.get_mut(&iterator_id) {
            Some(iter) => (Ok(iter.next()), GasInfo::free()),
            None => (Err(VmError::backend_error("unknown iterator id")), GasInfo::free()),
        }
    }
}

fn range_bounds(
    start: Option<&[u8]>,
    end: Option<&[u8]>,
) -> (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>) {
    use std::ops::Bound;
    let lower = match start {
        Some(s) if !s.is_empty() => Bound::Included(s.to_vec()),
        _ => Bound::Unbounded,
    };
    let upper = match end {
        Some(e) if !e.is_empty() => Bound::Excluded(e.to_vec()),
        _ => Bound::Unbounded,
    };
    (lower, upper)
}

/// Clone-cheap handle around a [`MockStorage`], so a test can hand the same
/// backing map to several dispatcher calls in a row the way a real host's
/// storage reference outlives any single call. Dispatcher calls run
/// synchronously one at a time (§5), so a plain mutex is enough.
#[derive(Debug, Clone, Default)]
pub struct SharedStorage(Arc<Mutex<MockStorage>>);

impl SharedStorage {
    pub fn new() -> Self {
        SharedStorage::default()
    }
}

impl Storage for SharedStorage {
    fn get(&self, key: &[u8]) -> (VmResult<Option<Vec<u8>>>, GasInfo) {
        self.0.lock().unwrap().get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> (VmResult<()>, GasInfo) {
        self.0.lock().unwrap().set(key, value)
    }

    fn remove(&mut self, key: &[u8]) -> (VmResult<()>, GasInfo) {
        self.0.lock().unwrap().remove(key)
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> (VmResult<u32>, GasInfo) {
        self.0.lock().unwrap().scan(start, end, order)
    }

    fn next(&mut self, iterator_id: u32) -> (VmResult<Option<(Vec<u8>, Vec<u8>)>>, GasInfo) {
        self.0.lock().unwrap().next(iterator_id)
    }
}

/// Reversible, non-cryptographic address scheme: canonicalization reverses
/// the human string's bytes. Good enough to exercise the ABI round trip
/// without depending on a real bech32-addressed chain.
#[derive(Debug, Clone, Default)]
pub struct MockApi;

impl MockApi {
    pub fn new() -> Self {
        MockApi
    }
}

impl BackendApi for MockApi {
    fn canonical_address(&self, human: &str) -> (VmResult<Vec<u8>>, GasInfo) {
        if human.is_empty() {
            return (Err(VmError::input_validation("empty address")), GasInfo::free());
        }
        if human.len() > 90 {
            return (Err(VmError::input_validation("address too long")), GasInfo::free());
        }
        let mut bytes = human.as_bytes().to_vec();
        bytes.reverse();
        (Ok(bytes), GasInfo::free())
    }

    fn human_address(&self, canonical: &[u8]) -> (VmResult<String>, GasInfo) {
        let mut bytes = canonical.to_vec();
        bytes.reverse();
        match String::from_utf8(bytes) {
            Ok(human) => (Ok(human), GasInfo::free()),
            Err(_) => (Err(VmError::input_validation("canonical address is not valid utf8")), GasInfo::free()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockQuerier;

impl MockQuerier {
    pub fn new() -> Self {
        MockQuerier
    }
}

impl Querier for MockQuerier {
    fn query_raw(&self, _request: &[u8], _gas_limit: u64) -> (VmResult<Vec<u8>>, GasInfo) {
        (Ok(b"{}".to_vec()), GasInfo::with_cost(250))
    }
}

/// A minimal but well-formed `env` blob satisfying the adaptation contract
/// (`block.chain_id`, `contract.address`, `transaction` all present).
pub fn mock_env_json(contract_address: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "block": { "height": 1, "time": "1", "chain_id": "testing" },
        "transaction": null,
        "contract": { "address": contract_address },
    }))
    .unwrap()
}

pub fn mock_info_json(sender: &str, funds: &[(&str, &str)]) -> Vec<u8> {
    let coins: Vec<_> = funds
        .iter()
        .map(|(denom, amount)| serde_json::json!({ "denom": denom, "amount": amount }))
        .collect();
    serde_json::to_vec(&serde_json::json!({ "sender": sender, "funds": coins })).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_api_round_trips_addresses() {
        let api = MockApi::new();
        let (canonical, _) = api.canonical_address("creator");
        let canonical = canonical.unwrap();
        let (human, _) = api.human_address(&canonical);
        assert_eq!(human.unwrap(), "creator");
    }

    #[test]
    fn mock_storage_scan_respects_order() {
        let mut storage = MockStorage::new();
        storage.set(b"a", b"1");
        storage.set(b"b", b"2");
        storage.set(b"c", b"3");

        let (iter_id, _) = storage.scan(None, None, Order::Ascending);
        let iter_id = iter_id.unwrap();
        let mut collected = Vec::new();
        while let (Ok(Some(kv)), _) = storage.next(iter_id) {
            collected.push(kv);
        }
        assert_eq!(collected, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
    }

    #[test]
    fn mock_storage_exhausted_iterator_returns_none() {
        let mut storage = MockStorage::new();
        storage.set(b"a", b"1");
        let (iter_id, _) = storage.scan(None, None, Order::Ascending);
        let iter_id = iter_id.unwrap();
        let _ = storage.next(iter_id);
        let (result, _) = storage.next(iter_id);
        assert_eq!(result.unwrap(), None);
    }
}
