//! Capability interfaces the host supplies to a call. The runtime owns no
//! lifetime of these collaborators beyond the current dispatcher call and
//! stores them behind a tagged variant (`Environment`), never as trait
//! objects with 'static bounds.

use crate::errors::VmResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending = 1,
    Descending = 2,
}

impl Order {
    pub fn from_i32(value: i32) -> VmResult<Self> {
        match value {
            1 => Ok(Order::Ascending),
            2 => Ok(Order::Descending),
            other => Err(crate::errors::VmError::input_validation(format!(
                "unknown iterator order: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GasInfo {
    pub cost: u64,
    pub externally_used: u64,
}

impl GasInfo {
    pub fn with_cost(cost: u64) -> Self {
        GasInfo { cost, externally_used: 0 }
    }

    pub fn free() -> Self {
        GasInfo::default()
    }
}

/// A host-supplied KV store. `scan` returns an iterator handle the
/// environment owns; `Storage` implementations need not be `Send`/`Sync`
/// since a call never crosses threads.
pub trait Storage {
    fn get(&self, key: &[u8]) -> (VmResult<Option<Vec<u8>>>, GasInfo);
    fn set(&mut self, key: &[u8], value: &[u8]) -> (VmResult<()>, GasInfo);
    fn remove(&mut self, key: &[u8]) -> (VmResult<()>, GasInfo);

    /// Opens an iterator over `[start, end)` and returns a handle the caller
    /// uses with `next`. Empty bounds mean unbounded on that side.
    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> (VmResult<u32>, GasInfo);

    fn next(&mut self, iterator_id: u32) -> (VmResult<Option<(Vec<u8>, Vec<u8>)>>, GasInfo);
}

/// Address validation/canonicalization. Implementations decide the human
/// and canonical encodings (a reversible byte-swap for the test host, see
/// `testing::MockApi`; a real chain would use bech32).
pub trait BackendApi: Clone {
    fn canonical_address(&self, human: &str) -> (VmResult<Vec<u8>>, GasInfo);
    fn human_address(&self, canonical: &[u8]) -> (VmResult<String>, GasInfo);
}

#[derive(Debug, Clone)]
pub struct QueryRequest(pub Vec<u8>);

pub trait Querier {
    fn query_raw(&self, request: &[u8], gas_limit: u64) -> (VmResult<Vec<u8>>, GasInfo);
}
