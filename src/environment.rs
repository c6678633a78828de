//! C5 — host-function environment. Holds everything a host function needs
//! to see: the caller-supplied store/api/querier, the gas meter, and the
//! iterator registry. Constructed fresh at the top of every dispatcher
//! call and never shared across calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wasmer::Memory;

use crate::backend::{BackendApi, Querier, Storage};
use crate::errors::{VmError, VmResult};
use crate::gas::{GasReport, GasState};
use crate::memory::WasmFunctions;

/// Two-level iterator registry: `call_id -> iter_id -> host-assigned
/// iterator handle`. The host `Storage` owns the actual iterator state (its
/// `scan`/`next` capability) under its own id space; the registry maps the
/// dense, per-call id handed back to the contract to the `host_iter_id`
/// `Storage::scan` actually returned, so `db_next` can translate back
/// regardless of how the host's id space is laid out across calls.
#[derive(Debug, Default)]
struct IteratorRegistry {
    next_call_id: u64,
    current_call_id: u64,
    next_iter_id: HashMap<u64, u32>,
    open: HashMap<u64, HashMap<u32, u32>>,
}

impl IteratorRegistry {
    fn begin_call(&mut self) -> u64 {
        let id = self.next_call_id;
        self.next_call_id += 1;
        self.current_call_id = id;
        self.next_iter_id.insert(id, 0);
        self.open.insert(id, HashMap::new());
        id
    }

    /// Records `host_iter_id` under a fresh dense id for the current call
    /// and returns that dense id — the value the contract actually sees.
    fn register_iterator(&mut self, host_iter_id: u32) -> u32 {
        let call_id = self.current_call_id;
        let counter = self.next_iter_id.entry(call_id).or_insert(0);
        let dense_id = *counter;
        *counter += 1;
        self.open.entry(call_id).or_default().insert(dense_id, host_iter_id);
        dense_id
    }

    /// Translates a contract-supplied dense id back to the host's own
    /// iterator handle, scoped to one call so nested calls never alias.
    fn resolve(&self, call_id: u64, dense_id: u32) -> Option<u32> {
        self.open.get(&call_id).and_then(|m| m.get(&dense_id)).copied()
    }

    fn open_count(&self, call_id: u64) -> usize {
        self.open.get(&call_id).map(HashMap::len).unwrap_or(0)
    }

    fn end_call(&mut self, call_id: u64) {
        self.open.remove(&call_id);
        self.next_iter_id.remove(&call_id);
    }
}

pub(crate) struct ContextData<S, Q> {
    pub storage: Option<S>,
    pub storage_readonly: bool,
    pub querier: Option<Q>,
    pub wasm_functions: Option<WasmFunctions>,
    pub memory: Option<Memory>,
    iterators: IteratorRegistry,
}

impl<S, Q> ContextData<S, Q> {
    fn new() -> Self {
        ContextData {
            storage: None,
            storage_readonly: false,
            querier: None,
            wasm_functions: None,
            memory: None,
            iterators: IteratorRegistry::default(),
        }
    }
}

/// Cloneable handle passed into every host-function closure via
/// `FunctionEnv`. Cloning shares the same underlying call state; one
/// `Environment` is created per dispatcher call and never reused.
pub struct Environment<A: BackendApi, S: Storage, Q: Querier> {
    pub api: A,
    pub print_debug: bool,
    gas_state: Arc<Mutex<GasState>>,
    data: Arc<Mutex<ContextData<S, Q>>>,
    call_id: Arc<Mutex<Option<u64>>>,
}

impl<A: BackendApi, S: Storage, Q: Querier> Clone for Environment<A, S, Q> {
    fn clone(&self) -> Self {
        Environment {
            api: self.api.clone(),
            print_debug: self.print_debug,
            gas_state: self.gas_state.clone(),
            data: self.data.clone(),
            call_id: self.call_id.clone(),
        }
    }
}

impl<A: BackendApi, S: Storage, Q: Querier> Environment<A, S, Q> {
    pub fn new(api: A, gas_limit: u64, print_debug: bool) -> Self {
        Environment {
            api,
            print_debug,
            gas_state: Arc::new(Mutex::new(GasState::new(gas_limit))),
            data: Arc::new(Mutex::new(ContextData::new())),
            call_id: Arc::new(Mutex::new(None)),
        }
    }

    pub fn begin_call(&self) {
        let mut data = self.data.lock().unwrap();
        let id = data.iterators.begin_call();
        *self.call_id.lock().unwrap() = Some(id);
    }

    /// Closes every iterator opened during this call, regardless of how
    /// the call ended. Must run on every exit path.
    pub fn end_call(&self) {
        let call_id = self.call_id.lock().unwrap().take();
        if let Some(id) = call_id {
            self.data.lock().unwrap().iterators.end_call(id);
        }
    }

    pub fn open_iterator_count(&self) -> usize {
        let data = self.data.lock().unwrap();
        match *self.call_id.lock().unwrap() {
            Some(id) => data.iterators.open_count(id),
            None => 0,
        }
    }

    pub fn register_iterator(&self, host_iter_id: u32) -> u32 {
        self.data.lock().unwrap().iterators.register_iterator(host_iter_id)
    }

    /// Translates a dense iterator id the contract passed to `db_next` back
    /// into the id the host `Storage` recognizes.
    pub fn resolve_iterator(&self, dense_id: u32) -> VmResult<u32> {
        let call_id = self
            .call_id
            .lock()
            .unwrap()
            .ok_or_else(|| VmError::runtime_error("no active call"))?;
        self.data
            .lock()
            .unwrap()
            .iterators
            .resolve(call_id, dense_id)
            .ok_or_else(|| VmError::backend_error("unknown iterator id"))
    }

    pub fn set_storage(&self, storage: S) {
        self.data.lock().unwrap().storage = Some(storage);
    }

    pub fn take_storage(&self) -> Option<S> {
        self.data.lock().unwrap().storage.take()
    }

    pub fn set_storage_readonly(&self, readonly: bool) {
        self.data.lock().unwrap().storage_readonly = readonly;
    }

    pub fn is_storage_readonly(&self) -> bool {
        self.data.lock().unwrap().storage_readonly
    }

    pub fn set_querier(&self, querier: Q) {
        self.data.lock().unwrap().querier = Some(querier);
    }

    pub fn take_querier(&self) -> Option<Q> {
        self.data.lock().unwrap().querier.take()
    }

    pub fn set_wasm_functions(&self, funcs: WasmFunctions) {
        self.data.lock().unwrap().wasm_functions = Some(funcs);
    }

    pub fn set_memory(&self, memory: Memory) {
        self.data.lock().unwrap().memory = Some(memory);
    }

    pub fn with_storage<R>(&self, f: impl FnOnce(&mut S) -> R) -> VmResult<R> {
        let mut data = self.data.lock().unwrap();
        let storage = data
            .storage
            .as_mut()
            .ok_or_else(|| VmError::runtime_error("storage is not set"))?;
        Ok(f(storage))
    }

    pub fn with_querier<R>(&self, f: impl FnOnce(&Q) -> R) -> VmResult<R> {
        let data = self.data.lock().unwrap();
        let querier = data
            .querier
            .as_ref()
            .ok_or_else(|| VmError::runtime_error("querier is not set"))?;
        Ok(f(querier))
    }

    pub fn with_memory<R>(&self, f: impl FnOnce(&Memory, &WasmFunctions) -> VmResult<R>) -> VmResult<R> {
        let data = self.data.lock().unwrap();
        let memory = data
            .memory
            .as_ref()
            .ok_or_else(|| VmError::runtime_error("instance memory is not set"))?;
        let funcs = data
            .wasm_functions
            .as_ref()
            .ok_or_else(|| VmError::runtime_error("allocate/deallocate exports are not set"))?;
        f(memory, funcs)
    }

    /// Charges `amount` of gas immediately on the contract's own behalf.
    /// Returns `GasDepletion` without performing the caller's work if this
    /// exceeds the limit.
    pub fn charge_gas(&self, amount: u64) -> VmResult<()> {
        self.gas_state.lock().unwrap().charge(amount)
    }

    /// Charges `amount` attributed to host work done for the contract (a
    /// querier round trip).
    pub fn charge_external_gas(&self, amount: u64) -> VmResult<()> {
        self.gas_state.lock().unwrap().charge_external(amount)
    }

    pub fn gas_left(&self) -> u64 {
        self.gas_state.lock().unwrap().gas_left()
    }

    pub fn gas_report(&self) -> GasReport {
        self.gas_state.lock().unwrap().report()
    }
}
