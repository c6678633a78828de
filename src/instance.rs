//! Builds one Wasm instance for a single dispatcher call: registers the
//! `env` namespace host functions against a fresh [`Environment`], then
//! instantiates the contract module against it. Both start functions are
//! disabled, matching steps 5-6 of the dispatcher algorithm.

use wasmer::{Function, FunctionEnv, Imports, Instance as WasmerInstance, Module, Store, TypedFunction};

use crate::backend::{BackendApi, Querier, Storage};
use crate::environment::Environment;
use crate::errors::{VmError, VmResult};
use crate::gas::GasReport;
use crate::imports;
use crate::memory::WasmFunctions;

#[derive(Debug, Clone, Copy)]
pub struct InstanceOptions {
    pub gas_limit: u64,
    pub print_debug: bool,
}

pub struct Instance<A: BackendApi, S: Storage, Q: Querier> {
    inner: WasmerInstance,
    store: Store,
    env: Environment<A, S, Q>,
}

impl<A, S, Q> Instance<A, S, Q>
where
    A: BackendApi + Send + 'static,
    S: Storage + Send + 'static,
    Q: Querier + Send + 'static,
{
    pub fn from_module(module: &Module, api: A, options: InstanceOptions) -> VmResult<Self> {
        let mut store = Store::default();
        let env = Environment::new(api, options.gas_limit, options.print_debug);
        let function_env = FunctionEnv::new(&mut store, env.clone());

        let mut import_object = Imports::new();
        let mut env_namespace = wasmer::Exports::new();
        env_namespace.insert("db_read", Function::new_typed_with_env(&mut store, &function_env, imports::do_db_read::<A, S, Q>));
        env_namespace.insert("db_write", Function::new_typed_with_env(&mut store, &function_env, imports::do_db_write::<A, S, Q>));
        env_namespace.insert("db_remove", Function::new_typed_with_env(&mut store, &function_env, imports::do_db_remove::<A, S, Q>));
        env_namespace.insert("db_scan", Function::new_typed_with_env(&mut store, &function_env, imports::do_db_scan::<A, S, Q>));
        env_namespace.insert("db_next", Function::new_typed_with_env(&mut store, &function_env, imports::do_db_next::<A, S, Q>));
        env_namespace.insert("addr_validate", Function::new_typed_with_env(&mut store, &function_env, imports::do_addr_validate::<A, S, Q>));
        env_namespace.insert("addr_canonicalize", Function::new_typed_with_env(&mut store, &function_env, imports::do_addr_canonicalize::<A, S, Q>));
        env_namespace.insert("addr_humanize", Function::new_typed_with_env(&mut store, &function_env, imports::do_addr_humanize::<A, S, Q>));
        env_namespace.insert("query_chain", Function::new_typed_with_env(&mut store, &function_env, imports::do_query_chain::<A, S, Q>));
        env_namespace.insert("secp256k1_verify", Function::new_typed_with_env(&mut store, &function_env, imports::do_secp256k1_verify::<A, S, Q>));
        env_namespace.insert("secp256k1_recover_pubkey", Function::new_typed_with_env(&mut store, &function_env, imports::do_secp256k1_recover_pubkey::<A, S, Q>));
        env_namespace.insert("ed25519_verify", Function::new_typed_with_env(&mut store, &function_env, imports::do_ed25519_verify::<A, S, Q>));
        env_namespace.insert("ed25519_batch_verify", Function::new_typed_with_env(&mut store, &function_env, imports::do_ed25519_batch_verify::<A, S, Q>));
        env_namespace.insert("abort", Function::new_typed_with_env(&mut store, &function_env, imports::do_abort::<A, S, Q>));
        env_namespace.insert("debug", Function::new_typed_with_env(&mut store, &function_env, imports::do_debug::<A, S, Q>));
        import_object.register_namespace("env", env_namespace);

        let instance = WasmerInstance::new(&mut store, module, &import_object)
            .map_err(|e| VmError::runtime_error(e.to_string()))?;

        let memory = instance
            .exports
            .get_memory("memory")
            .map_err(|e| VmError::runtime_error(format!("contract does not export memory: {e}")))?
            .clone();
        let allocate: TypedFunction<u32, u32> = instance
            .exports
            .get_typed_function(&store, "allocate")
            .map_err(|e| VmError::runtime_error(format!("contract does not export allocate: {e}")))?;
        let deallocate: TypedFunction<u32, ()> = instance
            .exports
            .get_typed_function(&store, "deallocate")
            .map_err(|e| VmError::runtime_error(format!("contract does not export deallocate: {e}")))?;

        env.set_memory(memory);
        env.set_wasm_functions(WasmFunctions { allocate, deallocate });

        Ok(Instance { inner: instance, store, env })
    }

    pub fn env(&self) -> &Environment<A, S, Q> {
        &self.env
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn write_to_memory(&mut self, data: &[u8]) -> VmResult<u32> {
        let env = self.env.clone();
        env.with_memory(|memory, funcs| crate::memory::write_to_memory(&mut self.store, memory, funcs, data))
    }

    pub fn read_from_memory(&self, ptr: u32) -> VmResult<Vec<u8>> {
        self.env.with_memory(|memory, _funcs| crate::memory::read_from_memory(&self.store, memory, ptr))
    }

    /// Invokes a contract entry point with the given Region-pointer
    /// arguments and returns the single result Region pointer it must
    /// produce. Any other return arity is a `ResultArityError`.
    pub fn call_entry_point(&mut self, name: &str, args: &[u32]) -> VmResult<u32> {
        let function = self
            .inner
            .exports
            .get_function(name)
            .map_err(|_| VmError::runtime_error(format!("contract does not export '{name}'")))?
            .clone();

        let wasm_args: Vec<wasmer::Value> = args.iter().map(|a| wasmer::Value::I32(*a as i32)).collect();
        let results = function
            .call(&mut self.store, &wasm_args)
            .map_err(VmError::from)?;

        if results.len() != 1 {
            return Err(VmError::result_arity_error(format!(
                "entry point '{name}' returned {} values, expected 1",
                results.len()
            )));
        }
        match &results[0] {
            wasmer::Value::I32(v) => Ok(*v as u32),
            other => Err(VmError::result_arity_error(format!("unexpected return type: {other:?}"))),
        }
    }

    pub fn gas_report(&self) -> GasReport {
        self.env.gas_report()
    }
}
