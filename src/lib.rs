//! Module cache, linear-memory marshalling, and entry-point dispatcher for
//! CosmWasm-style contract execution.
//!
//! The crate exposes two layers:
//! - the per-component API (`Cache`, `Region`, `Environment`, ...) for
//!   embedders that want fine-grained control over one step at a time;
//! - [`Vm`], a thin facade bundling a `Cache` with the dispatch methods
//!   under the same names a host embedding this engine expects to call.

pub mod analysis;
pub mod backend;
pub mod cache;
pub mod calls;
pub mod capabilities;
pub mod checksum;
pub mod environment;
pub mod errors;
pub mod gas;
pub mod imports;
pub mod instance;
pub mod memory;
pub mod region;
pub mod size;
pub mod wasm_backend;

/// Mock `Storage`/`BackendApi`/`Querier` implementations for tests. Gated
/// behind the `testing` Cargo feature (mirroring `cosmwasm-vm`'s own
/// `testing` feature) so a production host can never link it in by
/// accident; never wired in as the default capability impl.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use backend::{BackendApi, Querier, Storage};
use cache::{Cache, CacheOptions, Metrics, PinnedMetric};
use checksum::Checksum;
use errors::VmResult;
use gas::GasReport;

pub use analysis::AnalysisReport;
pub use backend::{GasInfo, Order};
pub use gas::GasReport as GasReportType;

/// The host-facing surface, mirroring the `InitCache`/`StoreCode`/entry
/// point method names of §6's external interface. Generic over the three
/// capability traits so a host can plug in its own store/api/querier.
pub struct Vm {
    cache: Cache,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm").finish()
    }
}

impl Vm {
    /// `InitCache`.
    pub fn new(options: CacheOptions) -> Self {
        Vm { cache: Cache::new(options) }
    }

    /// `ReleaseCache`. Consumes the VM; all compiled modules are dropped.
    pub fn release_cache(self) {
        tracing::info!("releasing module cache");
    }

    pub fn store_code(&self, wasm: &[u8], persist: bool) -> VmResult<Checksum> {
        self.cache.store_code(wasm, persist)
    }

    pub fn store_code_unchecked(&self, wasm: &[u8]) -> VmResult<Checksum> {
        self.cache.store_code_unchecked(wasm)
    }

    pub fn simulate_store_code(&self, wasm: &[u8]) -> VmResult<Checksum> {
        self.cache.simulate_store_code(wasm)
    }

    pub fn get_code(&self, checksum: &Checksum) -> VmResult<Vec<u8>> {
        self.cache.get_code(checksum)
    }

    pub fn remove_code(&self, checksum: &Checksum) -> VmResult<()> {
        self.cache.remove_code(checksum)
    }

    pub fn pin(&self, checksum: &Checksum) -> VmResult<()> {
        self.cache.pin(checksum)
    }

    pub fn unpin(&self, checksum: &Checksum) -> VmResult<()> {
        self.cache.unpin(checksum)
    }

    pub fn analyze_code(&self, checksum: &Checksum) -> VmResult<AnalysisReport> {
        self.cache.analyze(checksum)
    }

    pub fn get_metrics(&self) -> Metrics {
        self.cache.get_metrics()
    }

    pub fn get_pinned_metrics(&self) -> Vec<(Checksum, PinnedMetric)> {
        self.cache.get_pinned_metrics()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn instantiate<A, S, Q>(
        &self,
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
        calls::call_instantiate(&self.cache, checksum, env, info, msg, api, storage, querier, gas_limit)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn execute<A, S, Q>(
        &self,
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
        calls::call_execute(&self.cache, checksum, env, info, msg, api, storage, querier, gas_limit)
    }

    pub fn query<A, S, Q>(
        &self,
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
        calls::call_query(&self.cache, checksum, env, msg, api, storage, querier, gas_limit)
    }

    pub fn migrate<A, S, Q>(
        &self,
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
        calls::call_migrate(&self.cache, checksum, env, msg, api, storage, querier, gas_limit)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn migrate_with_info<A, S, Q>(
        &self,
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
        calls::call_migrate_with_info(&self.cache, checksum, env, migrate_info, msg, api, storage, querier, gas_limit)
    }

    pub fn sudo<A, S, Q>(
        &self,
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
        calls::call_sudo(&self.cache, checksum, env, msg, api, storage, querier, gas_limit)
    }

    pub fn reply<A, S, Q>(
        &self,
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
        calls::call_reply(&self.cache, checksum, env, reply_msg, api, storage, querier, gas_limit)
    }
}

macro_rules! ibc_method {
    ($method:ident, $call_fn:path) => {
        impl Vm {
            pub fn $method<A, S, Q>(
                &self,
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
                $call_fn(&self.cache, checksum, env, msg, api, storage, querier, gas_limit)
            }
        }
    };
}

ibc_method!(ibc_channel_open, calls::call_ibc_channel_open);
ibc_method!(ibc_channel_connect, calls::call_ibc_channel_connect);
ibc_method!(ibc_channel_close, calls::call_ibc_channel_close);
ibc_method!(ibc_packet_receive, calls::call_ibc_packet_receive);
ibc_method!(ibc_packet_ack, calls::call_ibc_packet_ack);
ibc_method!(ibc_packet_timeout, calls::call_ibc_packet_timeout);
ibc_method!(ibc_source_callback, calls::call_ibc_source_callback);
ibc_method!(ibc_destination_callback, calls::call_ibc_destination_callback);
