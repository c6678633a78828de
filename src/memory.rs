//! C2 — memory manager. Operates on a single `(memory, allocate, deallocate)`
//! triple scoped to one dispatcher call; every function here reads or
//! writes through a [`Region`] and never assumes the contract's memory
//! outlives the call.

use wasmer::{AsStoreMut, AsStoreRef, Memory, TypedFunction};

use crate::errors::{VmError, VmResult};
use crate::region::{Region, REGION_SIZE};

/// The two contract-side exports the memory manager drives directly.
pub struct WasmFunctions {
    pub allocate: TypedFunction<u32, u32>,
    pub deallocate: TypedFunction<u32, ()>,
}

fn memory_byte_size(memory: &Memory, store: &impl AsStoreRef) -> u64 {
    memory.view(store).data_size()
}

fn read_region(memory: &Memory, store: &impl AsStoreRef, ptr: u32) -> VmResult<Region> {
    if ptr == 0 {
        return Err(VmError::region_validation_error("region pointer is null"));
    }
    let mut buf = [0u8; REGION_SIZE];
    memory
        .view(store)
        .read(ptr as u64, &mut buf)
        .map_err(|e| VmError::region_validation_error(e.to_string()))?;
    let region = Region::decode(&buf)?;
    region.validate(memory_byte_size(memory, store))?;
    Ok(region)
}

/// Copies `data` into freshly `allocate`d contract memory and returns the
/// Region pointer. A null/empty `data` slice still allocates a zero-length
/// region; callers that want the null pointer for "absent" pass `None`
/// through a higher layer (the `db_read`-style host functions), not here.
pub fn write_to_memory(
    store: &mut impl AsStoreMut,
    memory: &Memory,
    funcs: &WasmFunctions,
    data: &[u8],
) -> VmResult<u32> {
    let region_and_payload_len = (data.len() as u32)
        .checked_add(REGION_SIZE as u32)
        .ok_or_else(|| VmError::region_validation_error("payload too large"))?;

    let region_ptr = funcs
        .allocate
        .call(store, region_and_payload_len)
        .map_err(VmError::from)?;

    let result = (|| -> VmResult<u32> {
        let offset = region_ptr
            .checked_add(REGION_SIZE as u32)
            .ok_or_else(|| VmError::region_validation_error("region offset overflow"))?;
        let region = Region::new(offset, data.len() as u32, data.len() as u32);
        region.validate(memory_byte_size(memory, store))?;

        memory
            .view(store)
            .write(region_ptr as u64, &region.encode())
            .map_err(|e| VmError::region_validation_error(e.to_string()))?;
        if !data.is_empty() {
            memory
                .view(store)
                .write(offset as u64, data)
                .map_err(|e| VmError::region_validation_error(e.to_string()))?;
        }
        Ok(region_ptr)
    })();

    match result {
        Ok(ptr) => Ok(ptr),
        Err(err) => {
            // Best-effort: never let a failed write leak the allocation.
            let _ = funcs.deallocate.call(store, region_ptr);
            Err(err)
        }
    }
}

/// Reads the Region at `ptr`, validates it, and returns an owned copy of
/// its payload. The contract's memory may be reused after this returns, so
/// callers must not hold onto borrows into it.
pub fn read_from_memory(
    store: &impl AsStoreRef,
    memory: &Memory,
    ptr: u32,
) -> VmResult<Vec<u8>> {
    let region = read_region(memory, store, ptr)?;
    let mut buf = vec![0u8; region.length as usize];
    if region.length > 0 {
        memory
            .view(store)
            .read(region.offset as u64, &mut buf)
            .map_err(|e| VmError::region_validation_error(e.to_string()))?;
    }
    Ok(buf)
}

/// `writeToMemory` but for the "maybe absent" shape `db_read` needs: `None`
/// maps to the null pointer without allocating anything.
pub fn write_optional_to_memory(
    store: &mut impl AsStoreMut,
    memory: &Memory,
    funcs: &WasmFunctions,
    data: Option<&[u8]>,
) -> VmResult<u32> {
    match data {
        None => Ok(0),
        Some(bytes) => write_to_memory(store, memory, funcs, bytes),
    }
}

pub fn deallocate(store: &mut impl AsStoreMut, funcs: &WasmFunctions, ptr: u32) -> VmResult<()> {
    if ptr == 0 {
        return Ok(());
    }
    funcs.deallocate.call(store, ptr).map_err(VmError::from)
}
