use anyhow::{Context as _, Result};
use wasmtime::{Engine, Linker, Module, Store, TypedFunc};

use crate::engine::linker::link_imports;
use crate::engine::module::{FirmwareModule, ENTRY_EXPORT, MEMORY_EXPORT, TICK_EXPORT};
use crate::engine::store::RunStore;

/// An instantiated firmware module together with its store and resolved
/// exports. Exactly one exists per live run; a restart drops it, and with it
/// the linear memory and every import closure.
pub(crate) struct FirmwareInstance {
    store: Store<RunStore>,
    entry_func: TypedFunc<(), ()>,
    tick_func: TypedFunc<(u32, u32), u32>,
}

impl FirmwareInstance {
    pub(crate) async fn new(module: &FirmwareModule, data: RunStore) -> Result<Self> {
        let mut config = wasmtime::Config::new();
        config.async_support(true);
        config.wasm_backtrace(true);
        let engine = Engine::new(&config)?;

        let main_module =
            Module::new(&engine, module.bytes()).context("failed to compile firmware module")?;

        let mut store = Store::new(&engine, data);
        let mut linker: Linker<RunStore> = Linker::new(&engine);
        link_imports(&mut linker)?;

        let instance = linker
            .instantiate_async(&mut store, &main_module)
            .await
            .context("failed to instantiate firmware module")?;

        // Also guarantees the export is a genuine linear memory.
        instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .with_context(|| format!("export `{MEMORY_EXPORT}` is not a linear memory"))?;

        let entry_func = instance
            .get_typed_func::<(), ()>(&mut store, ENTRY_EXPORT)
            .with_context(|| format!("export `{ENTRY_EXPORT}` has the wrong signature"))?;
        let tick_func = instance
            .get_typed_func::<(u32, u32), u32>(&mut store, TICK_EXPORT)
            .with_context(|| format!("export `{TICK_EXPORT}` has the wrong signature"))?;

        Ok(Self {
            store,
            entry_func,
            tick_func,
        })
    }

    /// Invoke the firmware entry point. Called exactly once per run.
    pub(crate) async fn entry(&mut self) -> Result<()> {
        self.entry_func
            .call_async(&mut self.store, ())
            .await
            .context("trap in firmware entry point")
    }

    /// Drive one tick, announcing the `(id, len)` of the queue head. Returns
    /// the guest's "program finished" flag.
    pub(crate) async fn tick(&mut self, head_id: u32, head_len: u32) -> Result<bool> {
        let done = self
            .tick_func
            .call_async(&mut self.store, (head_id, head_len))
            .await?;
        Ok(done != 0)
    }
}
