use anyhow::{Context as _, Result};
use wasmtime::{Caller, Extern, Linker, Memory};

use crate::engine::config::UnsupportedMessagePolicy;
use crate::engine::dispatch;
use crate::engine::module::MEMORY_EXPORT;
use crate::engine::store::RunStore;
use crate::error::BadgeError;
use crate::frame;
use crate::protocol::WasmIpcMessage;

/// Module name the firmware imports everything under.
pub(crate) const IMPORT_MODULE: &str = "index";

pub(crate) fn link_imports(linker: &mut Linker<RunStore>) -> Result<()> {
    linker
        .func_wrap(IMPORT_MODULE, "extern_write_stdout", host_write_stdout)?
        .func_wrap(IMPORT_MODULE, "extern_set_lcd_buffer", host_set_lcd_buffer)?
        .func_wrap(IMPORT_MODULE, "extern_set_gpio", host_set_gpio)?
        .func_wrap(IMPORT_MODULE, "extern_register_timer", host_register_timer)?
        .func_wrap(IMPORT_MODULE, "extern_check_timer", host_check_timer)?
        .func_wrap(IMPORT_MODULE, "extern_cancel_timer", host_cancel_timer)?
        .func_wrap(IMPORT_MODULE, "extern_get_millis", host_get_millis)?
        .func_wrap(
            IMPORT_MODULE,
            "extern_read_host_ipc_message",
            host_read_host_ipc_message,
        )?
        .func_wrap(
            IMPORT_MODULE,
            "extern_write_wasm_ipc_message",
            host_write_wasm_ipc_message,
        )?;
    Ok(())
}

fn guest_memory(caller: &mut Caller<'_, RunStore>) -> Result<Memory> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .context("failed to find memory export")
}

/// Copy `len` bytes out of guest memory. The slice view is bounds checked and
/// constructed fresh per call; it never outlives the call.
fn read_guest_memory(caller: &mut Caller<'_, RunStore>, ptr: u32, len: u32) -> Result<Vec<u8>> {
    let memory = guest_memory(caller)?;
    let data = memory.data(&*caller);
    let bytes = data
        .get(ptr as usize..ptr as usize + len as usize)
        .ok_or(BadgeError::OutOfBoundsAccess {
            ptr,
            len,
            size: data.len(),
        })?;
    Ok(bytes.to_vec())
}

/// Copy `buf` into guest memory at `ptr`, bounds checked the same way.
fn write_guest_memory(caller: &mut Caller<'_, RunStore>, ptr: u32, buf: &[u8]) -> Result<()> {
    let memory = guest_memory(caller)?;
    let data = memory.data_mut(&mut *caller);
    let size = data.len();
    let dest = data
        .get_mut(ptr as usize..ptr as usize + buf.len())
        .ok_or(BadgeError::OutOfBoundsAccess {
            ptr,
            len: buf.len() as u32,
            size,
        })?;
    dest.copy_from_slice(buf);
    Ok(())
}

/// `extern_write_stdout(ptr, len)`: guest text output, routed to the host log.
fn host_write_stdout(mut caller: Caller<'_, RunStore>, ptr: u32, len: u32) -> Result<()> {
    let bytes = read_guest_memory(&mut caller, ptr, len)?;
    let text = String::from_utf8_lossy(&bytes);
    tracing::info!("guest: {}", text.trim_end());
    Ok(())
}

/// `extern_set_lcd_buffer(ptr)`: copy one raw frame out of guest memory,
/// decode it and hand it to the registered frame handler. Every write is
/// delivered; there is no buffering or coalescing.
fn host_set_lcd_buffer(mut caller: Caller<'_, RunStore>, ptr: u32) -> Result<()> {
    let raw = read_guest_memory(&mut caller, ptr, frame::FRAME_BUFFER_LEN as u32)?;
    let decoded = frame::decode_rgb565_frame(&raw);

    let handler = caller.data().shared.frame_handler.lock().unwrap();
    if let Some(handler) = handler.as_ref() {
        handler(decoded);
    }
    Ok(())
}

/// `extern_set_gpio(pin, state)`: no pins on the host, log only.
fn host_set_gpio(_caller: Caller<'_, RunStore>, pin: u32, state: u32) {
    tracing::debug!("set_gpio: {pin}={state}");
}

fn host_register_timer(mut caller: Caller<'_, RunStore>, ms: u32) -> u32 {
    caller.data_mut().timers.register(ms)
}

fn host_check_timer(mut caller: Caller<'_, RunStore>, id: u32) -> Result<u32> {
    let expired = caller.data_mut().timers.check(id)?;
    Ok(expired as u32)
}

fn host_cancel_timer(mut caller: Caller<'_, RunStore>, id: u32) -> Result<()> {
    caller.data_mut().timers.cancel(id)?;
    Ok(())
}

/// `extern_get_millis()`: milliseconds since this run started.
fn host_get_millis(caller: Caller<'_, RunStore>) -> u32 {
    caller.data().started_at.elapsed().as_millis() as u32
}

/// `extern_read_host_ipc_message(expected_id, ptr)`: pop the queue head into
/// guest memory. The guest must pass the id the tick call announced; a
/// mismatch or an empty queue violates the read protocol, aborts the run,
/// and dequeues nothing.
fn host_read_host_ipc_message(
    mut caller: Caller<'_, RunStore>,
    expected_id: u32,
    ptr: u32,
) -> Result<()> {
    let payload = {
        let shared = caller.data().shared.clone();
        let mut queue = shared.host_queue.lock().unwrap();

        let head_id = queue
            .front()
            .map(|(id, _)| *id)
            .ok_or(BadgeError::QueueEmptyViolation)?;
        if head_id != expected_id {
            return Err(BadgeError::CorrelationMismatch {
                expected: expected_id,
                found: head_id,
            }
            .into());
        }

        let (_, payload) = queue.pop_front().ok_or(BadgeError::QueueEmptyViolation)?;
        payload
    };

    write_guest_memory(&mut caller, ptr, &payload)
}

/// `extern_write_wasm_ipc_message(ptr, len) -> id`: decode a guest→host
/// message, assign it the next request id and dispatch it asynchronously.
/// Returns the id immediately; resolution lands on the host→guest queue.
fn host_write_wasm_ipc_message(
    mut caller: Caller<'_, RunStore>,
    ptr: u32,
    len: u32,
) -> Result<u32> {
    let bytes = read_guest_memory(&mut caller, ptr, len)?;
    let message: WasmIpcMessage =
        serde_json::from_slice(&bytes).map_err(BadgeError::MalformedGuestMessage)?;

    let store = caller.data_mut();
    store.last_request_id += 1;
    let id = store.last_request_id;

    match message {
        WasmIpcMessage::HttpRequest(request) => {
            dispatch::spawn(store.shared.clone(), store.generation, id, request);
        }
        other => match store.shared.options.unsupported_message {
            UnsupportedMessagePolicy::Drop => {
                tracing::warn!(
                    "dropping unhandled guest IPC message `{}` (request id {id})",
                    other.variant_name()
                );
            }
            UnsupportedMessagePolicy::Fail => {
                return Err(
                    BadgeError::UnsupportedRequestVariant(other.variant_name().to_string()).into(),
                );
            }
        },
    }

    Ok(id)
}
