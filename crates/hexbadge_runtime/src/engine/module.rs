use anyhow::{bail, Result};
use wasmparser::{ExternalKind, Parser, Payload};

/// Exports the firmware ABI is compiled against.
pub(crate) const ENTRY_EXPORT: &str = "wasm_main";
pub(crate) const TICK_EXPORT: &str = "tick";
pub(crate) const MEMORY_EXPORT: &str = "memory";

#[derive(Debug)]
pub struct FirmwareModule {
    pub(crate) wasm: Vec<u8>,
}

impl FirmwareModule {
    /// Create a new `FirmwareModule` from a WASM binary, checking the export
    /// surface up front so a broken upload is rejected before instantiation.
    pub fn new(wasm: Vec<u8>) -> Result<Self> {
        validate_exports(&wasm)?;
        Ok(Self { wasm })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.wasm
    }
}

/// Scan the export section and reject modules missing the firmware entry
/// points, or exporting them as the wrong kind of item.
fn validate_exports(data: &[u8]) -> Result<()> {
    let mut entry = false;
    let mut tick = false;
    let mut memory = false;

    for payload in Parser::new(0).parse_all(data) {
        match payload? {
            Payload::ExportSection(section) => {
                for export in section {
                    let export = export?;
                    match (export.name, export.kind) {
                        (ENTRY_EXPORT, ExternalKind::Func) => entry = true,
                        (TICK_EXPORT, ExternalKind::Func) => tick = true,
                        (MEMORY_EXPORT, ExternalKind::Memory) => memory = true,
                        _ => {}
                    }
                }
            }
            Payload::End(_) => break,
            _ => {}
        }
    }

    if !entry {
        bail!("export `{ENTRY_EXPORT}` not found or not a function");
    }
    if !tick {
        bail!("export `{TICK_EXPORT}` not found or not a function");
    }
    if !memory {
        bail!("export `{MEMORY_EXPORT}` not found or not a linear memory");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_complete_firmware_module() {
        let wasm = wat::parse_str(
            r#"
            (module
              (memory (export "memory") 1)
              (func (export "wasm_main"))
              (func (export "tick") (param i32 i32) (result i32) (i32.const 1)))
            "#,
        )
        .unwrap();
        assert!(FirmwareModule::new(wasm).is_ok());
    }

    #[test]
    fn rejects_missing_exports() {
        let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
        let err = FirmwareModule::new(wasm).unwrap_err();
        assert!(err.to_string().contains("wasm_main"));

        let wasm = wat::parse_str(
            r#"
            (module
              (memory (export "memory") 1)
              (func (export "wasm_main")))
            "#,
        )
        .unwrap();
        let err = FirmwareModule::new(wasm).unwrap_err();
        assert!(err.to_string().contains("tick"));
    }

    #[test]
    fn rejects_a_memory_export_of_the_wrong_kind() {
        let wasm = wat::parse_str(
            r#"
            (module
              (func (export "memory"))
              (func (export "wasm_main"))
              (func (export "tick") (param i32 i32) (result i32) (i32.const 1)))
            "#,
        )
        .unwrap();
        let err = FirmwareModule::new(wasm).unwrap_err();
        assert!(err.to_string().contains("linear memory"));
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(FirmwareModule::new(b"not a wasm module".to_vec()).is_err());
    }
}
