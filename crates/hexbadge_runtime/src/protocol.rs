//! Messages exchanged with the firmware across the linear-memory boundary.
//!
//! Both directions are closed sum types carried as serde's externally tagged
//! JSON encoding; the variant names are the wire format the firmware is
//! compiled against, so changing them is an ABI break.

use serde::{Deserialize, Serialize};

/// One of the six physical inputs on the badge face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HexButton {
    A,
    B,
    C,
    D,
    E,
    F,
}

/// Host-originated system events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemEvent {
    BootButton,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseMeta {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// Host → guest. Unsolicited events carry correlation id 0; the three
/// `HttpResponse*` variants carry the id of the guest request they resolve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostIpcMessage {
    HexButton(HexButton),
    System(SystemEvent),
    HttpResponseMeta(HttpResponseMeta),
    HttpResponseBody(Vec<u8>),
    HttpResponseComplete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

/// Guest → host. `Started`/`Stopped` are lifecycle notifications from the
/// firmware ABI that this host has no handler for; they decode so the set
/// stays closed and the unsupported-message policy can name them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WasmIpcMessage {
    Started,
    Stopped,
    HttpRequest(HttpRequest),
}

impl WasmIpcMessage {
    /// Variant name as logged when the host has no handler for a message.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Stopped => "Stopped",
            Self::HttpRequest(_) => "HttpRequest",
        }
    }
}
