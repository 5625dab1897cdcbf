use thiserror::Error;

pub type BadgeResult<T> = Result<T, BadgeError>;

#[derive(Debug, Error)]
pub enum BadgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to instantiate firmware module: {0}")]
    Instantiation(anyhow::Error),

    #[error("Firmware execution failed: {0}")]
    Execution(anyhow::Error),

    #[error("Host IPC correlation mismatch: guest expected id {expected}, queue head is {found}")]
    CorrelationMismatch { expected: u32, found: u32 },

    #[error("Guest read a host IPC message but the queue is empty")]
    QueueEmptyViolation,

    #[error("Guest issued an IPC message the host does not implement: {0}")]
    UnsupportedRequestVariant(String),

    #[error("Failed to decode guest IPC message: {0}")]
    MalformedGuestMessage(#[from] serde_json::Error),

    #[error("Unknown timer handle: {0}")]
    InvalidTimerHandle(u32),

    #[error("Guest memory access out of bounds: {ptr}+{len} exceeds {size} bytes")]
    OutOfBoundsAccess { ptr: u32, len: u32, size: usize },
}
