//! VM-lifecycle orchestrator: accepts requests to run untrusted code in
//! isolated micro-VM instances, managing their durable records, storage
//! layout, and execution through an external launcher binary.
//!
//! This crate is library-only: it exposes [`VmService`] and the types
//! it operates on. Transport (HTTP/gRPC), CLI surfaces, and the
//! launcher binary itself are out of scope and live elsewhere.

pub mod db;
pub mod launcher;
pub mod paths;
pub mod record;
pub mod storage;
pub mod streaming;

mod service;

pub use paths::PathsConfig;
pub use record::{StorageLayout, VmConfig, VmRecord, VmState, VmStatus};
pub use service::{
    CreateRequest, MetricsSnapshot, RunRequest, RunStreamRequest, StreamHandle, UpdateRequest,
    VmService,
};

pub use agent_shared::{AgentError, AgentResult, Language, LauncherError, LauncherErrorKind, VmId, VmRunResult};
