//! Environment variable names and default values shared across the crate.

/// Overrides the resolved state root.
pub const ENV_STATE_DIR: &str = "AGENT_STATE_DIR";

/// Boolean; enables guest bind-mounts and input-file staging.
pub const ENV_ENABLE_GUEST_VOLUMES: &str = "AGENT_ENABLE_GUEST_VOLUMES";

/// Advisory log level filter, consumed by whatever subscriber the caller installs.
pub const ENV_LOG_LEVEL: &str = "AGENT_LOG_LEVEL";

/// Default guest uid/gid used to chown shared directories.
pub const DEFAULT_GUEST_UID: u32 = 65532;
pub const DEFAULT_GUEST_GID: u32 = 65532;

/// Default `run` timeout in seconds, applied when a caller omits one
/// explicitly.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 30;

/// Default resource shape used by the Create contract when a caller
/// omits cpu/memory/network explicitly.
pub const DEFAULT_CPU_COUNT: u32 = 1;
pub const DEFAULT_MEMORY_MIB: u32 = 256;
pub const DEFAULT_NETWORK_MODE: &str = "none";

/// Minimum bounded capacity for the streaming event channel.
pub const MIN_STREAM_CHANNEL_CAPACITY: usize = 64;
