//! Paths and environment resolution.
//!
//! Computes the process-wide state root exactly once and normalises the
//! small set of user-facing strings (language tags, VM ids) that flow
//! into filesystem paths and database keys.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use agent_shared::constants::ENV_STATE_DIR;
use agent_shared::{AgentError, AgentResult, Language, VmId};

static STATE_ROOT: OnceLock<PathBuf> = OnceLock::new();
static LAST_ID_NANOS: AtomicU64 = AtomicU64::new(0);

/// Resolve (and memoise) the process-wide state root.
///
/// Resolution order, first writable candidate wins:
/// 1. `AGENT_STATE_DIR` env override
/// 2. `/var/lib/agent`
/// 3. the OS user-config dir joined with `agent`
/// 4. the home dir joined with `.agent`
/// 5. `<tempdir>/agent`
///
/// This reads the environment exactly once for the lifetime of the
/// process; a caller that needs a different root per instance should
/// use [`resolve_state_root`] directly and thread the result through
/// explicitly rather than rely on this memoiser.
pub fn state_root() -> &'static Path {
    STATE_ROOT.get_or_init(|| resolve_state_root().expect("failed to resolve agent state root"))
}

/// Explicit, injectable resolution of the directories the orchestrator
/// writes under. `VmService::with_paths` takes one of these directly
/// instead of reaching for the process-wide [`state_root`] memoiser,
/// which is what makes the service constructible against an isolated
/// directory in tests.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub state_root: PathBuf,
}

impl PathsConfig {
    /// Resolve against the real environment, following the same
    /// candidate order as [`state_root`] but without touching the
    /// memoised global.
    pub fn resolve() -> AgentResult<Self> {
        Ok(Self {
            state_root: resolve_state_root()?,
        })
    }

    /// Build directly from an already-chosen root, e.g. a `tempdir` in
    /// tests.
    pub fn from_root(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }
}

/// Compute the state root without touching the memoised global.
///
/// Exposed for callers that construct an explicit [`PathsConfig`] value
/// at program entry instead of relying on the global memoiser.
pub fn resolve_state_root() -> AgentResult<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        if !dir.trim().is_empty() {
            let path = PathBuf::from(dir);
            ensure_dir(&path)?;
            return Ok(path);
        }
    }

    let candidates = [
        Some(PathBuf::from("/var/lib/agent")),
        dirs::config_dir().map(|d| d.join("agent")),
        dirs::home_dir().map(|d| d.join(".agent")),
        Some(std::env::temp_dir().join("agent")),
    ];

    let mut last_err = None;
    for candidate in candidates.into_iter().flatten() {
        match ensure_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| AgentError::Storage("no writable state root candidate".into())))
}

/// Create `path` (and its parents) with mode 0755, idempotently.
///
/// Fails with a validation error when `path` is empty.
pub fn ensure_dir(path: &Path) -> AgentResult<()> {
    if path.as_os_str().is_empty() {
        return Err(AgentError::Validation("path is empty".into()));
    }

    std::fs::create_dir_all(path)
        .map_err(|e| AgentError::Storage(format!("failed to create {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(path, perms)
            .map_err(|e| AgentError::Storage(format!("failed to chmod {}: {e}", path.display())))?;
    }

    Ok(())
}

/// Normalise a user-supplied language string to one of the supported
/// runtimes, or `None` when unsupported.
///
/// `js`/`javascript` fold to `node`; `golang` folds to `go`. `ts`/
/// `typescript` is deliberately left unfolded here — the launcher
/// adapter decides how to treat it.
pub fn normalize_language(s: &str) -> Option<Language> {
    match s.trim().to_lowercase().as_str() {
        "python" => Some(Language::Python),
        "node" | "js" | "javascript" => Some(Language::Node),
        "go" | "golang" => Some(Language::Go),
        "deno" => Some(Language::Deno),
        "ruby" => Some(Language::Ruby),
        _ => None,
    }
}

/// Generate a new VM id of the form `<language>-<monotonic-nanoseconds>`.
/// A process-wide counter guarantees strictly increasing nanosecond
/// values even when two calls land on the same wall-clock tick, which
/// is what keeps concurrent `create` calls collision-free.
pub fn generate_id(language: Language) -> VmId {
    let wall_clock_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64;

    let mut nanos = 0;
    LAST_ID_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            nanos = if wall_clock_nanos > last { wall_clock_nanos } else { last + 1 };
            Some(nanos)
        })
        .expect("fetch_update is infallible here");

    sanitize_id(&format!("{language}-{nanos}"))
}

/// Lower-case a VM/record id and collapse whitespace runs to a single
/// hyphen. Idempotent: `sanitize_id(sanitize_id(s)) == sanitize_id(s)`.
pub fn sanitize_id(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut in_space = false;
    for ch in lower.chars() {
        if ch.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push('-');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_language_aliases() {
        assert_eq!(normalize_language("js"), Some(Language::Node));
        assert_eq!(normalize_language("javascript"), Some(Language::Node));
        assert_eq!(normalize_language("golang"), Some(Language::Go));
        assert_eq!(normalize_language("PYTHON"), Some(Language::Python));
        assert_eq!(normalize_language("typescript"), None);
        assert_eq!(normalize_language("cobol"), None);
    }

    #[test]
    fn sanitize_id_collapses_whitespace_and_lowercases() {
        assert_eq!(sanitize_id("  Python   123  "), "python-123");
        assert_eq!(sanitize_id("node-17"), "node-17");
    }

    #[test]
    fn sanitize_id_is_idempotent() {
        for input in ["  Foo Bar  ", "already-sane", "A\tB\nC", ""] {
            let once = sanitize_id(input);
            let twice = sanitize_id(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn ensure_dir_rejects_empty_path() {
        let err = ensure_dir(Path::new("")).unwrap_err();
        assert!(err.to_string().contains("path is empty"));
    }
}
