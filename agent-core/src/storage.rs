//! Storage layout management.
//!
//! Creates and tears down the per-VM directory tree used for staging
//! inputs and collecting outputs, plus the optional persistent-volume
//! directory.

use std::path::{Path, PathBuf};

use agent_shared::constants::{DEFAULT_GUEST_GID, DEFAULT_GUEST_UID, ENV_ENABLE_GUEST_VOLUMES};
use agent_shared::{AgentError, AgentResult, VmId};

use crate::paths::ensure_dir;
use crate::record::StorageLayout;

/// Read `AGENT_ENABLE_GUEST_VOLUMES` fresh (not memoised): `normalise`
/// must honour the *current* environment on every record load, not
/// whatever was true at process start.
pub fn guest_volumes_enabled() -> bool {
    std::env::var(ENV_ENABLE_GUEST_VOLUMES)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Create the on-disk layout for a new VM under `state_root`.
///
/// Directories are created with mode 0755; when guest-volume sharing is
/// enabled the three shared directories are relaxed to 0777 so the
/// guest uid can write to them.
pub fn prepare(id: &VmId, persist: bool, state_root: &Path) -> AgentResult<StorageLayout> {
    let root = state_root.join("vms").join(id);
    let input_path = root.join("in");
    let output_path = root.join("out");
    let persist_path = if persist {
        Some(state_root.join("persist").join(id))
    } else {
        None
    };

    ensure_dir(&root)?;
    ensure_dir(&input_path)?;
    ensure_dir(&output_path)?;
    if let Some(p) = &persist_path {
        ensure_dir(p)?;
    }

    let enable_guest_volumes = guest_volumes_enabled();
    if enable_guest_volumes {
        for dir in [&input_path, &output_path] {
            relax_permissions(dir)?;
            chown_guest(dir, DEFAULT_GUEST_UID, DEFAULT_GUEST_GID)?;
        }
        if let Some(p) = &persist_path {
            relax_permissions(p)?;
            chown_guest(p, DEFAULT_GUEST_UID, DEFAULT_GUEST_GID)?;
        }
    }

    Ok(StorageLayout {
        root,
        input_path,
        output_path,
        persist_path,
        state_db_path: state_root.join("agent.db"),
        guest_uid: DEFAULT_GUEST_UID,
        guest_gid: DEFAULT_GUEST_GID,
        network_mode: String::new(),
        read_only_root: true,
        disable_guest_volumes: !enable_guest_volumes,
    })
}

/// Idempotent repair after restart: re-create missing directories and
/// re-apply permissions.
pub fn ensure(layout: &StorageLayout) -> AgentResult<()> {
    ensure_dir(&layout.root)?;
    ensure_dir(&layout.input_path)?;
    ensure_dir(&layout.output_path)?;
    if let Some(p) = &layout.persist_path {
        ensure_dir(p)?;
    }

    if !layout.disable_guest_volumes {
        for dir in [&layout.input_path, &layout.output_path] {
            relax_permissions(dir)?;
            chown_guest(dir, layout.guest_uid, layout.guest_gid)?;
        }
        if let Some(p) = &layout.persist_path {
            relax_permissions(p)?;
            chown_guest(p, layout.guest_uid, layout.guest_gid)?;
        }
    }

    Ok(())
}

/// Re-derive `disable_guest_volumes` from the current environment flag.
/// Called on every record loaded from the store so a process restart
/// honours the current configuration.
pub fn normalise(layout: &mut StorageLayout) {
    layout.disable_guest_volumes = !guest_volumes_enabled();
}

/// Copy `src_path` into `input_dir`, preserving its basename.
///
/// Errors if `src_path` is not a regular file.
pub fn stage_input(src_path: &Path, input_dir: &Path) -> AgentResult<PathBuf> {
    let metadata = std::fs::metadata(src_path)
        .map_err(|e| AgentError::Storage(format!("cannot stat {}: {e}", src_path.display())))?;
    if !metadata.is_file() {
        return Err(AgentError::Validation(format!(
            "{} is not a regular file",
            src_path.display()
        )));
    }

    let file_name = src_path
        .file_name()
        .ok_or_else(|| AgentError::Validation("input file has no basename".into()))?;
    let dest = input_dir.join(file_name);

    std::fs::copy(src_path, &dest)
        .map_err(|e| AgentError::Storage(format!("failed to stage input file: {e}")))?;

    Ok(dest)
}

/// Remove the full on-disk footprint of a VM. Unless `keep_persist`,
/// this also removes `persist_path`. Tolerates either path already
/// being gone — cleanup is best-effort.
pub fn teardown(layout: &StorageLayout, keep_persist: bool) {
    if layout.root.exists() {
        if let Err(e) = std::fs::remove_dir_all(&layout.root) {
            tracing::warn!(path = %layout.root.display(), error = %e, "failed to remove vm root directory");
        }
    }

    if !keep_persist {
        if let Some(persist_path) = &layout.persist_path {
            if persist_path.exists() {
                if let Err(e) = std::fs::remove_dir_all(persist_path) {
                    tracing::warn!(path = %persist_path.display(), error = %e, "failed to remove persist directory");
                }
            }
        }
    }
}

#[cfg(unix)]
fn relax_permissions(path: &Path) -> AgentResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
        .map_err(|e| AgentError::Storage(format!("failed to chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn relax_permissions(_path: &Path) -> AgentResult<()> {
    Ok(())
}

#[cfg(unix)]
fn chown_guest(path: &Path, uid: u32, gid: u32) -> AgentResult<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| AgentError::Storage(format!("invalid path for chown: {e}")))?;

    let ret = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(AgentError::Storage(format!(
            "failed to chown {} to {uid}:{gid}: {err}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_guest(_path: &Path, _uid: u32, _gid: u32) -> AgentResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn stage_input_rejects_directories() {
        let dir = tempdir().unwrap();
        let err = stage_input(dir.path(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn stage_input_copies_preserving_basename() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src_file = src_dir.path().join("script.py");
        let mut f = std::fs::File::create(&src_file).unwrap();
        f.write_all(b"print(1)").unwrap();

        let dest = stage_input(&src_file, dst_dir.path()).unwrap();
        assert_eq!(dest.file_name().unwrap(), "script.py");
        assert_eq!(std::fs::read(&dest).unwrap(), b"print(1)");
    }
}
