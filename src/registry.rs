//! Filesystem-as-registry: session metadata, endpoint naming, liveness.
//!
//! A session is advertised by a `{dir}/{name}.json` record written after the
//! holder's endpoint is already listening, so "metadata exists" always implies
//! "the endpoint is (or was) accepting". Readers reap stale records: a record
//! whose holder process is gone and whose endpoint refuses a short connect
//! probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{Config, STALE_PROBE_TIMEOUT};
use crate::endpoint;

/// Longest accepted session name.
pub const NAME_MAX: usize = 64;

/// Longest command-derived prefix of a generated name.
const GENERATED_PREFIX_MAX: usize = 16;

/// Per-session metadata record, serialised as JSON at `{dir}/{name}.json`.
///
/// Readers tolerate extra fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub name: String,
    /// Holder process id.
    pub pid: u32,
    /// Child process id, 0 when the PTY backend could not report one.
    pub child_pid: u32,
    pub command: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub started_at: DateTime<Utc>,
}

/// One live session as seen by enumeration.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub name: String,
    pub meta: SessionMeta,
    pub endpoint_reachable: bool,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid session name {0:?}: names match [A-Za-z0-9_-]{{1,64}}")]
    InvalidName(String),
    #[error("no session named {0:?}")]
    NotFound(String),
    #[error("metadata for {0:?} is not valid JSON: {1}")]
    BadMetadata(String, #[source] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── Session directory ──────────────────────────────────────────────

/// Resolve the session directory without creating it.
///
/// Order: `HOLDPTY_DIR` override (taken from `config`), then on Windows the
/// system temp dir, then `$XDG_RUNTIME_DIR/dt`, then `/tmp/dt-<uid>`, then
/// the system temp dir.
pub fn resolve_session_dir(config: &Config) -> PathBuf {
    if let Some(dir) = &config.session_dir {
        return dir.clone();
    }
    #[cfg(windows)]
    {
        std::env::temp_dir().join("dt")
    }
    #[cfg(unix)]
    {
        if let Some(runtime) = std::env::var_os("XDG_RUNTIME_DIR") {
            return PathBuf::from(runtime).join("dt");
        }
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/dt-{uid}"))
    }
    #[cfg(not(any(unix, windows)))]
    {
        std::env::temp_dir().join("dt")
    }
}

/// Resolve the session directory and create it on demand. On POSIX the
/// directory is owner-only (0700).
pub fn ensure_session_dir(config: &Config) -> io::Result<PathBuf> {
    let dir = resolve_session_dir(config);
    std::fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

// ── Path derivation ────────────────────────────────────────────────

pub fn meta_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Derive the endpoint address for a session.
///
/// POSIX: `{dir}/{name}.sock`. Windows: a named pipe embedding a fingerprint
/// of the session directory, because the pipe namespace is process-wide
/// global and two environments pointing at different directories must not
/// collide.
pub fn endpoint_path(dir: &Path, name: &str) -> PathBuf {
    #[cfg(unix)]
    {
        dir.join(format!("{name}.sock"))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(pipe_name(dir, name))
    }
}

/// Windows pipe name for a session: `\\.\pipe\holdpty-<hash>-<name>`.
///
/// Pure so it can be tested on any platform.
pub fn pipe_name(dir: &Path, name: &str) -> String {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    };
    let hash = fnv1a(absolute.to_string_lossy().as_bytes()) as u32;
    format!(r"\\.\pipe\holdpty-{hash:08x}-{name}")
}

/// FNV-1a 64-bit. Any stable non-cryptographic fingerprint of the directory
/// string works here; cryptographic strength buys nothing.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ── Names ──────────────────────────────────────────────────────────

/// Check a caller-supplied session name against `[A-Za-z0-9_-]{1,64}`.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    let ok = !name.is_empty()
        && name.len() <= NAME_MAX
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

/// Generate a session name from the command's first token.
///
/// Basename, minus one trailing executable-script extension
/// (case-insensitive), restricted to the name charset, truncated to 16
/// chars, `session` if nothing survives, then a random four-hex-digit
/// suffix.
pub fn generate_name(command: &[String]) -> String {
    let base = command
        .first()
        .map(|token| stem_of(token))
        .unwrap_or_default();
    let mut prefix: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(GENERATED_PREFIX_MAX)
        .collect();
    if prefix.is_empty() {
        prefix.push_str("session");
    }
    let suffix: u16 = rand::random();
    format!("{prefix}-{suffix:04x}")
}

fn stem_of(token: &str) -> String {
    let basename = Path::new(token)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = basename.to_ascii_lowercase();
    for ext in [".exe", ".cmd", ".bat", ".sh", ".ps1"] {
        if lower.ends_with(ext) && basename.len() > ext.len() {
            return basename[..basename.len() - ext.len()].to_string();
        }
    }
    basename
}

// ── Metadata I/O ───────────────────────────────────────────────────

pub fn write_meta(dir: &Path, meta: &SessionMeta) -> Result<(), RegistryError> {
    let json = serde_json::to_vec_pretty(meta)
        .map_err(|e| RegistryError::BadMetadata(meta.name.clone(), e))?;
    std::fs::write(meta_path(dir, &meta.name), json)?;
    Ok(())
}

pub fn read_meta(dir: &Path, name: &str) -> Result<SessionMeta, RegistryError> {
    let path = meta_path(dir, name);
    let raw = std::fs::read(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            RegistryError::NotFound(name.to_string())
        } else {
            RegistryError::Io(e)
        }
    })?;
    serde_json::from_slice(&raw).map_err(|e| RegistryError::BadMetadata(name.to_string(), e))
}

/// Remove a session's metadata record, best effort.
pub fn remove_meta(dir: &Path, name: &str) {
    let _ = std::fs::remove_file(meta_path(dir, name));
}

/// Remove all filesystem traces of a session: metadata and, on POSIX, the
/// endpoint file. For externally coordinated cleanup.
pub fn remove_session(dir: &Path, name: &str) {
    remove_meta(dir, name);
    endpoint::unlink(&endpoint_path(dir, name));
}

// ── Liveness ───────────────────────────────────────────────────────

/// Does a process with this pid exist under the caller's user?
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // kill(pid, 0) probes existence without delivering a signal. EPERM
    // still means the pid exists (just not ours to signal).
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// PID reuse is aggressive on Windows, so existence is never trusted there;
/// the endpoint probe decides. Reporting `true` routes every liveness check
/// through the probe.
#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}

/// Try to connect to the session's endpoint within [`STALE_PROBE_TIMEOUT`].
pub async fn probe_endpoint(dir: &Path, name: &str) -> bool {
    let path = endpoint_path(dir, name);
    matches!(
        tokio::time::timeout(STALE_PROBE_TIMEOUT, endpoint::connect(&path)).await,
        Ok(Ok(_))
    )
}

/// Full liveness test for a metadata record.
///
/// POSIX: a live holder pid short-circuits to live; otherwise the probe
/// decides. Windows: the probe is always consulted before a record may be
/// reaped.
pub async fn is_session_live(dir: &Path, meta: &SessionMeta) -> bool {
    if cfg!(unix) {
        if pid_alive(meta.pid) {
            return true;
        }
        probe_endpoint(dir, &meta.name).await
    } else {
        probe_endpoint(dir, &meta.name).await
    }
}

// ── Enumeration ────────────────────────────────────────────────────

/// List live sessions under `dir`, reaping stale records as a side effect.
///
/// Records that fail to parse are skipped but never removed; the writer may
/// be mid-write.
pub async fn list_sessions(dir: &Path) -> Result<Vec<SessionEntry>, RegistryError> {
    let mut entries = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e.into()),
    };

    for dirent in read_dir {
        let dirent = dirent?;
        let path = dirent.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        let meta = match read_meta(dir, &name) {
            Ok(meta) => meta,
            Err(RegistryError::BadMetadata(..)) | Err(RegistryError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };

        let reachable = probe_endpoint(dir, &name).await;
        let live = if cfg!(unix) {
            pid_alive(meta.pid) || reachable
        } else {
            reachable
        };
        if live {
            entries.push(SessionEntry {
                name,
                meta,
                endpoint_reachable: reachable,
            });
        } else {
            tracing::debug!(session = %name, "reaping stale session record");
            remove_session(dir, &name);
        }
    }
    Ok(entries)
}

// ── Stop ───────────────────────────────────────────────────────────

/// Terminate a session's child process.
///
/// POSIX sends SIGTERM to the child and lets the holder's normal exit path
/// run. Windows termination is non-cooperative, so the holder pid is
/// force-terminated as well to guarantee cleanup.
pub fn stop(meta: &SessionMeta) -> io::Result<()> {
    #[cfg(unix)]
    {
        if meta.child_pid == 0 || meta.child_pid > i32::MAX as u32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("session {:?} has no usable child pid", meta.name),
            ));
        }
        let rc = unsafe { libc::kill(meta.child_pid as i32, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
    #[cfg(not(unix))]
    {
        force_terminate(meta.child_pid)?;
        force_terminate(meta.pid)
    }
}

#[cfg(not(unix))]
fn force_terminate(pid: u32) -> io::Result<()> {
    if pid == 0 {
        return Ok(());
    }
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill {pid} failed: {status}")))
    }
}

// ── Windows command resolution ─────────────────────────────────────

/// Rewrite a command vector so the PTY backend can spawn it.
///
/// The Windows PTY cannot search `PATH` or run script shims, so bare names
/// are resolved against `PATH` (`.exe`/`.com` native, `.cmd`/`.bat` through
/// `cmd.exe /c`). On POSIX this is the identity transform.
pub fn resolve_command(command: &[String]) -> Vec<String> {
    #[cfg(unix)]
    {
        command.to_vec()
    }
    #[cfg(not(unix))]
    {
        resolve_command_windows(command)
    }
}

#[cfg(any(windows, test))]
#[cfg_attr(unix, allow(dead_code))]
fn resolve_command_windows(command: &[String]) -> Vec<String> {
    let Some(first) = command.first() else {
        return command.to_vec();
    };
    let rest = &command[1..];

    let via_cmd = |argv: &[String]| {
        let mut out = vec!["cmd.exe".to_string(), "/c".to_string()];
        out.extend(argv.iter().cloned());
        out
    };

    let lower = first.to_ascii_lowercase();
    if let Some(ext) = Path::new(&lower).extension().and_then(|e| e.to_str()) {
        // Explicit extension: scripts go through cmd.exe, the rest passes.
        return match ext {
            "cmd" | "bat" => via_cmd(command),
            _ => command.to_vec(),
        };
    }

    let candidate_dirs: Vec<PathBuf> = if first.contains('\\') || first.contains('/') {
        Path::new(first)
            .parent()
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_default()
    } else {
        std::env::var("PATH")
            .map(|p| p.split(';').map(PathBuf::from).collect())
            .unwrap_or_default()
    };
    let stem = Path::new(first)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| first.clone());

    for dir in &candidate_dirs {
        for ext in ["exe", "com"] {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                let mut out = vec![candidate.to_string_lossy().into_owned()];
                out.extend(rest.iter().cloned());
                return out;
            }
        }
    }
    for dir in &candidate_dirs {
        for ext in ["cmd", "bat"] {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                let mut script = vec![candidate.to_string_lossy().into_owned()];
                script.extend(rest.iter().cloned());
                return via_cmd(&script);
            }
        }
    }

    // Nothing matched: guess `.exe` and let the spawn fail loudly.
    let mut out = vec![format!("{first}.exe")];
    out.extend(rest.iter().cloned());
    out
}
