//! The holder: a long-lived process owning one PTY, one history ring, and
//! one listening endpoint.
//!
//! Architecture:
//! - PTY reader: dedicated thread; every chunk is appended to the ring and
//!   broadcast to connected attach/view clients
//! - PTY writer: dedicated thread consuming the input channel
//! - Accept loop: async; each connection runs its own handshake state machine
//! - Child monitor: dedicated thread waiting on the child; its exit triggers
//!   drain, then the one-shot shutdown sequence
//!
//! Per-connection ordering (`HELLO_ACK` → replay → `REPLAY_END` → live →
//! `EXIT` → FIN) is enforced structurally: every outbound frame goes through
//! the client's queue, and all enqueues happen under the holder's state lock,
//! so the handshake burst and the broadcast path cannot interleave.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_COLS, DEFAULT_ROWS};
use crate::endpoint::{self, Listener, Stream};
use crate::protocol::{
    Frame, FrameDecoder, FrameType, HelloAckMsg, HelloMsg, Mode, PROTOCOL_VERSION,
};
use crate::pty::{Pty, PtyError};
use crate::registry::{self, RegistryError, SessionMeta};
use crate::ring::Ring;

/// Outbound queue depth per client. A queue that stays full means the client
/// is not draining; it gets disconnected rather than stalling the PTY path.
const OUTBOUND_HWM: usize = 256;

/// PTY read chunk size.
const READ_BUF: usize = 4096;

#[derive(Debug, Error)]
pub enum HolderError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("failed to listen on {path:?}")]
    Listen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Options for starting a session.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Command vector to spawn in the PTY. Required, non-empty.
    pub command: Vec<String>,
    /// Session name; generated from the command when absent.
    pub name: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub cwd: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
}

impl StartOptions {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            name: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            cwd: None,
            env: None,
        }
    }
}

/// Per-connection mode, [`Mode`] plus the pre-handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientMode {
    PreHandshake,
    Attach,
    View,
    Logs,
}

impl From<Mode> for ClientMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Attach => ClientMode::Attach,
            Mode::View => ClientMode::View,
            Mode::Logs => ClientMode::Logs,
        }
    }
}

/// What the writer task should do next.
enum Outbound {
    Frame(Frame),
    /// Flush and half-close the connection.
    Close,
}

/// Passive per-client record; the holder drives all transitions.
struct ClientHandle {
    mode: ClientMode,
    tx: mpsc::Sender<Outbound>,
}

struct State {
    ring: Ring,
    clients: HashMap<u64, ClientHandle>,
    /// The exclusive writer slot: id of the attach client, if any.
    writer: Option<u64>,
    /// Latched exit code; set when the shutdown sequence begins.
    exited: Option<i32>,
    shutting_down: bool,
    /// Set after the linger window closes; no client may register past this.
    closed: bool,
    /// Local output sink for foreground piping.
    local: Option<mpsc::Sender<Bytes>>,
}

struct Shared {
    name: String,
    session_dir: PathBuf,
    endpoint_path: PathBuf,
    holder_pid: u32,
    child_pid: u32,
    cols: u16,
    rows: u16,
    drain: Duration,
    linger: Duration,
    /// Mutex because MasterPty is not Sync; only resize goes through it.
    pty: Mutex<Pty>,
    input_tx: mpsc::Sender<Bytes>,
    state: Mutex<State>,
    next_id: AtomicU64,
    /// Cancels the accept loop and every connection read loop.
    conn_cancel: CancellationToken,
    /// Shutdown-complete latch; fires after metadata and endpoint cleanup.
    done: CancellationToken,
}

/// A running session. Dropping the handle does not stop the session; the
/// background tasks run until the child exits.
pub struct Holder {
    shared: Arc<Shared>,
    exit_rx: watch::Receiver<Option<i32>>,
}

impl Holder {
    /// Start a session: spawn the PTY, begin listening, then advertise the
    /// session in the registry.
    ///
    /// Returns once the endpoint is accepting and the metadata file is
    /// written, so an enumeration from another process that sees the record
    /// can always connect. Spawn and listen failures abort startup before
    /// any metadata exists.
    pub async fn start(opts: StartOptions, config: &Config) -> Result<Self, HolderError> {
        let name = match &opts.name {
            Some(name) => {
                registry::validate_name(name)?;
                name.clone()
            }
            None => registry::generate_name(&opts.command),
        };
        let session_dir = registry::ensure_session_dir(config).map_err(RegistryError::Io)?;
        let endpoint_path = registry::endpoint_path(&session_dir, &name);
        endpoint::unlink(&endpoint_path);

        let command = registry::resolve_command(&opts.command);
        let mut pty = Pty::spawn(
            &command,
            opts.cols,
            opts.rows,
            opts.cwd.as_deref(),
            opts.env.as_ref(),
        )?;
        let pty_reader = pty.take_reader()?;
        let pty_writer = pty.take_writer()?;
        let mut child = pty.take_child();
        let child_pid = child.as_ref().and_then(|c| c.process_id()).unwrap_or(0);

        let listener = match Listener::bind(&endpoint_path) {
            Ok(listener) => listener,
            Err(e) => {
                if let Some(child) = child.as_mut() {
                    let _ = child.kill();
                }
                return Err(HolderError::Listen {
                    path: endpoint_path,
                    source: e,
                });
            }
        };

        let meta = SessionMeta {
            name: name.clone(),
            pid: std::process::id(),
            child_pid,
            command: opts.command.clone(),
            cols: opts.cols,
            rows: opts.rows,
            started_at: chrono::Utc::now(),
        };
        registry::write_meta(&session_dir, &meta)?;
        tracing::info!(session = %name, path = %endpoint_path.display(), "session listening");

        let (input_tx, input_rx) = mpsc::channel::<Bytes>(64);
        let shared = Arc::new(Shared {
            name,
            session_dir,
            endpoint_path,
            holder_pid: meta.pid,
            child_pid,
            cols: opts.cols,
            rows: opts.rows,
            drain: config.drain,
            linger: config.linger,
            pty: Mutex::new(pty),
            input_tx,
            state: Mutex::new(State {
                ring: Ring::new(config.ring_capacity),
                clients: HashMap::new(),
                writer: None,
                exited: None,
                shutting_down: false,
                closed: false,
                local: None,
            }),
            next_id: AtomicU64::new(0),
            conn_cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        });

        spawn_pty_reader(shared.clone(), pty_reader);
        spawn_pty_writer(pty_writer, input_rx);
        let exit_code_rx = spawn_child_waiter(child);
        let accept_handle = tokio::spawn(accept_loop(shared.clone(), listener));

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(lifecycle(shared.clone(), exit_code_rx, accept_handle, exit_tx));

        Ok(Self { shared, exit_rx })
    }

    /// The resolved session name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn session_dir(&self) -> &Path {
        &self.shared.session_dir
    }

    pub fn endpoint_path(&self) -> &Path {
        &self.shared.endpoint_path
    }

    pub fn child_pid(&self) -> u32 {
        self.shared.child_pid
    }

    /// Wait for the child to exit and return its exit code.
    ///
    /// Latched: callable any number of times, before or after the exit.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.exit_rx.clone();
        // The watch sender lives in the lifecycle task, which always
        // publishes a code before finishing.
        let observed = rx.wait_for(|code| code.is_some()).await;
        match observed {
            Ok(value) => (*value).unwrap_or(-1),
            Err(_) => (*self.exit_rx.borrow()).unwrap_or(-1),
        }
    }

    /// Wait until the shutdown sequence has finished: clients closed,
    /// endpoint released, metadata removed.
    pub async fn shutdown_complete(&self) {
        self.shared.done.cancelled().await;
    }

    /// Sender for writing bytes into the PTY. Used by foreground piping.
    pub fn input_sender(&self) -> mpsc::Sender<Bytes> {
        self.shared.input_tx.clone()
    }

    /// Resize the PTY. Used by foreground piping; peer resizes arrive over
    /// the wire instead.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.shared.pty.lock().resize(cols, rows)
    }

    /// Register a local sink that receives every PTY output chunk, for
    /// foreground piping. Replaces any previous sink.
    pub fn subscribe_local_output(&self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(OUTBOUND_HWM);
        self.shared.state.lock().local = Some(tx);
        rx
    }
}

// ── PTY pumps ──────────────────────────────────────────────────────

fn spawn_pty_reader(shared: Arc<Shared>, mut reader: Box<dyn io::Read + Send>) {
    tokio::task::spawn_blocking(move || {
        use std::io::Read;

        let mut buf = [0u8; READ_BUF];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!(session = %shared.name, "pty reader: eof");
                    break;
                }
                Ok(n) => broadcast_chunk(&shared, &buf[..n]),
                Err(e) => {
                    tracing::debug!(session = %shared.name, ?e, "pty reader: error");
                    break;
                }
            }
        }
    });
}

/// Append a PTY chunk to the ring and fan it out to attach/view clients.
///
/// A client whose queue is full is not draining; it is dropped rather than
/// allowed to stall the PTY path. The ring stays authoritative for history.
fn broadcast_chunk(shared: &Shared, chunk: &[u8]) {
    let mut st = shared.state.lock();
    st.ring.write(chunk);

    if let Some(local) = &st.local {
        let _ = local.try_send(Bytes::copy_from_slice(chunk));
    }
    if st.shutting_down {
        return;
    }

    let frame = Frame::data_out(Bytes::copy_from_slice(chunk));
    let mut dead = Vec::new();
    for (&id, client) in st.clients.iter() {
        match client.mode {
            ClientMode::Attach | ClientMode::View => {
                if client.tx.try_send(Outbound::Frame(frame.clone())).is_err() {
                    dead.push(id);
                }
            }
            ClientMode::PreHandshake | ClientMode::Logs => {}
        }
    }
    for id in dead {
        tracing::debug!(session = %shared.name, client = id, "dropping slow client");
        st.clients.remove(&id);
        if st.writer == Some(id) {
            st.writer = None;
        }
    }
}

fn spawn_pty_writer(mut writer: Box<dyn io::Write + Send>, mut input_rx: mpsc::Receiver<Bytes>) {
    tokio::task::spawn_blocking(move || {
        use std::io::Write;

        while let Some(data) = input_rx.blocking_recv() {
            if writer.write_all(&data).is_err() {
                break;
            }
            let _ = writer.flush();
        }
    });
}

fn spawn_child_waiter(
    child: Option<Box<dyn portable_pty::Child + Send + Sync>>,
) -> oneshot::Receiver<i32> {
    let (tx, rx) = oneshot::channel();
    match child {
        Some(mut child) => {
            tokio::task::spawn_blocking(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code() as i32,
                    Err(e) => {
                        tracing::error!(?e, "error waiting for child");
                        -1
                    }
                };
                let _ = tx.send(code);
            });
        }
        None => {
            let _ = tx.send(-1);
        }
    }
    rx
}

// ── Accept / connections ───────────────────────────────────────────

async fn accept_loop(shared: Arc<Shared>, mut listener: Listener) {
    loop {
        tokio::select! {
            _ = shared.conn_cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(stream) => {
                    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(handle_connection(shared.clone(), stream, id));
                }
                Err(e) => {
                    tracing::warn!(session = %shared.name, ?e, "accept failed");
                }
            }
        }
    }
    // Dropping the listener here releases the endpoint.
}

async fn handle_connection(shared: Arc<Shared>, stream: Stream, id: u64) {
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel::<Outbound>(OUTBOUND_HWM);
    tokio::spawn(client_writer(write_half, rx));

    {
        let mut st = shared.state.lock();
        if st.closed {
            return;
        }
        st.clients.insert(
            id,
            ClientHandle {
                mode: ClientMode::PreHandshake,
                tx,
            },
        );
    }
    tracing::debug!(session = %shared.name, client = id, "client connected");

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_BUF];
    'outer: loop {
        let n = tokio::select! {
            _ = shared.conn_cancel.cancelled() => break 'outer,
            result = read_half.read(&mut buf) => match result {
                Ok(0) | Err(_) => break 'outer,
                Ok(n) => n,
            },
        };
        decoder.feed(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    if handle_frame(&shared, id, frame).await == Flow::Stop {
                        break 'outer;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    reject(&shared, id, &format!("Malformed frame: {e}"));
                    break 'outer;
                }
            }
        }
    }

    remove_client(&shared, id);
    tracing::debug!(session = %shared.name, client = id, "client ended");
}

async fn client_writer(mut write_half: WriteHalf<Stream>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if frame.write_to(&mut write_half).await.is_err() {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    // Half-close: the peer observes FIN after everything queued so far.
    let _ = write_half.shutdown().await;
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Deferred effects decided under the state lock, applied outside it.
enum Action {
    None,
    ForwardInput(Bytes),
    Resize(u16, u16),
}

async fn handle_frame(shared: &Arc<Shared>, id: u64, frame: Frame) -> Flow {
    let (flow, action) = {
        let mut st = shared.state.lock();
        let mode = match st.clients.get(&id) {
            Some(client) => client.mode,
            None => return Flow::Stop,
        };
        match mode {
            ClientMode::PreHandshake => (handshake(shared, &mut st, id, frame), Action::None),
            ClientMode::Attach => match frame.frame_type {
                FrameType::DataIn => (Flow::Continue, Action::ForwardInput(frame.payload)),
                FrameType::Resize => match frame.parse_resize() {
                    Ok((cols, rows)) => (Flow::Continue, Action::Resize(cols, rows)),
                    Err(_) => (Flow::Continue, Action::None),
                },
                // Forward-compatible: anything else is ignored.
                _ => (Flow::Continue, Action::None),
            },
            // View and logs clients have no writable surface; their input
            // and resize frames are silently ignored.
            ClientMode::View | ClientMode::Logs => (Flow::Continue, Action::None),
        }
    };

    match action {
        Action::None => {}
        Action::ForwardInput(data) => {
            let _ = shared.input_tx.send(data).await;
        }
        Action::Resize(cols, rows) => {
            // PTY already closed is not an error worth surfacing.
            let _ = shared.pty.lock().resize(cols, rows);
        }
    }
    flow
}

/// Process the first frame from a pre-handshake client. Must be `HELLO`.
///
/// On acceptance the handshake burst (`HELLO_ACK`, replay, `REPLAY_END`,
/// and for finished sessions `EXIT`) is enqueued while the state lock is
/// held, so no live broadcast can interleave with it.
fn handshake(shared: &Arc<Shared>, st: &mut State, id: u64, frame: Frame) -> Flow {
    if frame.frame_type != FrameType::Hello {
        return reject_locked(st, id, "Expected HELLO");
    }
    let hello: HelloMsg = match frame.parse_json() {
        Ok(hello) => hello,
        Err(e) => {
            return reject_locked(st, id, &format!("Invalid HELLO payload: {e}"));
        }
    };
    if hello.protocol_version != PROTOCOL_VERSION {
        return reject_locked(
            st,
            id,
            &format!(
                "Unsupported protocol version {} (holder speaks {})",
                hello.protocol_version, PROTOCOL_VERSION
            ),
        );
    }
    if hello.mode == Mode::Attach && st.writer.is_some() {
        return reject_locked(
            st,
            id,
            &format!(
                "Session '{}' has an active attachment. Use view for read-only access.",
                shared.name
            ),
        );
    }

    let ack = HelloAckMsg {
        name: shared.name.clone(),
        cols: shared.cols,
        rows: shared.rows,
        mode: hello.mode,
        pid: shared.holder_pid,
    };
    let ack_frame = match Frame::control(FrameType::HelloAck, &ack) {
        Ok(frame) => frame,
        Err(e) => {
            return reject_locked(st, id, &format!("Internal handshake failure: {e}"));
        }
    };

    let replay = if st.ring.is_empty() {
        None
    } else {
        Some(Frame::data_out(Bytes::from(st.ring.read())))
    };
    let exited = st.exited;

    let client = match st.clients.get_mut(&id) {
        Some(client) => client,
        None => return Flow::Stop,
    };
    client.mode = ClientMode::from(hello.mode);
    let tx = client.tx.clone();

    let _ = tx.try_send(Outbound::Frame(ack_frame));
    if let Some(replay) = replay {
        let _ = tx.try_send(Outbound::Frame(replay));
    }
    let _ = tx.try_send(Outbound::Frame(Frame::replay_end()));

    match hello.mode {
        Mode::Logs => {
            // One-shot dump: half-close now, no live stream.
            let _ = tx.try_send(Outbound::Close);
            st.clients.remove(&id);
            tracing::debug!(session = %shared.name, client = id, "logs replay served");
            Flow::Stop
        }
        Mode::Attach | Mode::View => {
            if let Some(code) = exited {
                let _ = tx.try_send(Outbound::Frame(Frame::exit(code)));
                let _ = tx.try_send(Outbound::Close);
                st.clients.remove(&id);
                return Flow::Stop;
            }
            if hello.mode == Mode::Attach {
                st.writer = Some(id);
                tracing::debug!(session = %shared.name, client = id, "writer slot acquired");
            }
            Flow::Continue
        }
    }
}

/// Send an `ERROR` frame and close. For callers that do not already hold
/// the state lock.
fn reject(shared: &Shared, id: u64, message: &str) {
    let mut st = shared.state.lock();
    reject_locked(&mut st, id, message);
}

fn reject_locked(st: &mut State, id: u64, message: &str) -> Flow {
    if let Some(client) = st.clients.remove(&id) {
        let _ = client.tx.try_send(Outbound::Frame(Frame::error(message)));
        let _ = client.tx.try_send(Outbound::Close);
        if st.writer == Some(id) {
            st.writer = None;
        }
    }
    Flow::Stop
}

fn remove_client(shared: &Shared, id: u64) {
    let mut st = shared.state.lock();
    if st.clients.remove(&id).is_some() && st.writer == Some(id) {
        st.writer = None;
        tracing::debug!(session = %shared.name, client = id, "writer slot released");
    }
}

// ── Lifecycle ──────────────────────────────────────────────────────

/// Waits for the child, drains the PTY, then runs the one-shot shutdown
/// sequence. This task is the only shutdown initiator.
async fn lifecycle(
    shared: Arc<Shared>,
    exit_code_rx: oneshot::Receiver<i32>,
    accept_handle: tokio::task::JoinHandle<()>,
    exit_tx: watch::Sender<Option<i32>>,
) {
    let code = exit_code_rx.await.unwrap_or(-1);
    tracing::info!(session = %shared.name, code, "child exited");
    let _ = exit_tx.send(Some(code));

    // Drain: let the PTY flush trailing output into the ring and live
    // streams before anyone is told the session is over.
    tokio::time::sleep(shared.drain).await;

    {
        let mut st = shared.state.lock();
        if st.shutting_down {
            return;
        }
        st.shutting_down = true;
        st.exited = Some(code);
        for client in st.clients.values() {
            match client.mode {
                ClientMode::Attach | ClientMode::View => {
                    let _ = client.tx.try_send(Outbound::Frame(Frame::exit(code)));
                    let _ = client.tx.try_send(Outbound::Close);
                }
                ClientMode::PreHandshake | ClientMode::Logs => {
                    let _ = client.tx.try_send(Outbound::Close);
                }
            }
        }
    }

    // Linger: the endpoint stays open so late connectors still get a
    // handshake, replay, and the exit code.
    tokio::time::sleep(shared.linger).await;

    {
        let mut st = shared.state.lock();
        st.closed = true;
        st.clients.clear();
        st.writer = None;
        st.local = None;
    }
    shared.conn_cancel.cancel();
    let _ = accept_handle.await;

    registry::remove_meta(&shared.session_dir, &shared.name);
    endpoint::unlink(&shared.endpoint_path);
    tracing::info!(session = %shared.name, "session closed");
    shared.done.cancel();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> Config {
        Config {
            session_dir: Some(dir.to_path_buf()),
            linger: Duration::from_millis(50),
            ..Config::default()
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn start_writes_metadata_after_listening() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let holder = Holder::start(
            StartOptions {
                name: Some("meta-order".to_string()),
                ..StartOptions::new(sh("sleep 5"))
            },
            &config,
        )
        .await
        .unwrap();

        // Start has returned: metadata must exist and the endpoint must
        // already be connectable.
        let meta = registry::read_meta(dir.path(), "meta-order").unwrap();
        assert_eq!(meta.pid, std::process::id());
        assert!(meta.child_pid != 0);
        assert_eq!(meta.cols, DEFAULT_COLS);
        let stream = endpoint::connect(holder.endpoint_path()).await;
        assert!(stream.is_ok(), "endpoint should accept: {:?}", stream.err());

        registry::stop(&meta).unwrap();
        holder.shutdown_complete().await;
    }

    #[tokio::test]
    async fn wait_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let holder = Holder::start(StartOptions::new(sh("exit 42")), &config)
            .await
            .unwrap();
        assert_eq!(holder.wait().await, 42);
        // Latched: a second wait returns immediately.
        assert_eq!(holder.wait().await, 42);
    }

    #[tokio::test]
    async fn invalid_name_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let result = Holder::start(
            StartOptions {
                name: Some("bad name!".to_string()),
                ..StartOptions::new(sh("true"))
            },
            &config,
        )
        .await;
        assert!(matches!(
            result,
            Err(HolderError::Registry(RegistryError::InvalidName(_)))
        ));
    }

    #[tokio::test]
    async fn shutdown_removes_metadata_and_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let holder = Holder::start(
            StartOptions {
                name: Some("cleanup".to_string()),
                ..StartOptions::new(sh("true"))
            },
            &config,
        )
        .await
        .unwrap();
        let endpoint_path = holder.endpoint_path().to_path_buf();

        holder.shutdown_complete().await;
        assert!(!registry::meta_path(dir.path(), "cleanup").exists());
        assert!(!endpoint_path.exists());
    }

    #[tokio::test]
    async fn generated_name_used_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let holder = Holder::start(StartOptions::new(sh("sleep 5")), &config)
            .await
            .unwrap();
        assert!(holder.name().starts_with("sh-"), "got: {}", holder.name());
        registry::validate_name(holder.name()).unwrap();

        let meta = registry::read_meta(dir.path(), holder.name()).unwrap();
        registry::stop(&meta).unwrap();
        holder.shutdown_complete().await;
    }
}
