//! Foreground piping: wire the local terminal onto a running holder.
//!
//! Local stdin bytes go into the PTY write side, PTY output goes to local
//! stdout, and terminal size changes are forwarded. This is a convenience
//! attached to the same holder instance; none of the session semantics
//! change — remote attach/view/logs peers work exactly as before.

use bytes::Bytes;
use std::io::{Read, Write};
use tokio::sync::mpsc;

use crate::holder::Holder;
use crate::terminal::{terminal_size, RawModeGuard, TerminalError};

/// Pipe the local terminal into `holder` until the child exits.
///
/// Enables raw mode for the duration (restored on return, even on early
/// error) and returns the child's exit code.
pub async fn run(holder: &Holder) -> Result<i32, TerminalError> {
    let raw_guard = RawModeGuard::new()?;

    if let Ok((cols, rows)) = terminal_size() {
        let _ = holder.resize(cols, rows);
    }

    let input_tx = holder.input_sender();
    let mut output_rx = holder.subscribe_local_output();
    spawn_stdin_reader(input_tx);
    let mut resize_rx = spawn_resize_watcher();

    let mut stdout = std::io::stdout();
    let mut resize_closed = false;
    let code = loop {
        tokio::select! {
            data = output_rx.recv() => match data {
                Some(data) => {
                    let _ = stdout.write_all(&data);
                    let _ = stdout.flush();
                }
                None => break holder.wait().await,
            },
            resize = resize_rx.recv(), if !resize_closed => match resize {
                Some((cols, rows)) => { let _ = holder.resize(cols, rows); }
                None => resize_closed = true,
            },
            code = holder.wait() => break code,
        }
    };

    // Flush whatever the drain interval collected after the exit.
    while let Ok(data) = output_rx.try_recv() {
        let _ = stdout.write_all(&data);
    }
    let _ = stdout.flush();

    drop(raw_guard);
    Ok(code)
}

/// Read local stdin on a dedicated thread and feed the holder's input
/// channel. The thread stays blocked in read() until the process exits;
/// that is standard for terminal applications.
fn spawn_stdin_reader(input_tx: mpsc::Sender<Bytes>) {
    tokio::task::spawn_blocking(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if input_tx
                        .blocking_send(Bytes::copy_from_slice(&buf[..n]))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

/// Watch for terminal size changes and report them as (cols, rows).
#[cfg(unix)]
fn spawn_resize_watcher() -> mpsc::Receiver<(u16, u16)> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigwinch = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(_) => return,
        };
        loop {
            sigwinch.recv().await;
            if let Ok((cols, rows)) = terminal_size() {
                if tx.send((cols, rows)).await.is_err() {
                    break;
                }
            }
        }
    });
    rx
}

/// No SIGWINCH on Windows; resizes are polled by interactive front-ends.
#[cfg(not(unix))]
fn spawn_resize_watcher() -> mpsc::Receiver<(u16, u16)> {
    let (_tx, rx) = mpsc::channel(4);
    rx
}
