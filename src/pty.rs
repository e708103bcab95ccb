use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenPty(#[source] anyhow::Error),

    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn command: {0}")]
    SpawnCommand(#[source] anyhow::Error),

    #[error("failed to clone reader: {0}")]
    CloneReader(#[source] anyhow::Error),

    #[error("failed to take writer: {0}")]
    TakeWriter(#[source] anyhow::Error),

    #[error("failed to resize pty: {0}")]
    Resize(#[source] anyhow::Error),

    #[error("failed to wait for child: {0}")]
    Wait(#[from] std::io::Error),
}

pub struct Pty {
    /// Master side only. The slave is dropped right after the spawn so the
    /// master reader observes EOF once the child exits. MasterPty is not
    /// Sync; holders that share a Pty across tasks wrap it in a mutex.
    master: Box<dyn MasterPty + Send>,
    child: Option<Box<dyn portable_pty::Child + Send + Sync>>,
}

impl Pty {
    /// Spawn `command` (an argv vector, already platform-resolved) in a new
    /// PTY of the given dimensions.
    ///
    /// The PTY is a UTF-8 byte transport; output is never re-interpreted as
    /// text.
    pub fn spawn(
        command: &[String],
        cols: u16,
        rows: u16,
        cwd: Option<&Path>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Self, PtyError> {
        let cmd = Self::build_command(command, cwd, env)?;
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let PtyPair { master, slave } = pty_system.openpty(size).map_err(PtyError::OpenPty)?;
        let child = slave.spawn_command(cmd).map_err(PtyError::SpawnCommand)?;
        drop(slave);

        Ok(Self {
            master,
            child: Some(child),
        })
    }

    /// Build a CommandBuilder from an argv vector plus optional cwd and
    /// environment overrides.
    fn build_command(
        command: &[String],
        cwd: Option<&Path>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<CommandBuilder, PtyError> {
        let (program, args) = command.split_first().ok_or(PtyError::EmptyCommand)?;
        let term = std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string());

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.env("TERM", term);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        if let Some(vars) = env {
            for (k, v) in vars {
                cmd.env(k, v);
            }
        }
        Ok(cmd)
    }

    pub fn take_reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        self.master.try_clone_reader().map_err(PtyError::CloneReader)
    }

    pub fn take_writer(&self) -> Result<Box<dyn Write + Send>, PtyError> {
        self.master.take_writer().map_err(PtyError::TakeWriter)
    }

    pub fn take_child(&mut self) -> Option<Box<dyn portable_pty::Child + Send + Sync>> {
        self.child.take()
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(PtyError::Resize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// Read from the PTY with a timeout to avoid blocking forever.
    fn read_with_timeout(mut reader: Box<dyn Read + Send>, timeout: Duration) -> Vec<u8> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = vec![0u8; 4096];
            let mut collected = Vec::new();
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        collected.extend_from_slice(&buf[..n]);
                        let _ = tx.send(collected.clone());
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(_) => break,
                }
            }
        });
        rx.recv_timeout(timeout).unwrap_or_default()
    }

    #[test]
    fn empty_command_rejected() {
        let result = Pty::spawn(&[], 80, 24, None, None);
        assert!(matches!(result, Err(PtyError::EmptyCommand)));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_and_capture_output() {
        let pty = Pty::spawn(
            &argv(&["/bin/sh", "-c", "echo PTY_SPAWN_OK"]),
            80,
            24,
            None,
            None,
        )
        .expect("spawn should succeed");
        let reader = pty.take_reader().expect("reader");
        let output = read_with_timeout(reader, Duration::from_secs(5));
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("PTY_SPAWN_OK"), "got: {text}");
    }

    #[cfg(unix)]
    #[test]
    fn env_overrides_are_applied() {
        let mut env = HashMap::new();
        env.insert("HOLDPTY_TEST_VAR".to_string(), "value_42".to_string());
        let pty = Pty::spawn(
            &argv(&["/bin/sh", "-c", "echo $HOLDPTY_TEST_VAR"]),
            80,
            24,
            None,
            Some(&env),
        )
        .expect("spawn should succeed");
        let reader = pty.take_reader().expect("reader");
        let output = read_with_timeout(reader, Duration::from_secs(5));
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("value_42"), "got: {text}");
    }

    #[cfg(unix)]
    #[test]
    fn cwd_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let pty = Pty::spawn(
            &argv(&["/bin/sh", "-c", "pwd"]),
            80,
            24,
            Some(dir.path()),
            None,
        )
        .expect("spawn should succeed");
        let reader = pty.take_reader().expect("reader");
        let output = read_with_timeout(reader, Duration::from_secs(5));
        let text = String::from_utf8_lossy(&output);
        // Compare on file name to dodge /tmp vs /private/tmp symlinks.
        let marker = dir.path().file_name().unwrap().to_string_lossy();
        assert!(text.contains(marker.as_ref()), "got: {text}");
    }

    #[cfg(unix)]
    #[test]
    fn resize_succeeds() {
        let pty = Pty::spawn(&argv(&["/bin/sh"]), 80, 24, None, None).expect("spawn");
        assert!(pty.resize(120, 40).is_ok());
        assert!(pty.resize(100, 25).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn child_exit_code_observed() {
        let mut pty = Pty::spawn(
            &argv(&["/bin/sh", "-c", "exit 3"]),
            80,
            24,
            None,
            None,
        )
        .expect("spawn");
        let mut child = pty.take_child().expect("child handle");
        let status = child.wait().expect("wait");
        assert_eq!(status.exit_code(), 3);
    }
}
