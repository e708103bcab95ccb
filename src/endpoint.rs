//! Local-IPC endpoint abstraction.
//!
//! POSIX sessions listen on a filesystem Unix domain socket; Windows sessions
//! listen on a named pipe. Both sides expose the same surface: [`Listener`]
//! for the holder, [`connect`] for peers. Streams implement
//! `AsyncRead + AsyncWrite` and split with `tokio::io::split`.

use std::io;
use std::path::Path;

#[cfg(unix)]
pub use unix::{connect, Listener, Stream};

#[cfg(windows)]
pub use windows::{connect, Listener, Stream};

#[cfg(unix)]
mod unix {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    pub type Stream = UnixStream;

    pub struct Listener {
        inner: UnixListener,
    }

    impl Listener {
        /// Bind a Unix domain socket at `path`, restricting it to the owner.
        pub fn bind(path: &Path) -> io::Result<Self> {
            let inner = UnixListener::bind(path)?;
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            }
            Ok(Self { inner })
        }

        pub async fn accept(&mut self) -> io::Result<Stream> {
            let (stream, _addr) = self.inner.accept().await?;
            Ok(stream)
        }
    }

    pub async fn connect(path: &Path) -> io::Result<Stream> {
        UnixStream::connect(path).await
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions};

    /// Either end of a named-pipe connection. The server and client halves
    /// are distinct tokio types, so streams are a delegating enum.
    pub enum Stream {
        Server(NamedPipeServer),
        Client(NamedPipeClient),
    }

    impl AsyncRead for Stream {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            match self.get_mut() {
                Stream::Server(s) => std::pin::Pin::new(s).poll_read(cx, buf),
                Stream::Client(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for Stream {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            match self.get_mut() {
                Stream::Server(s) => std::pin::Pin::new(s).poll_write(cx, buf),
                Stream::Client(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            }
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            match self.get_mut() {
                Stream::Server(s) => std::pin::Pin::new(s).poll_flush(cx),
                Stream::Client(s) => std::pin::Pin::new(s).poll_flush(cx),
            }
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            match self.get_mut() {
                Stream::Server(s) => std::pin::Pin::new(s).poll_shutdown(cx),
                Stream::Client(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            }
        }
    }

    pub struct Listener {
        name: String,
        /// Pre-created pipe instance waiting for the next connector. Named
        /// pipes require an instance to exist before a client can connect,
        /// so one is always staged ahead of `accept`.
        next: Option<NamedPipeServer>,
    }

    impl Listener {
        pub fn bind(path: &Path) -> io::Result<Self> {
            let name = path.to_string_lossy().into_owned();
            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&name)?;
            Ok(Self {
                name,
                next: Some(first),
            })
        }

        pub async fn accept(&mut self) -> io::Result<Stream> {
            // `next` is vacated only transiently; a failed replacement
            // create leaves it empty and the error surfaces to the caller.
            let server = match self.next.take() {
                Some(s) => s,
                None => ServerOptions::new().create(&self.name)?,
            };
            server.connect().await?;
            self.next = Some(ServerOptions::new().create(&self.name)?);
            Ok(Stream::Server(server))
        }
    }

    pub async fn connect(path: &Path) -> io::Result<Stream> {
        let name = path.to_string_lossy();
        let client = ClientOptions::new().open(name.as_ref())?;
        Ok(Stream::Client(client))
    }
}

/// Remove a leftover endpoint file, best effort. No-op on Windows where the
/// pipe namespace self-releases on last-handle-close.
pub fn unlink(path: &Path) {
    #[cfg(unix)]
    {
        let _ = std::fs::remove_file(path);
    }
    #[cfg(windows)]
    {
        let _ = path;
    }
}
