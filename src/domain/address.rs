// src/domain/address.rs

//! Local socket addresses.
//!
//! Two forms are accepted:
//!
//! - a filesystem path (`/run/device/control.sock`)
//! - a Linux abstract-namespace name, written with a leading `@`
//!   (`@/tmp/control.sock`). Abstract sockets leave no file behind and
//!   vanish with the listener.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::net::{UnixListener, UnixStream};

use crate::{LinkError, Result};

/// `sun_path` is 108 bytes on Linux and 104 on macOS; use the smaller.
const MAX_SOCKET_PATH: usize = 104;

/// Rendezvous point for a local stream socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    /// Socket file on the filesystem.
    Path(PathBuf),
    /// Abstract-namespace name (without the leading `@`).
    Abstract(String),
}

impl SocketAddress {
    // ---
    /// Parse an address: `@name` is abstract, anything else is a path.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidAddress`] for an empty address or one that does
    /// not fit in `sun_path`.
    pub fn parse(text: &str) -> Result<Self> {
        // ---
        let address = match text.strip_prefix('@') {
            Some(name) => Self::Abstract(name.to_string()),
            None => Self::Path(PathBuf::from(text)),
        };
        address.validate()?;
        Ok(address)
    }

    /// Filesystem socket address.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Abstract-namespace socket address.
    pub fn abstract_name(name: impl Into<String>) -> Self {
        Self::Abstract(name.into())
    }

    fn validate(&self) -> Result<()> {
        // ---
        let len = match self {
            Self::Path(path) => path.as_os_str().len(),
            Self::Abstract(name) => name.len(),
        };
        if len == 0 {
            return Err(LinkError::InvalidAddress("empty socket address".into()));
        }
        if len >= MAX_SOCKET_PATH {
            return Err(LinkError::InvalidAddress(format!(
                "socket address too long ({len} bytes, max {}): {self}",
                MAX_SOCKET_PATH - 1
            )));
        }
        Ok(())
    }

    /// Bind a listener on this address.
    ///
    /// For a path address, a stale socket file is removed first and the
    /// parent directory is created if missing.
    pub(crate) fn bind(&self) -> Result<UnixListener> {
        // ---
        self.validate()?;

        let listener = match self {
            Self::Path(path) => {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| {
                        LinkError::InvalidAddress(format!(
                            "failed to remove stale socket {}: {e}",
                            path.display()
                        ))
                    })?;
                }
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::os::unix::net::UnixListener::bind(path)?
            }
            Self::Abstract(name) => bind_abstract(name)?,
        };

        listener.set_nonblocking(true)?;
        Ok(UnixListener::from_std(listener)?)
    }

    /// Open a stream to a listener on this address.
    pub(crate) async fn connect(&self) -> io::Result<UnixStream> {
        // ---
        match self {
            Self::Path(path) => UnixStream::connect(path).await,
            Self::Abstract(name) => {
                let stream = connect_abstract(name)?;
                stream.set_nonblocking(true)?;
                UnixStream::from_std(stream)
            }
        }
    }

    /// Remove the socket file left by a listener, if any.
    pub(crate) fn cleanup(&self) {
        if let Self::Path(path) = self {
            let _ = std::fs::remove_file(path);
        }
    }

    /// The socket file path, for path addresses.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Abstract(_) => None,
        }
    }
}

#[cfg(target_os = "linux")]
fn bind_abstract(name: &str) -> io::Result<std::os::unix::net::UnixListener> {
    use std::os::linux::net::SocketAddrExt;
    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
    std::os::unix::net::UnixListener::bind_addr(&addr)
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
    std::os::unix::net::UnixStream::connect_addr(&addr)
}

#[cfg(not(target_os = "linux"))]
fn bind_abstract(_name: &str) -> io::Result<std::os::unix::net::UnixListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket names are only available on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_name: &str) -> io::Result<std::os::unix::net::UnixStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket names are only available on Linux",
    ))
}

impl FromStr for SocketAddress {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Abstract(name) => write!(f, "@{name}"),
        }
    }
}
