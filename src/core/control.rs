//! Privileged control socket for installing and removing kernel rules
//!
//! The kernel exposes rule mutation as socket options at `IPPROTO_IP` level on
//! a raw IPv4 socket. [`ControlSocket`] is the seam between the rule handle and
//! that socket, so the control path can run against an in-memory kernel.

use nix::errno::Errno;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use tracing::{debug, warn};

use crate::core::error::{Error, Result};

/// Control-plane operation carried by a socket option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum ControlOp {
    /// Append the rule to the end of its chain
    #[strum(serialize = "append")]
    Append,
    /// Remove the first rule whose record matches byte for byte
    #[strum(serialize = "delete")]
    Delete,
}

/// Transport for control-plane requests
pub trait ControlSocket {
    /// Issues `setsockopt(IPPROTO_IP, name, payload)`.
    ///
    /// # Errors
    ///
    /// Returns the errno the kernel reported.
    fn set_option(&mut self, name: libc::c_int, payload: &[u8]) -> std::result::Result<(), Errno>;

    /// Releases the underlying descriptor.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by `close(2)`.
    fn close(self) -> std::result::Result<(), Errno>
    where
        Self: Sized;
}

/// Raw `AF_INET` socket owning its descriptor
#[derive(Debug)]
pub struct RawSocket {
    fd: OwnedFd,
}

impl RawSocket {
    /// Opens a raw IPv4 socket. Requires `CAP_NET_RAW`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` carrying the OS error if the socket cannot be created.
    pub fn open() -> Result<Self> {
        // SAFETY: socket(2) takes no pointers
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_RAW) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if !nix::unistd::geteuid().is_root() {
                warn!("Raw socket creation failed while not running as root");
            }
            return Err(Error::resource("raw control socket", err));
        }

        // SAFETY: fd was just returned by socket(2) and has no other owner
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        debug!(fd = fd.as_raw_fd(), "Opened raw control socket");
        Ok(Self { fd })
    }
}

impl ControlSocket for RawSocket {
    fn set_option(&mut self, name: libc::c_int, payload: &[u8]) -> std::result::Result<(), Errno> {
        let len = libc::socklen_t::try_from(payload.len()).map_err(|_| Errno::EINVAL)?;
        // SAFETY: payload is valid for reads of len bytes for the duration of the call
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::IPPROTO_IP,
                name,
                payload.as_ptr().cast(),
                len,
            )
        };
        Errno::result(ret).map(drop)
    }

    fn close(self) -> std::result::Result<(), Errno> {
        let fd = self.fd.into_raw_fd();
        debug!(fd, "Closing raw control socket");
        // SAFETY: into_raw_fd released ownership, so fd is closed exactly once here
        Errno::result(unsafe { libc::close(fd) }).map(drop)
    }
}
