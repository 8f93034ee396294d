//! Core rule translation and kernel interaction
//!
//! - [`firewall`]: canonical, kernel-independent rule model
//! - [`netmask`]: prefix length and netmask conversion
//! - [`backend`]: interface every kernel ABI backend implements
//! - [`ipchains`]: Linux ipchains record layout, labels and table format
//! - [`control`]: privileged control socket
//! - [`table`]: rule table enumeration
//! - [`handle`]: the [`Firewall`](handle::Firewall) handle tying them together
//! - [`error`]: error types for firewall operations

pub mod backend;
pub mod control;
pub mod error;
pub mod firewall;
pub mod handle;
#[cfg(feature = "ipchains")]
pub mod ipchains;
pub mod netmask;
pub mod table;

/// Kernel backend selected at build time
#[cfg(feature = "ipchains")]
pub type ActiveBackend = ipchains::Ipchains;

#[cfg(not(feature = "ipchains"))]
compile_error!("fwchains needs a kernel backend feature; enable `ipchains`");

#[cfg(test)]
pub mod test_helpers;
