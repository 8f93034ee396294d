//! fwchains - canonical packet filter rules over the Linux ipchains interface
//!
//! A [`Rule`] describes a filter rule without any kernel ABI detail. The
//! [`Firewall`] handle translates rules to kernel records to add or delete
//! them, and lists the installed rules by parsing the kernel's rule table.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, kernel record translation, control socket and table parsing
//! - [`validators`] - Rule field validation
//! - [`config`] - Runtime settings
//!
//! # Limits
//!
//! - IPv4 only
//! - ICMP type/code matching is not supported
//! - Kernel-only fields (flags, counters, marks, redirection) are not part of
//!   the rule model; the kernel's REJECT target reads back as [`Action::Block`]

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod validators;

// Re-export commonly used types
pub use crate::core::error::{Error, Result};
pub use crate::core::firewall::{Action, Direction, Endpoint, PortRange, Rule};
pub use crate::core::handle::Firewall;
