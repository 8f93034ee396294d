//! Firewall handle: add, delete and enumerate kernel rules
//!
//! # Example
//!
//! ```no_run
//! use std::ops::ControlFlow;
//! use fwchains::core::firewall::{Action, Direction, PortRange, Rule};
//! use fwchains::Firewall;
//!
//! # fn main() -> fwchains::Result<()> {
//! let mut fw = Firewall::open()?;
//!
//! let ssh = Rule::new(Action::Allow, Direction::In)
//!     .with_proto(6)
//!     .with_dport(PortRange::single(22));
//! fw.add(&ssh)?;
//!
//! fw.for_each_rule(|rule| {
//!     println!("{rule}");
//!     ControlFlow::<()>::Continue(())
//! })?;
//!
//! // Deleting needs the exact rule value used to add
//! fw.delete(&ssh)?;
//! fw.close()
//! # }
//! ```

use std::ops::ControlFlow;
use tracing::{error, info};

use crate::config::Settings;
use crate::core::ActiveBackend;
use crate::core::backend::Backend;
use crate::core::control::{ControlOp, ControlSocket, RawSocket};
use crate::core::error::{Error, Result};
use crate::core::firewall::Rule;
use crate::core::table::{self, ProcTable, RuleTable};

/// Exclusive owner of a kernel control socket plus the rule table it lists from.
///
/// Mutating calls take `&mut self`; share a handle across threads only behind
/// your own lock.
#[derive(Debug)]
pub struct Firewall<S = RawSocket, T = ProcTable> {
    socket: S,
    table: T,
    validate: bool,
}

impl Firewall {
    /// Opens the kernel control socket with settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if the raw socket cannot be created,
    /// typically `EPERM` without `CAP_NET_RAW`.
    pub fn open() -> Result<Self> {
        Self::open_with(&Settings::from_env())
    }

    /// Opens the kernel control socket with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if the raw socket cannot be created.
    pub fn open_with(settings: &Settings) -> Result<Self> {
        let socket = RawSocket::open()?;
        Ok(Self::from_parts(socket, ProcTable::new(&settings.table_path))
            .validate_rules(settings.validate_rules))
    }
}

impl<S: ControlSocket, T: RuleTable> Firewall<S, T> {
    /// Builds a handle over any control socket and rule table.
    pub fn from_parts(socket: S, table: T) -> Self {
        Self {
            socket,
            table,
            validate: true,
        }
    }

    /// Enables or disables rule validation before control calls.
    pub fn validate_rules(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    /// The rule table enumeration reads from.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Appends `rule` to the kernel chain for its direction.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an invalid rule, or
    /// `Error::ControlRejected` with the kernel's errno.
    pub fn add(&mut self, rule: &Rule) -> Result<()> {
        self.control(ControlOp::Append, rule)
    }

    /// Removes the kernel rule whose encoding equals `rule`'s.
    ///
    /// The kernel compares the full record, so every field must match the
    /// value used to add the rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an invalid rule, or
    /// `Error::ControlRejected` with the kernel's errno, e.g. when no rule matches.
    pub fn delete(&mut self, rule: &Rule) -> Result<()> {
        self.control(ControlOp::Delete, rule)
    }

    fn control(&mut self, op: ControlOp, rule: &Rule) -> Result<()> {
        if self.validate {
            rule.validate()?;
        }

        let record = ActiveBackend::encode(rule);
        let payload = ActiveBackend::payload(&record);
        match self
            .socket
            .set_option(ActiveBackend::option_name(op), &payload)
        {
            Ok(()) => {
                info!("Kernel {op} succeeded: {rule}");
                Ok(())
            }
            Err(errno) => {
                error!("Kernel {op} failed for {rule}: {errno}");
                Err(Error::ControlRejected { op, errno })
            }
        }
    }

    /// Calls `visit` for every installed rule until it returns `Break`.
    ///
    /// Returns `Continue(())` when every rule was visited, or the visitor's
    /// `Break` value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if the rule table cannot be opened or read.
    pub fn for_each_rule<B, F>(&self, visit: F) -> Result<ControlFlow<B>>
    where
        F: FnMut(&Rule) -> ControlFlow<B>,
    {
        table::enumerate::<ActiveBackend, _, _, _>(&self.table, visit)
    }

    /// Collects every installed rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if the rule table cannot be opened or read.
    pub fn rules(&self) -> Result<Vec<Rule>> {
        let mut rules = Vec::new();
        self.for_each_rule(|rule| {
            rules.push(rule.clone());
            ControlFlow::<()>::Continue(())
        })?;
        Ok(rules)
    }

    /// Closes the control socket.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resource` if `close(2)` fails.
    pub fn close(self) -> Result<()> {
        self.socket
            .close()
            .map_err(|errno| Error::resource("raw control socket", errno.into()))
    }
}
