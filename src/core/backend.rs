//! Kernel backend interface
//!
//! Each supported kernel packet filter ABI implements [`Backend`]. Exactly one
//! implementation is compiled in and exposed as [`crate::core::ActiveBackend`];
//! nothing dispatches between backends at runtime.

use crate::core::control::ControlOp;
use crate::core::firewall::Rule;

/// Classification of one line of the kernel rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLine<R> {
    /// A rule record, already normalized and converted to kernel byte order
    Rule(R),
    /// Well-formed line whose chain or target is not one we model
    Foreign,
    /// Line does not have the table's record shape; ends enumeration
    Malformed,
}

/// Binary and text layout knowledge for one kernel packet filter ABI
pub trait Backend {
    /// Kernel rule record passed through the control socket
    type Record;

    /// Pseudo-file listing the installed rules
    const TABLE_PATH: &'static str;

    /// Translates a canonical rule into a zeroed-then-filled kernel record.
    fn encode(rule: &Rule) -> Self::Record;

    /// Translates a kernel record back into a canonical rule.
    fn decode(record: &Self::Record) -> Rule;

    /// Raw bytes handed to the kernel as the socket option payload.
    fn payload(record: &Self::Record) -> Vec<u8>;

    /// Socket option name for a control operation at `IPPROTO_IP` level.
    fn option_name(op: ControlOp) -> libc::c_int;

    /// Parses and classifies one line of the rule table.
    fn parse_line(line: &str) -> TableLine<Self::Record>;
}
