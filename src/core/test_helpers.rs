//! Shared test utilities for core module tests
//!
//! Provides an in-memory kernel and rule table so tests never touch the real
//! control socket or `/proc`. This module is only compiled in test mode.

use nix::errno::Errno;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::io::{self, BufRead, Cursor, Read};
use std::rc::Rc;

use crate::core::control::ControlSocket;
use crate::core::firewall::{Action, Direction, PortRange, Rule};
use crate::core::ipchains::{IP_FW_APPEND, IP_FW_DELETE, IpFwChange, RECORD_LEN};
use crate::core::table::RuleTable;

/// Kernel stand-in that keeps appended records and deletes by byte equality.
///
/// Clones share state, so a test can keep one clone to inspect the rule list
/// after moving another into a handle.
#[derive(Debug, Default, Clone)]
pub struct MockKernel {
    records: Rc<RefCell<Vec<Vec<u8>>>>,
    closed: Rc<Cell<bool>>,
}

impl MockKernel {
    pub fn installed(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.get()
    }
}

impl ControlSocket for MockKernel {
    fn set_option(&mut self, name: libc::c_int, payload: &[u8]) -> Result<(), Errno> {
        if payload.len() != RECORD_LEN {
            return Err(Errno::EINVAL);
        }
        let mut records = self.records.borrow_mut();
        match name {
            IP_FW_APPEND => {
                records.push(payload.to_vec());
                Ok(())
            }
            IP_FW_DELETE => {
                let pos = records
                    .iter()
                    .position(|r| r == payload)
                    .ok_or(Errno::ENOENT)?;
                records.remove(pos);
                Ok(())
            }
            _ => Err(Errno::ENOPROTOOPT),
        }
    }

    fn close(self) -> Result<(), Errno> {
        self.closed.set(true);
        Ok(())
    }
}

/// In-memory rule table that records how far it was read and whether the
/// reader was dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryTable {
    content: Vec<u8>,
    consumed: Rc<Cell<u64>>,
    closed: Rc<Cell<bool>>,
}

impl MemoryTable {
    pub fn new(content: &str) -> Self {
        Self::from_bytes(content.as_bytes().to_vec())
    }

    pub fn from_bytes(content: Vec<u8>) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }

    /// Bytes consumed by the last enumeration
    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.get()
    }
}

impl RuleTable for MemoryTable {
    type Reader = TrackedReader;

    fn open(&self) -> io::Result<TrackedReader> {
        self.consumed.set(0);
        self.closed.set(false);
        Ok(TrackedReader {
            inner: Cursor::new(self.content.clone()),
            consumed: Rc::clone(&self.consumed),
            closed: Rc::clone(&self.closed),
        })
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("memory table")
    }
}

pub struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    consumed: Rc<Cell<u64>>,
    closed: Rc<Cell<bool>>,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.set(self.inner.position());
        Ok(n)
    }
}

impl BufRead for TrackedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.consumed.set(self.inner.position());
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.closed.set(true);
    }
}

/// A well-formed table line: tcp from any to 192.168.0.1, sport 80, dport 1024-65535.
pub fn table_line(chain: &str, via: &str, target: &str) -> String {
    format!(
        "{chain} 00000000/00000000->C0A80001/FFFFFFFF {via} 0 0 6 \
         0 12 0 3400 80-80 1024-65535 AFF X00 0 0 65535 {target}\n"
    )
}

/// Renders a kernel record the way the proc table prints it (host-order hex).
pub fn render_line(record: &IpFwChange) -> String {
    let via = if record.via.as_bytes().is_empty() {
        Cow::Borrowed("-")
    } else {
        record.via.to_string_lossy()
    };
    format!(
        "{:>8} {:08X}/{:08X}->{:08X}/{:08X} {} {:X} {:X} {} 0 0 0 0 {}-{} {}-{} A{:02X} X{:02X} {:X} {} {} {:>8}\n",
        record.chain.to_string_lossy(),
        u32::from_be(record.src),
        u32::from_be(record.smsk),
        u32::from_be(record.dst),
        u32::from_be(record.dmsk),
        via,
        record.flags,
        record.inv_flags,
        record.proto,
        record.sports[0],
        record.sports[1],
        record.dports[0],
        record.dports[1],
        record.tos_and,
        record.tos_xor,
        record.redirect_port,
        record.mark,
        record.output_size,
        record.target.to_string_lossy(),
    )
}

/// Creates a tcp rule for `device` matching destination port 22.
pub fn create_test_rule(device: &str, action: Action, direction: Direction) -> Rule {
    Rule::new(action, direction)
        .with_device(device)
        .with_proto(6)
        .with_src("10.0.0.0/8".parse().unwrap())
        .with_dport(PortRange::single(22))
}
