//! Canonical firewall rule model
//!
//! A [`Rule`] describes a packet filter rule independently of any kernel ABI.
//! It is the only type that crosses the public boundary: callers build one to
//! add or delete a kernel rule, and receive one per installed rule during
//! enumeration.
//!
//! # Example
//!
//! ```
//! use fwchains::core::firewall::{Action, Direction, PortRange, Rule};
//!
//! let rule = Rule::new(Action::Allow, Direction::In)
//!     .with_device("eth0")
//!     .with_proto(6)
//!     .with_dst("192.168.1.0/24".parse().unwrap())
//!     .with_dport(PortRange::single(22));
//!
//! assert!(rule.validate().is_ok());
//! assert_eq!(rule.to_string(), "allow in eth0 tcp 0.0.0.0/0:0-65535 -> 192.168.1.0/24:22");
//! ```

use ipnetwork::{IpNetworkError, Ipv4Network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::core::error::{Error, Result};
use crate::core::netmask::{IPV4_BITS, prefix_to_mask};
use crate::validators;

/// Kernel interface name buffer size, including the trailing NUL
pub const IFNAMSIZ: usize = 16;

/// Longest interface name a rule can carry
pub const MAX_DEVICE_LEN: usize = IFNAMSIZ - 1;

/// What happens to a packet matching the rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Let the packet through
    #[strum(serialize = "allow")]
    Allow,
    /// Drop the packet
    #[default]
    #[strum(serialize = "block")]
    Block,
}

/// Traffic direction the rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Incoming traffic
    #[default]
    #[strum(serialize = "in")]
    In,
    /// Outgoing traffic
    #[strum(serialize = "out")]
    Out,
}

/// Inclusive port range; `0-65535` matches every port
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Matches any port
    pub const ANY: Self = Self {
        start: 0,
        end: u16::MAX,
    };

    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub const fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// IPv4 address with a prefix length in bits.
///
/// Host bits are kept as given; the kernel applies the mask itself.
///
/// Serializes as a CIDR string. A prefix above 32 (only reachable with
/// validation off) is written as `/32`, so it does not survive a serde
/// round trip; [`Rule::validate`] rejects such endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "Ipv4Network", into = "Ipv4Network")]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub bits: u8,
}

impl Endpoint {
    /// Matches any address
    pub const ANY: Self = Self {
        addr: Ipv4Addr::UNSPECIFIED,
        bits: 0,
    };

    pub const fn new(addr: Ipv4Addr, bits: u8) -> Self {
        Self { addr, bits }
    }

    /// A single host (`/32`)
    pub const fn host(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            bits: IPV4_BITS,
        }
    }

    /// Host-order netmask derived from the prefix length
    pub const fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(prefix_to_mask(self.bits))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::ANY
    }
}

impl From<Ipv4Network> for Endpoint {
    fn from(net: Ipv4Network) -> Self {
        Self {
            addr: net.ip(),
            bits: net.prefix(),
        }
    }
}

impl From<Endpoint> for Ipv4Network {
    fn from(endpoint: Endpoint) -> Self {
        // Prefixes above 32 are clamped to a host route
        Ipv4Network::new(endpoint.addr, endpoint.bits.min(IPV4_BITS))
            .unwrap_or_else(|_| Ipv4Network::from(endpoint.addr))
    }
}

impl FromStr for Endpoint {
    type Err = IpNetworkError;

    /// Parses `a.b.c.d/len`, or a bare address as a `/32` host
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<Ipv4Network>().map(Self::from)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.bits)
    }
}

/// Canonical packet filter rule
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rule {
    /// Interface name; empty matches any interface
    #[serde(default)]
    pub device: String,
    pub action: Action,
    pub direction: Direction,
    /// IP protocol number, 0 matches any protocol
    #[serde(default)]
    pub proto: u8,
    #[serde(default)]
    pub src: Endpoint,
    #[serde(default)]
    pub dst: Endpoint,
    #[serde(default)]
    pub sport: PortRange,
    #[serde(default)]
    pub dport: PortRange,
}

impl Rule {
    /// Creates a rule matching every packet in `direction` on any interface.
    pub fn new(action: Action, direction: Direction) -> Self {
        Self {
            action,
            direction,
            ..Self::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_proto(mut self, proto: u8) -> Self {
        self.proto = proto;
        self
    }

    pub fn with_src(mut self, src: Endpoint) -> Self {
        self.src = src;
        self
    }

    pub fn with_dst(mut self, dst: Endpoint) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_sport(mut self, sport: PortRange) -> Self {
        self.sport = sport;
        self
    }

    pub fn with_dport(mut self, dport: PortRange) -> Self {
        self.dport = dport;
        self
    }

    /// Checks the model invariants the kernel encoding relies on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the first offending field if:
    /// - the device name is too long or contains invalid characters
    /// - a prefix length exceeds 32
    /// - a port range starts after it ends
    pub fn validate(&self) -> Result<()> {
        validators::validate_interface(&self.device)
            .map_err(|message| Error::validation("device", message))?;
        validators::validate_prefix(self.src.bits)
            .map_err(|message| Error::validation("src", message))?;
        validators::validate_prefix(self.dst.bits)
            .map_err(|message| Error::validation("dst", message))?;
        validators::validate_port_range(self.sport.start, self.sport.end)
            .map_err(|message| Error::validation("sport", message))?;
        validators::validate_port_range(self.dport.start, self.dport.end)
            .map_err(|message| Error::validation("dport", message))?;
        Ok(())
    }
}

/// Short protocol name for display, falling back to the number
fn proto_name(proto: u8) -> Option<&'static str> {
    match proto {
        0 => Some("ip"),
        1 => Some("icmp"),
        6 => Some("tcp"),
        17 => Some("udp"),
        _ => None,
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = if self.device.is_empty() {
            "any"
        } else {
            self.device.as_str()
        };
        write!(f, "{} {} {} ", self.action, self.direction, device)?;
        match proto_name(self.proto) {
            Some(name) => f.write_str(name)?,
            None => write!(f, "{}", self.proto)?,
        }
        write!(
            f,
            " {}:{} -> {}:{}",
            self.src, self.sport, self.dst, self.dport
        )
    }
}
