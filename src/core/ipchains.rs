//! Linux ipchains backend
//!
//! Rules are installed with `setsockopt(IPPROTO_IP, IP_FW_*)` carrying a
//! `struct ip_fwchange`, and listed from `/proc/net/ip_fwchains`, which prints
//! one rule per line:
//!
//! ```text
//! input 00000000/00000000->C0A80001/FFFFFFFF eth0 0 0 6 0 0 0 0 80-80 1024-65535 AFF X00 0 0 65535 ACCEPT
//! ```
//!
//! Fields, in order: chain, `src/smsk->dst/dmsk` (hex, host order), interface
//! (`-` for any), flags and inverse flags (hex), protocol, packet and byte
//! counters as high/low halves, source and destination port ranges, TOS and/xor
//! masks, redirect port (hex), mark, output size and target (`-` for none).
//!
//! Kernel-only fields survive a parse but are dropped by [`Ipchains::decode`]
//! and zeroed by [`Ipchains::encode`].

use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;

use crate::core::backend::{Backend, TableLine};
use crate::core::control::ControlOp;
use crate::core::firewall::{Action, Direction, Endpoint, IFNAMSIZ, PortRange, Rule};
use crate::core::netmask::{mask_to_prefix, prefix_to_mask};

pub const PROC_IPCHAINS_FILE: &str = "/proc/net/ip_fwchains";

const IP_FW_BASE_CTL: libc::c_int = 64;
/// Append a rule to a chain, takes `ip_fwchange`
pub const IP_FW_APPEND: libc::c_int = IP_FW_BASE_CTL;
/// Delete the first rule matching an `ip_fwchange`
pub const IP_FW_DELETE: libc::c_int = IP_FW_BASE_CTL + 3;

/// Longest chain or target label
pub const IP_FW_MAX_LABEL_LENGTH: usize = 8;
const LABEL_SIZE: usize = IP_FW_MAX_LABEL_LENGTH + 1;

pub const IP_FW_LABEL_ACCEPT: &str = "ACCEPT";
pub const IP_FW_LABEL_BLOCK: &str = "DENY";
pub const IP_FW_LABEL_REJECT: &str = "REJECT";
pub const IP_FW_LABEL_INPUT: &str = "input";
pub const IP_FW_LABEL_OUTPUT: &str = "output";

/// Token the table prints for an absent interface or target
pub const PLACEHOLDER: &str = "-";

/// Size of `struct ip_fwchange`, trailing padding included
pub const RECORD_LEN: usize = 80;

/// NUL-terminated fixed-size C string buffer.
///
/// Writes truncate to `N - 1` bytes so a terminator always fits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    pub fn new(s: &str) -> Self {
        let mut buf = [0u8; N];
        let bytes = s.as_bytes();
        let len = bytes.len().min(N - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    /// Bytes up to the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn is(&self, s: &str) -> bool {
        self.as_bytes() == s.as_bytes()
    }

    pub fn clear(&mut self) {
        self.0 = [0; N];
    }

    pub fn raw(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

/// `struct ip_fwchange`: an `ip_fw` rule, its target label and its chain label.
///
/// Addresses and masks are stored as `s_addr` values, i.e. network byte order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpFwChange {
    pub src: u32,
    pub dst: u32,
    pub smsk: u32,
    pub dmsk: u32,
    pub mark: u32,
    pub proto: u16,
    pub flags: u16,
    pub inv_flags: u16,
    pub sports: [u16; 2],
    pub dports: [u16; 2],
    pub redirect_port: u16,
    pub output_size: u16,
    pub via: FixedStr<IFNAMSIZ>,
    pub tos_and: u8,
    pub tos_xor: u8,
    /// Rule target (`ip_fwuser.label`)
    pub target: FixedStr<LABEL_SIZE>,
    /// Chain the rule lives in (`fwc_label`)
    pub chain: FixedStr<LABEL_SIZE>,
}

impl IpFwChange {
    /// Rewrites the `-` placeholder in the target and interface fields to empty.
    pub fn normalize_placeholders(&mut self) {
        if self.target.is(PLACEHOLDER) {
            self.target.clear();
        }
        if self.via.is(PLACEHOLDER) {
            self.via.clear();
        }
    }

    /// True when the target and chain are ones the canonical model covers.
    pub fn is_modelled(&self) -> bool {
        let target_known = [IP_FW_LABEL_ACCEPT, IP_FW_LABEL_BLOCK, IP_FW_LABEL_REJECT]
            .iter()
            .any(|label| self.target.is(label));
        let chain_known = self.chain.is(IP_FW_LABEL_INPUT) || self.chain.is(IP_FW_LABEL_OUTPUT);
        target_known && chain_known
    }

    /// Converts the address and mask fields from host to network order.
    fn convert_to_network_order(&mut self) {
        self.src = self.src.to_be();
        self.dst = self.dst.to_be();
        self.smsk = self.smsk.to_be();
        self.dmsk = self.dmsk.to_be();
    }

    /// Serializes the record with the kernel's C layout (native endian).
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut w = RecordWriter::default();
        for word in [self.src, self.dst, self.smsk, self.dmsk, self.mark] {
            w.put(&word.to_ne_bytes());
        }
        for half in [
            self.proto,
            self.flags,
            self.inv_flags,
            self.sports[0],
            self.sports[1],
            self.dports[0],
            self.dports[1],
            self.redirect_port,
            self.output_size,
        ] {
            w.put(&half.to_ne_bytes());
        }
        w.put(self.via.raw());
        w.put(&[self.tos_and, self.tos_xor]);
        w.put(self.target.raw());
        w.align(4);
        w.put(self.chain.raw());
        w.align(4);
        debug_assert_eq!(w.pos, RECORD_LEN);
        w.buf
    }
}

struct RecordWriter {
    buf: [u8; RECORD_LEN],
    pos: usize,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self {
            buf: [0; RECORD_LEN],
            pos: 0,
        }
    }
}

impl RecordWriter {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn align(&mut self, to: usize) {
        self.pos = self.pos.next_multiple_of(to);
    }
}

/// The ipchains kernel interface
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipchains;

impl Backend for Ipchains {
    type Record = IpFwChange;

    const TABLE_PATH: &'static str = PROC_IPCHAINS_FILE;

    fn encode(rule: &Rule) -> IpFwChange {
        let target = match rule.action {
            Action::Allow => IP_FW_LABEL_ACCEPT,
            Action::Block => IP_FW_LABEL_BLOCK,
        };
        let chain = match rule.direction {
            Direction::In => IP_FW_LABEL_INPUT,
            Direction::Out => IP_FW_LABEL_OUTPUT,
        };

        // ICMP type/code is not carried
        IpFwChange {
            via: FixedStr::new(&rule.device),
            target: FixedStr::new(target),
            chain: FixedStr::new(chain),
            proto: u16::from(rule.proto),
            src: u32::from(rule.src.addr).to_be(),
            dst: u32::from(rule.dst.addr).to_be(),
            smsk: prefix_to_mask(rule.src.bits).to_be(),
            dmsk: prefix_to_mask(rule.dst.bits).to_be(),
            sports: [rule.sport.start, rule.sport.end],
            dports: [rule.dport.start, rule.dport.end],
            ..IpFwChange::default()
        }
    }

    fn decode(record: &IpFwChange) -> Rule {
        // Unknown targets fail closed to Block, unknown chains to Out
        let action = if record.target.is(IP_FW_LABEL_ACCEPT) {
            Action::Allow
        } else {
            Action::Block
        };
        let direction = if record.chain.is(IP_FW_LABEL_INPUT) {
            Direction::In
        } else {
            Direction::Out
        };

        Rule {
            device: record.via.to_string_lossy().into_owned(),
            action,
            direction,
            proto: (record.proto & 0xFF) as u8,
            src: endpoint(record.src, record.smsk),
            dst: endpoint(record.dst, record.dmsk),
            sport: PortRange::new(record.sports[0], record.sports[1]),
            dport: PortRange::new(record.dports[0], record.dports[1]),
        }
    }

    fn payload(record: &IpFwChange) -> Vec<u8> {
        record.to_bytes().to_vec()
    }

    fn option_name(op: ControlOp) -> libc::c_int {
        match op {
            ControlOp::Append => IP_FW_APPEND,
            ControlOp::Delete => IP_FW_DELETE,
        }
    }

    fn parse_line(line: &str) -> TableLine<IpFwChange> {
        let Some(mut record) = scan_record(line) else {
            return TableLine::Malformed;
        };
        record.normalize_placeholders();
        if !record.is_modelled() {
            return TableLine::Foreign;
        }
        record.convert_to_network_order();
        TableLine::Rule(record)
    }
}

fn endpoint(addr: u32, mask: u32) -> Endpoint {
    Endpoint::new(
        Ipv4Addr::from(u32::from_be(addr)),
        mask_to_prefix(u32::from_be(mask)),
    )
}

/// Scans one table line into a record with host-order addresses.
///
/// Returns `None` unless the line has exactly the dump layout.
fn scan_record(line: &str) -> Option<IpFwChange> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let [
        chain,
        addrs,
        via,
        flags,
        inv_flags,
        proto,
        packets_hi,
        packets_lo,
        bytes_hi,
        bytes_lo,
        sports,
        dports,
        tos_and,
        tos_xor,
        redirect_port,
        mark,
        output_size,
        target,
    ] = tokens.as_slice()
    else {
        return None;
    };

    let (src, dst) = addrs.split_once("->")?;
    let (src, smsk) = src.split_once('/')?;
    let (dst, dmsk) = dst.split_once('/')?;

    // Counters only have to be well-formed
    for counter in [packets_hi, packets_lo, bytes_hi, bytes_lo] {
        counter.parse::<u32>().ok()?;
    }

    Some(IpFwChange {
        src: hex_u32(src)?,
        dst: hex_u32(dst)?,
        smsk: hex_u32(smsk)?,
        dmsk: hex_u32(dmsk)?,
        mark: mark.parse().ok()?,
        proto: proto.parse().ok()?,
        flags: hex_u16(flags)?,
        inv_flags: hex_u16(inv_flags)?,
        sports: port_pair(sports)?,
        dports: port_pair(dports)?,
        redirect_port: hex_u16(redirect_port)?,
        output_size: output_size.parse().ok()?,
        via: label::<IFNAMSIZ>(via)?,
        tos_and: hex_u8(tos_and.strip_prefix('A')?)?,
        tos_xor: hex_u8(tos_xor.strip_prefix('X')?)?,
        target: label::<LABEL_SIZE>(target)?,
        chain: label::<LABEL_SIZE>(chain)?,
    })
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn hex_u32(s: &str) -> Option<u32> {
    u32::from_str_radix(strip_hex_prefix(s), 16).ok()
}

fn hex_u16(s: &str) -> Option<u16> {
    u16::from_str_radix(strip_hex_prefix(s), 16).ok()
}

fn hex_u8(s: &str) -> Option<u8> {
    u8::from_str_radix(strip_hex_prefix(s), 16).ok()
}

fn port_pair(s: &str) -> Option<[u16; 2]> {
    let (lo, hi) = s.split_once('-')?;
    Some([lo.parse().ok()?, hi.parse().ok()?])
}

/// Copies a token that must fit its buffer without truncation
fn label<const N: usize>(token: &str) -> Option<FixedStr<N>> {
    (token.len() < N).then(|| FixedStr::new(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH0_LINE: &str = "input 00000000/00000000->C0A80001/FFFFFFFF eth0 0 0 6 \
                             10 20 0 1500 80-80 1024-65535 AFF X00 0 0 65535 ACCEPT";

    fn parsed(line: &str) -> IpFwChange {
        match Ipchains::parse_line(line) {
            TableLine::Rule(record) => record,
            other => panic!("expected a rule record, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_labels() {
        let allow_in = Ipchains::encode(&Rule::new(Action::Allow, Direction::In));
        assert!(allow_in.target.is(IP_FW_LABEL_ACCEPT));
        assert!(allow_in.chain.is(IP_FW_LABEL_INPUT));

        let block_out = Ipchains::encode(&Rule::new(Action::Block, Direction::Out));
        assert!(block_out.target.is(IP_FW_LABEL_BLOCK));
        assert!(block_out.chain.is(IP_FW_LABEL_OUTPUT));
    }

    #[test]
    fn test_encode_zeroes_kernel_only_fields() {
        let record = Ipchains::encode(&Rule::new(Action::Allow, Direction::In).with_proto(6));
        assert_eq!(record.flags, 0);
        assert_eq!(record.inv_flags, 0);
        assert_eq!(record.mark, 0);
        assert_eq!(record.redirect_port, 0);
        assert_eq!(record.output_size, 0);
        assert_eq!((record.tos_and, record.tos_xor), (0, 0));
    }

    #[test]
    fn test_encode_network_order_addresses() {
        let rule = Rule::new(Action::Allow, Direction::In)
            .with_src("192.168.1.0/24".parse().unwrap());
        let record = Ipchains::encode(&rule);
        assert_eq!(record.src.to_ne_bytes(), [192, 168, 1, 0]);
        assert_eq!(record.smsk.to_ne_bytes(), [255, 255, 255, 0]);
    }

    #[test]
    fn test_encode_truncates_device() {
        let rule = Rule::new(Action::Allow, Direction::In).with_device("abcdefghijklmnopqrst");
        let record = Ipchains::encode(&rule);
        assert_eq!(record.via.as_bytes(), b"abcdefghijklmno");
    }

    #[test]
    fn test_payload_layout() {
        let rule = Rule::new(Action::Allow, Direction::In)
            .with_device("eth0")
            .with_proto(17)
            .with_dst("10.0.0.1".parse().unwrap())
            .with_dport(PortRange::single(53));
        let bytes = Ipchains::payload(&Ipchains::encode(&rule));

        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(&bytes[4..8], &[10, 0, 0, 1]);
        assert_eq!(&bytes[12..16], &[255, 255, 255, 255]);
        assert_eq!(&bytes[20..22], &17u16.to_ne_bytes());
        assert_eq!(&bytes[30..32], &53u16.to_ne_bytes());
        assert_eq!(&bytes[38..43], b"eth0\0");
        assert_eq!(&bytes[56..63], b"ACCEPT\0");
        assert_eq!(&bytes[65..68], &[0, 0, 0]);
        assert_eq!(&bytes[68..74], b"input\0");
        assert_eq!(&bytes[77..80], &[0, 0, 0]);
    }

    #[test]
    fn test_decode_reject_is_block() {
        let mut record = Ipchains::encode(&Rule::new(Action::Allow, Direction::In));
        record.target = FixedStr::new(IP_FW_LABEL_REJECT);
        let rule = Ipchains::decode(&record);
        assert_eq!(rule.action, Action::Block);
        assert!(Ipchains::encode(&rule).target.is(IP_FW_LABEL_BLOCK));
    }

    #[test]
    fn test_decode_unknown_labels_fail_closed() {
        let record = IpFwChange {
            target: FixedStr::new("MASQ"),
            chain: FixedStr::new("forward"),
            ..IpFwChange::default()
        };
        let rule = Ipchains::decode(&record);
        assert_eq!(rule.action, Action::Block);
        assert_eq!(rule.direction, Direction::Out);
    }

    #[test]
    fn test_decode_masks_to_prefixes() {
        let record = IpFwChange {
            smsk: 0xFFFF_0000u32.to_be(),
            dmsk: 0xFFFF_FFFFu32.to_be(),
            ..IpFwChange::default()
        };
        let rule = Ipchains::decode(&record);
        assert_eq!(rule.src.bits, 16);
        assert_eq!(rule.dst.bits, 32);
    }

    #[test]
    fn test_parse_line_well_formed() {
        let record = parsed(ETH0_LINE);
        assert!(record.chain.is("input"));
        assert!(record.via.is("eth0"));
        assert_eq!(record.proto, 6);
        assert_eq!(record.sports, [80, 80]);
        assert_eq!(record.dports, [1024, 65535]);
        assert_eq!(record.tos_and, 0xFF);
        assert_eq!(record.output_size, 65535);
        // Host-order table values end up in network order
        assert_eq!(record.dst.to_ne_bytes(), [192, 168, 0, 1]);
        assert_eq!(record.dmsk, u32::MAX);

        let rule = Ipchains::decode(&record);
        assert_eq!(rule.dst, Endpoint::host(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(rule.src, Endpoint::ANY);
    }

    #[test]
    fn test_parse_line_placeholders() {
        let line = "output 0A000000/FF000000->00000000/00000000 - 0 0 17 \
                    0 0 0 0 0-65535 53-53 AFF X00 0 0 0 DENY";
        let record = parsed(line);
        assert!(record.via.as_bytes().is_empty());

        // A `-` target normalizes to empty, which is not a modelled target
        let no_target = line.replace("DENY", "-");
        assert_eq!(Ipchains::parse_line(&no_target), TableLine::Foreign);
    }

    #[test]
    fn test_normalize_placeholders_empties_target_and_interface() {
        let mut record = IpFwChange {
            target: FixedStr::new(PLACEHOLDER),
            via: FixedStr::new(PLACEHOLDER),
            chain: FixedStr::new(IP_FW_LABEL_INPUT),
            ..IpFwChange::default()
        };
        record.normalize_placeholders();
        assert!(record.target.as_bytes().is_empty(), "target {:?}", record.target);
        assert!(record.via.as_bytes().is_empty(), "interface {:?}", record.via);
        assert!(record.chain.is(IP_FW_LABEL_INPUT));

        // Only the bare placeholder is rewritten
        let mut named = IpFwChange {
            target: FixedStr::new("-X"),
            via: FixedStr::new("eth-0"),
            ..IpFwChange::default()
        };
        named.normalize_placeholders();
        assert!(named.target.is("-X"));
        assert!(named.via.is("eth-0"));
    }

    #[test]
    fn test_parse_line_foreign_labels() {
        let forward = ETH0_LINE.replacen("input", "forward", 1);
        assert_eq!(Ipchains::parse_line(&forward), TableLine::Foreign);

        let masq = ETH0_LINE.replace("ACCEPT", "MASQ");
        assert_eq!(Ipchains::parse_line(&masq), TableLine::Foreign);

        let user_chain = ETH0_LINE.replacen("input", "mychain", 1);
        assert_eq!(Ipchains::parse_line(&user_chain), TableLine::Foreign);
    }

    #[test]
    fn test_parse_line_malformed() {
        let cases = [
            String::new(),
            "Chain input (policy ACCEPT):".to_string(),
            "input 00000000/00000000->C0A80001/FFFFFFFF eth0 0 0 6".to_string(),
            // Extra trailing token
            format!("{ETH0_LINE} extra"),
            // Bad hex address
            ETH0_LINE.replace("C0A80001", "C0A8000G"),
            // Port out of range
            ETH0_LINE.replace("80-80", "80-70000"),
            // Missing TOS marker
            ETH0_LINE.replace("AFF", "FF"),
            // Chain label longer than the kernel buffer
            ETH0_LINE.replacen("input", "verylongchain", 1),
            // Interface longer than IFNAMSIZ - 1
            ETH0_LINE.replace("eth0", "abcdefghijklmnop"),
        ];
        for line in &cases {
            assert_eq!(Ipchains::parse_line(line), TableLine::Malformed, "{line:?}");
        }
    }

    #[test]
    fn test_option_names() {
        assert_eq!(Ipchains::option_name(ControlOp::Append), 64);
        assert_eq!(Ipchains::option_name(ControlOp::Delete), 67);
    }
}
