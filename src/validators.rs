//! Input validation for canonical rule fields
//!
//! Rules are checked before they are encoded for the kernel so that a
//! malformed value is reported with the field that caused it instead of
//! an opaque `EINVAL` from the control socket.

use crate::core::firewall::MAX_DEVICE_LEN;
use crate::core::netmask::IPV4_BITS;

/// Validates a port range.
///
/// Port 0 is allowed: the kernel treats `0-65535` as "any port".
///
/// # Errors
///
/// Returns `Err` if the start port is greater than the end port.
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    if start > end {
        Err(format!(
            "Start port {start} must be less than or equal to end port {end}"
        ))
    } else {
        Ok((start, end))
    }
}

/// Validates an IPv4 prefix length.
///
/// # Errors
///
/// Returns `Err` if the prefix is longer than 32 bits.
pub fn validate_prefix(bits: u8) -> Result<u8, String> {
    if bits > IPV4_BITS {
        Err(format!("Prefix length /{bits} exceeds /{IPV4_BITS}"))
    } else {
        Ok(bits)
    }
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore, plus colon for aliases
///   and a trailing `+` wildcard
/// - Cannot be "." or ".."
/// - Empty means "any interface"
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
///
/// # Examples
///
/// ```
/// use fwchains::validators::validate_interface;
///
/// assert!(validate_interface("eth0").is_ok());
/// assert!(validate_interface("ppp+").is_ok());
/// assert!(validate_interface("").is_ok());
/// assert!(validate_interface("eth0\0").is_err());
/// ```
pub fn validate_interface(name: &str) -> Result<&str, String> {
    if name.is_empty() {
        return Ok(name);
    }

    if name.len() > MAX_DEVICE_LEN {
        return Err(format!(
            "Interface name too long (max {MAX_DEVICE_LEN} characters)"
        ));
    }

    if name == "." || name == ".." || name == "-" {
        return Err("Invalid interface name".to_string());
    }

    let body = name.strip_suffix('+').unwrap_or(name);
    if !body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name)
}
