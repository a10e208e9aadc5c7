//! IPv6 address normalization
//!
//! Configuration and live interface queries write the same address in
//! different ways (`fd00::1`, `fd00::1/64`, `FD00:0::0001`). Everything that
//! compares addresses goes through [`normalize`], which strips the optional
//! prefix-length suffix and parses the rest into an [`Ipv6Addr`], so equality
//! is numeric rather than textual.

use crate::error::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Largest valid IPv6 prefix length
pub const MAX_PREFIX_LEN: u8 = 128;

/// An IPv6 address with any prefix length removed
///
/// This is the equality key used by the reconciler and the drift monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedAddress(Ipv6Addr);

impl NormalizedAddress {
    /// Wrap an already parsed address
    pub fn new(addr: Ipv6Addr) -> Self {
        Self(addr)
    }

    /// The underlying address
    pub fn addr(&self) -> Ipv6Addr {
        self.0
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NormalizedAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        normalize(s)
    }
}

impl From<Ipv6Addr> for NormalizedAddress {
    fn from(addr: Ipv6Addr) -> Self {
        Self(addr)
    }
}

/// Canonicalize an address string for comparison
///
/// Accepts `addr` or `addr/len`. Returns [`Error::InvalidAddress`] when the
/// address part is not IPv6; the prefix part is ignored here.
pub fn normalize(input: &str) -> Result<NormalizedAddress> {
    let trimmed = input.trim();
    let addr_part = match trimmed.split_once('/') {
        Some((addr, _)) => addr,
        None => trimmed,
    };

    addr_part
        .parse::<Ipv6Addr>()
        .map(NormalizedAddress)
        .map_err(|e| Error::invalid_address(input, e.to_string()))
}

/// An address together with the prefix length it is configured with
///
/// This is the form handed to an [`AddressCommandExecutor`](crate::traits::AddressCommandExecutor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPrefix {
    /// The address itself
    pub address: NormalizedAddress,
    /// Prefix length (0..=128)
    pub prefix_len: u8,
}

impl AddressPrefix {
    /// Create a new address/prefix pair
    pub fn new(address: impl Into<NormalizedAddress>, prefix_len: u8) -> Result<Self> {
        let address = address.into();
        if prefix_len > MAX_PREFIX_LEN {
            return Err(Error::invalid_address(
                format!("{}/{}", address, prefix_len),
                format!("prefix length must be at most {}", MAX_PREFIX_LEN),
            ));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Parse `addr` or `addr/len`, using `default_prefix_len` when no suffix is given
    pub fn parse(input: &str, default_prefix_len: u8) -> Result<Self> {
        let address = normalize(input)?;
        let prefix_len = match input.trim().split_once('/') {
            Some((_, len)) => len.parse::<u8>().map_err(|e| {
                Error::invalid_address(input, format!("bad prefix length '{}': {}", len, e))
            })?,
            None => default_prefix_len,
        };

        if prefix_len > MAX_PREFIX_LEN {
            return Err(Error::invalid_address(
                input,
                format!("prefix length must be at most {}", MAX_PREFIX_LEN),
            ));
        }

        Ok(Self {
            address,
            prefix_len,
        })
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_suffix_is_ignored() {
        assert_eq!(normalize("fd00::1/64").unwrap(), normalize("fd00::1").unwrap());
    }

    #[test]
    fn test_notation_differences_compare_equal() {
        let a = normalize("fd00::1").unwrap();
        assert_eq!(a, normalize("FD00:0:0::1").unwrap());
        assert_eq!(a, normalize("fd00:0000:0000:0000:0000:0000:0000:0001/128").unwrap());
        assert_eq!(a, normalize("  fd00::1  ").unwrap());
        assert_ne!(a, normalize("fd00::2").unwrap());
    }

    #[test]
    fn test_display_is_compressed_lowercase() {
        let a = normalize("FD00:0000::00AB/64").unwrap();
        assert_eq!(a.to_string(), "fd00::ab");
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        for bad in ["", "not-an-address", "192.0.2.1", "fd00::g", "/64"] {
            let err = normalize(bad).unwrap_err();
            assert!(err.is_invalid_address(), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn test_address_prefix_default_length() {
        let p = AddressPrefix::parse("fd00::2", 64).unwrap();
        assert_eq!(p.prefix_len, 64);
        assert_eq!(p.to_string(), "fd00::2/64");

        let p = AddressPrefix::parse("fd00::2/112", 64).unwrap();
        assert_eq!(p.prefix_len, 112);
    }

    #[test]
    fn test_address_prefix_rejects_bad_length() {
        assert!(AddressPrefix::parse("fd00::2/129", 64).is_err());
        assert!(AddressPrefix::parse("fd00::2/abc", 64).is_err());
        assert!(AddressPrefix::parse("fd00::2/", 64).is_err());
        assert!(AddressPrefix::new("fd00::2".parse::<Ipv6Addr>().unwrap(), 200).is_err());
    }
}
