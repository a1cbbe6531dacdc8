//! IPv4 CIDR blocks used as firewall peers

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::StackError;

/// A validated IPv4 network in CIDR notation
///
/// Host bits must be zero: `10.0.0.0/16` parses, `10.0.0.1/16` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// `0.0.0.0/0`
    pub const ANY: Ipv4Cidr = Ipv4Cidr {
        addr: Ipv4Addr::UNSPECIFIED,
        prefix_len: 0,
    };

    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, StackError> {
        let invalid = |reason| StackError::InvalidCidr {
            value: format!("{addr}/{prefix_len}"),
            reason,
        };
        if prefix_len > 32 {
            return Err(invalid("prefix length must be at most 32"));
        }
        if u32::from(addr) & !mask(prefix_len) != 0 {
            return Err(invalid("host bits must be zero"));
        }
        Ok(Self { addr, prefix_len })
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True for `0.0.0.0/0`
    pub fn is_any(&self) -> bool {
        self.prefix_len == 0
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix_len) == u32::from(self.addr)
    }
}

fn mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| StackError::InvalidCidr {
            value: s.to_string(),
            reason,
        };
        let (addr, prefix_len) = s
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<prefix length>"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| invalid("address is not a dotted-quad IPv4 address"))?;
        let prefix_len: u8 = prefix_len
            .parse()
            .map_err(|_| invalid("prefix length is not a number"))?;
        Self::new(addr, prefix_len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Ipv4Cidr = "172.31.0.0/16".parse().unwrap();
        assert_eq!(cidr.addr(), Ipv4Addr::new(172, 31, 0, 0));
        assert_eq!(cidr.prefix_len(), 16);
        assert_eq!(cidr.to_string(), "172.31.0.0/16");
    }

    #[test]
    fn test_any() {
        let cidr: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert_eq!(cidr, Ipv4Cidr::ANY);
        assert!(cidr.is_any());
        assert!(cidr.contains(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn test_host_route() {
        let cidr: Ipv4Cidr = "203.0.113.7/32".parse().unwrap();
        assert!(!cidr.is_any());
        assert!(cidr.contains(Ipv4Addr::new(203, 0, 113, 7)));
        assert!(!cidr.contains(Ipv4Addr::new(203, 0, 113, 8)));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "10.0.0.0",
            "10.0.0/8",
            "10.0.0.0/33",
            "10.0.0.1/16",
            "10.0.0.0/x",
            "::/0",
        ] {
            assert!(
                matches!(bad.parse::<Ipv4Cidr>(), Err(StackError::InvalidCidr { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_serializes_as_string() {
        let cidr: Ipv4Cidr = "10.0.0.0/8".parse().unwrap();
        assert_eq!(serde_json::to_value(cidr).unwrap(), "10.0.0.0/8");
    }
}
