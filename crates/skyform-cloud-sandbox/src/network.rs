//! IPv4 CIDR arithmetic for simulated VPCs and subnets

use crate::error::{Result, SandboxError};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation; host bits must be zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - p),
        }
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == self.network
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && self.contains_addr(other.network())
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// The n-th address of the block, if in range
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        (u64::from(n) < self.size()).then(|| Ipv4Addr::from(self.network + n))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SandboxError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        let cidr = Ipv4Cidr {
            network: u32::from(addr),
            prefix,
        };
        if cidr.network & !cidr.mask() != 0 {
            return Err(invalid());
        }
        Ok(cidr)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// VPCs accept /16 to /28, as AWS does
pub fn parse_vpc_cidr(s: &str) -> Result<Ipv4Cidr> {
    let cidr: Ipv4Cidr = s.parse()?;
    if !(16..=28).contains(&cidr.prefix()) {
        return Err(SandboxError::InvalidParameter(format!(
            "VPC block size must be between /16 and /28: {}",
            s
        )));
    }
    Ok(cidr)
}

/// Security group rule sources: any valid block, host bits zero
pub fn parse_rule_cidr(s: &str) -> Result<Ipv4Cidr> {
    s.parse()
}
