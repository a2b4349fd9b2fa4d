//! Network Boundary
//!
//! An isolated network segment with one subnet per failure domain, and the
//! traffic policy applied to the host.

use crate::error::DefinitionError;
use crate::types::NetworkHandle;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Create a block; host bits must be zero
    ///
    /// # Errors
    /// Returns `InvalidCidr` for prefixes above 32 or non-zero host bits
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, DefinitionError> {
        let cidr = Self { addr, prefix };
        if prefix > 32 {
            return Err(DefinitionError::invalid_cidr(cidr.to_string(), "prefix above 32"));
        }
        if u32::from(addr) & !Self::mask(prefix) != 0 {
            return Err(DefinitionError::invalid_cidr(cidr.to_string(), "host bits set"));
        }
        Ok(cidr)
    }

    /// Block covering every address
    #[inline]
    #[must_use]
    pub const fn any() -> Self {
        Self {
            addr: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }

    /// Network address
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Prefix length
    #[inline]
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// The `index`-th sub-block of length `prefix` inside this block
    ///
    /// # Errors
    /// Returns `InvalidCidr` if the sub-block is shorter than this block or
    /// the index runs past its end
    pub fn subnet(&self, prefix: u8, index: u32) -> Result<Self, DefinitionError> {
        if prefix < self.prefix || prefix > 32 {
            return Err(DefinitionError::invalid_cidr(
                format!("{}/{prefix}", self.addr),
                "subnet mask must lie between the network prefix and 32",
            ));
        }
        let available = 1u64 << u32::from(prefix - self.prefix);
        if u64::from(index) >= available {
            return Err(DefinitionError::invalid_cidr(
                self.to_string(),
                "not enough room for the requested subnets",
            ));
        }
        let step = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(u32::from(self.addr)) + u64::from(index) * step;
        let base = u32::try_from(base)
            .map_err(|_| DefinitionError::invalid_cidr(self.to_string(), "address overflow"))?;
        Self::new(Ipv4Addr::from(base), prefix)
    }
}

impl Display for Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| DefinitionError::invalid_cidr(s, "missing prefix"))?;
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| DefinitionError::invalid_cidr(s, "bad address"))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| DefinitionError::invalid_cidr(s, "bad prefix"))?;
        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// Reachability of the subnets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetVisibility {
    /// Routed to an internet gateway, public addresses on launch
    #[default]
    Public,
    /// No route outside the network
    Isolated,
}

/// Network segment declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Failure domains to spread subnets over
    pub zone_count: u8,
    /// Subnet reachability
    pub visibility: SubnetVisibility,
    /// Address block of the whole network
    pub cidr: Cidr,
    /// Prefix length of each subnet
    pub subnet_mask: u8,
    /// Subnet group name
    pub subnet_name: String,
}

impl NetworkSpec {
    /// Default VPC block
    pub const DEFAULT_CIDR: Cidr = Cidr {
        addr: Ipv4Addr::new(10, 0, 0, 0),
        prefix: 16,
    };

    /// Default subnet prefix length
    pub const DEFAULT_SUBNET_MASK: u8 = 24;

    /// Network over `zone_count` zones with default addressing
    #[must_use]
    pub fn new(zone_count: u8, visibility: SubnetVisibility) -> Self {
        Self {
            zone_count,
            visibility,
            cidr: Self::DEFAULT_CIDR,
            subnet_mask: Self::DEFAULT_SUBNET_MASK,
            subnet_name: match visibility {
                SubnetVisibility::Public => "Public".to_string(),
                SubnetVisibility::Isolated => "Isolated".to_string(),
            },
        }
    }

    /// With network block
    #[inline]
    #[must_use]
    pub fn with_cidr(mut self, cidr: Cidr) -> Self {
        self.cidr = cidr;
        self
    }

    /// With subnet prefix length
    #[inline]
    #[must_use]
    pub fn with_subnet_mask(mut self, mask: u8) -> Self {
        self.subnet_mask = mask;
        self
    }

    /// Subnet blocks, one per zone
    ///
    /// # Errors
    /// Returns `InvalidCidr` if the subnets do not fit the network block
    pub fn subnets(&self) -> Result<Vec<Cidr>, DefinitionError> {
        (0..u32::from(self.zone_count))
            .map(|i| self.cidr.subnet(self.subnet_mask, i))
            .collect()
    }

    /// Check zone count and addressing
    ///
    /// # Errors
    /// Returns `InvalidZoneCount` or `InvalidCidr`
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.zone_count < 1 {
            return Err(DefinitionError::InvalidZoneCount(self.zone_count));
        }
        self.subnets().map(|_| ())
    }
}

/// Transport protocol of an inbound rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
    /// ICMP (ports are type/code)
    Icmp,
}

impl Protocol {
    /// Protocol name as used in rule documents
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port
    pub from: u16,
    /// Last port
    pub to: u16,
}

impl PortRange {
    /// Single port
    #[inline]
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self { from: port, to: port }
    }

    /// Range of ports
    ///
    /// # Errors
    /// Returns `InvalidPortRange` if `from > to`
    pub fn new(from: u16, to: u16) -> Result<Self, DefinitionError> {
        if from > to {
            return Err(DefinitionError::InvalidPortRange { from, to });
        }
        Ok(Self { from, to })
    }
}

/// Allowed inbound traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// Source block
    pub peer: Cidr,
    /// Protocol
    pub protocol: Protocol,
    /// Ports
    pub ports: PortRange,
    /// Why the rule exists
    pub description: String,
}

impl IngressRule {
    /// TCP rule for one port
    #[must_use]
    pub fn tcp(peer: Cidr, port: u16, description: impl Into<String>) -> Self {
        Self {
            peer,
            protocol: Protocol::Tcp,
            ports: PortRange::single(port),
            description: description.into(),
        }
    }
}

/// Traffic policy declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPolicy {
    /// Network the policy belongs to
    pub network: NetworkHandle,
    /// Human description
    pub description: String,
    /// Allowed inbound traffic
    pub inbound: Vec<IngressRule>,
    /// Allow every outbound connection
    pub outbound_allow_all: bool,
}

impl TrafficPolicy {
    /// Check every rule
    ///
    /// # Errors
    /// Returns `InvalidPortRange` for an inverted rule
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for rule in &self.inbound {
            PortRange::new(rule.ports.from, rule.ports.to)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_cidr() {
        let cidr: Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert!("10.0.0.1/16".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert_eq!(Cidr::any().to_string(), "0.0.0.0/0");
    }

    #[test]
    fn carves_one_subnet_per_zone() {
        let net = NetworkSpec::new(2, SubnetVisibility::Public);
        let subnets: Vec<String> = net.subnets().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(subnets, vec!["10.0.0.0/24", "10.0.1.0/24"]);
        assert!(net.validate().is_ok());
    }

    #[test]
    fn zero_zones_rejected() {
        let net = NetworkSpec::new(0, SubnetVisibility::Public);
        assert!(matches!(net.validate(), Err(DefinitionError::InvalidZoneCount(0))));
    }

    #[test]
    fn subnets_must_fit() {
        let net = NetworkSpec::new(3, SubnetVisibility::Isolated)
            .with_cidr("10.0.0.0/24".parse().unwrap())
            .with_subnet_mask(25);
        assert!(matches!(net.validate(), Err(DefinitionError::InvalidCidr { .. })));

        let net = NetworkSpec::new(1, SubnetVisibility::Public).with_subnet_mask(8);
        assert!(net.validate().is_err());
    }

    #[test]
    fn inverted_ports_rejected() {
        assert!(PortRange::new(443, 80).is_err());
        assert_eq!(PortRange::new(80, 443).unwrap().to, 443);
    }
}
