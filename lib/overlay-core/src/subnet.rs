//! Address cursors over IPv4 and MAC ranges
//!
//! A subnet is a sequence of octets plus a mask. The first `mask / 8` octets
//! are fixed; the rest are counted up one address at a time. A mutable octet
//! never takes the value zero once it has been advanced, which keeps network
//! and broadcast-like addresses out of the pool.

use std::fmt;

use tracing::{debug, warn};

use crate::{CoreError, Result};

/// Masks accepted in range strings
const VALID_MASKS: [u8; 4] = [8, 16, 24, 32];

/// Kind of address a subnet hands out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Mac,
}

impl AddressFamily {
    fn octet_count(self) -> usize {
        match self {
            AddressFamily::Ipv4 => 4,
            AddressFamily::Mac => 6,
        }
    }

    fn separator(self) -> char {
        match self {
            AddressFamily::Ipv4 => '.',
            AddressFamily::Mac => ':',
        }
    }

    fn radix(self) -> u32 {
        match self {
            AddressFamily::Ipv4 => 10,
            AddressFamily::Mac => 16,
        }
    }

    /// Mask assumed when the range string has none
    fn default_mask(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 24,
            AddressFamily::Mac => 16,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IP"),
            AddressFamily::Mac => write!(f, "MAC"),
        }
    }
}

/// Mutable cursor over an address range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subnet {
    family: AddressFamily,
    octets: Vec<u8>,
    mask: u8,
}

impl Subnet {
    /// An all-zero subnet with mask 0
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            octets: vec![0; family.octet_count()],
            mask: 0,
        }
    }

    /// Parse `a.b.c.d/mask` (IPv4) or `aa:bb:cc:dd:ee:ff/mask` (MAC)
    pub fn parse(family: AddressFamily, range: &str) -> Result<Self> {
        let invalid = |reason: String| CoreError::InvalidSubnet {
            range: range.to_string(),
            reason,
        };

        let (base, mask) = match range.split_once('/') {
            Some((base, mask)) => {
                let mask: u8 = mask
                    .parse()
                    .map_err(|_| invalid(format!("invalid range {}", mask)))?;
                (base, mask)
            }
            None => (range, family.default_mask()),
        };
        if !VALID_MASKS.contains(&mask) {
            return Err(invalid(format!("invalid range {}", mask)));
        }

        let parts: Vec<&str> = base.split(family.separator()).collect();
        if parts.len() != family.octet_count() {
            return Err(invalid(format!("invalid {} address {}", family, base)));
        }

        let octets = parts
            .iter()
            .map(|part| {
                u8::from_str_radix(part, family.radix())
                    .map_err(|_| invalid(format!("invalid {} octet {}", family, part)))
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self {
            family,
            octets,
            mask,
        })
    }

    /// Re-initialize from a range string.
    ///
    /// A malformed string is logged and leaves the subnet untouched; the
    /// caller is responsible for having a usable default in place.
    pub fn init(&mut self, range: &str) {
        match Self::parse(self.family, range) {
            Ok(parsed) => {
                debug!("Initialized {} subnet {}", self.family, range);
                *self = parsed;
            }
            Err(e) => warn!("Error in parsing subnet string: {}", e),
        }
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Advance the cursor and return the new address.
    ///
    /// A failed attempt does not move the cursor, so once the range is
    /// exhausted every later call fails as well.
    pub fn next_address(&mut self) -> Result<String> {
        let fixed = usize::from(self.mask / 8);
        let mut next = self.octets.clone();

        for i in (0..next.len()).rev() {
            if i < fixed {
                break;
            }
            next[i] = next[i].wrapping_add(1);
            if next[i] == 0 {
                // zero is reserved, skip it and carry into the next octet
                next[i] = 1;
                continue;
            }
            self.octets = next;
            return Ok(self.to_string());
        }

        debug!("{} range {} exhausted", self.family, self);
        Err(CoreError::RangeExhausted(self.family))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = match self.family {
            AddressFamily::Ipv4 => self.octets.iter().map(|o| o.to_string()).collect(),
            AddressFamily::Mac => self.octets.iter().map(|o| format!("{:02x}", o)).collect(),
        };
        write!(f, "{}", rendered.join(&self.family.separator().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_sequence() {
        let mut subnet = Subnet::parse(AddressFamily::Ipv4, "10.246.1.2/24").unwrap();
        assert_eq!(subnet.next_address().unwrap(), "10.246.1.3");
        assert_eq!(subnet.next_address().unwrap(), "10.246.1.4");
    }

    #[test]
    fn test_mac_sequence() {
        let mut subnet = Subnet::parse(AddressFamily::Mac, "10:20:30:00:00:00/24").unwrap();
        assert_eq!(subnet.next_address().unwrap(), "10:20:30:00:00:01");
        assert_eq!(subnet.next_address().unwrap(), "10:20:30:00:00:02");
    }

    #[test]
    fn test_default_masks() {
        let ip = Subnet::parse(AddressFamily::Ipv4, "10.0.0.1").unwrap();
        assert_eq!(ip.mask(), 24);
        let mac = Subnet::parse(AddressFamily::Mac, "aa:bb:cc:00:00:00").unwrap();
        assert_eq!(mac.mask(), 16);
    }

    #[test]
    fn test_carry_skips_zero() {
        let mut subnet = Subnet::parse(AddressFamily::Ipv4, "10.246.1.254/16").unwrap();
        assert_eq!(subnet.next_address().unwrap(), "10.246.1.255");
        assert_eq!(subnet.next_address().unwrap(), "10.246.2.1");

        let mut mac = Subnet::parse(AddressFamily::Mac, "10:20:30:00:00:ff/24").unwrap();
        assert_eq!(mac.next_address().unwrap(), "10:20:30:00:01:01");
    }

    #[test]
    fn test_addresses_increase_and_avoid_zero() {
        let mut subnet = Subnet::parse(AddressFamily::Ipv4, "10.246.0.0/16").unwrap();
        let mut previous: Option<[u8; 4]> = None;
        for _ in 0..1000 {
            let addr: std::net::Ipv4Addr = subnet.next_address().unwrap().parse().unwrap();
            let octets = addr.octets();
            assert_eq!(&octets[..2], &[10, 246]);
            assert_ne!(octets[3], 0);
            if let Some(prev) = previous {
                assert!(octets > prev, "{:?} not after {:?}", octets, prev);
            }
            previous = Some(octets);
        }
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut subnet = Subnet::parse(AddressFamily::Ipv4, "10.246.1.2/24").unwrap();
        let issued: Vec<String> = std::iter::from_fn(|| subnet.next_address().ok()).collect();

        // .3 through .255
        assert_eq!(issued.len(), 253);
        assert_eq!(issued.last().map(String::as_str), Some("10.246.1.255"));

        for _ in 0..3 {
            match subnet.next_address() {
                Err(CoreError::RangeExhausted(AddressFamily::Ipv4)) => {}
                other => panic!("expected exhaustion, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_full_mask_is_immediately_exhausted() {
        let mut subnet = Subnet::parse(AddressFamily::Ipv4, "10.246.1.2/32").unwrap();
        assert!(matches!(
            subnet.next_address(),
            Err(CoreError::RangeExhausted(AddressFamily::Ipv4))
        ));
    }

    #[test]
    fn test_mac_exhaustion() {
        let mut subnet = Subnet::parse(AddressFamily::Mac, "10:20:30:40:ff:fe/32").unwrap();
        assert_eq!(subnet.next_address().unwrap(), "10:20:30:40:ff:ff");
        assert!(matches!(
            subnet.next_address(),
            Err(CoreError::RangeExhausted(AddressFamily::Mac))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_ranges() {
        for range in ["10.246.1.2/20", "10.246.1/24", "10.246.1.256/24", "10.246.1.x/24", "10.246.1.2/abc"] {
            assert!(
                matches!(Subnet::parse(AddressFamily::Ipv4, range), Err(CoreError::InvalidSubnet { .. })),
                "{} should be rejected",
                range
            );
        }
        for range in ["10:20:30:00:00/24", "10:20:30:00:00:zz/24", "10:20:30:00:00:100/24"] {
            assert!(
                matches!(Subnet::parse(AddressFamily::Mac, range), Err(CoreError::InvalidSubnet { .. })),
                "{} should be rejected",
                range
            );
        }
    }

    #[test]
    fn test_init_keeps_previous_state_on_error() {
        let mut subnet = Subnet::new(AddressFamily::Ipv4);
        subnet.init("10.246.1.2/24");
        let before = subnet.clone();

        subnet.init("10.246.1.2/12");
        assert_eq!(subnet, before);
        subnet.init("not-an-address");
        assert_eq!(subnet, before);

        assert_eq!(subnet.next_address().unwrap(), "10.246.1.3");
    }
}
