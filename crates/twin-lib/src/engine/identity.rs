//! Stable host identities
//!
//! Hosts that report without an address get a synthetic one, assigned once
//! and cached for the life of the process. Display names and labels are
//! pure functions of the assigned identity.

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// First synthetic address handed out
pub const SYNTHETIC_BASE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 10);

/// Prefix shared by every derived display name
pub const DISPLAY_PREFIX: &str = "REFLECTOR-";

/// Display name used when nothing identifies the host
pub const UNKNOWN_DISPLAY_NAME: &str = "REFLECTOR-UNKNOWN";

/// Parse a strict dotted-quad IPv4 address
pub fn parse_ipv4(candidate: &str) -> Option<Ipv4Addr> {
    candidate.trim().parse::<Ipv4Addr>().ok()
}

/// Sticky address assignment per hostname
#[derive(Debug, Clone)]
pub struct IdentityAssigner {
    assignments: HashMap<String, Ipv4Addr>,
    cursor: u32,
    reserved: Option<Ipv4Addr>,
}

impl Default for IdentityAssigner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityAssigner {
    /// `reserved` is never handed out synthetically (the hub's address)
    pub fn new(reserved: Option<Ipv4Addr>) -> Self {
        Self {
            assignments: HashMap::new(),
            cursor: u32::from(SYNTHETIC_BASE),
            reserved,
        }
    }

    /// Resolve the address for `hostname`
    ///
    /// A valid reported address always wins and replaces any earlier one.
    /// Without one, the previously assigned address is reused, and only a
    /// hostname never seen before consumes a new synthetic address.
    pub fn assign(&mut self, hostname: &str, reported: Option<Ipv4Addr>) -> Ipv4Addr {
        if let Some(address) = reported {
            self.assignments.insert(hostname.to_string(), address);
            return address;
        }

        if let Some(existing) = self.assignments.get(hostname) {
            return *existing;
        }

        let address = self.next_synthetic();
        self.assignments.insert(hostname.to_string(), address);
        address
    }

    /// Address currently remembered for `hostname`
    pub fn get(&self, hostname: &str) -> Option<Ipv4Addr> {
        self.assignments.get(hostname).copied()
    }

    fn next_synthetic(&mut self) -> Ipv4Addr {
        loop {
            let candidate = Ipv4Addr::from(self.cursor);
            self.cursor = self.cursor.wrapping_add(1);
            if Some(candidate) != self.reserved {
                return candidate;
            }
        }
    }
}

/// Human-readable name derived from the address, or the hostname as a fallback
pub fn display_name(hostname: &str, address: Option<&str>) -> String {
    if let Some(ip) = address.and_then(parse_ipv4) {
        return format!("{}{:03}", DISPLAY_PREFIX, ip.octets()[3]);
    }

    let normalized = hostname.trim();
    if normalized.is_empty() {
        return UNKNOWN_DISPLAY_NAME.to_string();
    }

    let sanitized: String = normalized
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '-' })
        .collect();
    format!("{}{}", DISPLAY_PREFIX, sanitized)
}

/// Multi-line label shown next to a host in the scene
pub fn format_label(display_name: &str, address: &str, rack: Option<&str>) -> String {
    let mut segments = vec![display_name, address];
    if let Some(rack) = rack.filter(|rack| !rack.is_empty()) {
        segments.push(rack);
    }
    segments.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_addresses_are_sequential_and_cached() {
        let mut assigner = IdentityAssigner::default();

        let a = assigner.assign("alpha", None);
        let b = assigner.assign("beta", None);
        let a_again = assigner.assign("alpha", None);

        assert_eq!(a, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(b, Ipv4Addr::new(10, 0, 0, 11));
        assert_eq!(a_again, a);
    }

    #[test]
    fn test_reported_address_is_sticky() {
        let mut assigner = IdentityAssigner::default();
        let reported = Ipv4Addr::new(192, 168, 1, 20);

        assert_eq!(assigner.assign("titan-01", Some(reported)), reported);
        assert_eq!(assigner.assign("titan-01", None), reported);
    }

    #[test]
    fn test_later_valid_address_replaces_earlier() {
        let mut assigner = IdentityAssigner::default();
        assigner.assign("titan-01", None);

        let moved = Ipv4Addr::new(192, 168, 1, 30);
        assert_eq!(assigner.assign("titan-01", Some(moved)), moved);
        assert_eq!(assigner.get("titan-01"), Some(moved));
    }

    #[test]
    fn test_reserved_address_is_skipped() {
        let mut assigner = IdentityAssigner::new(Some(Ipv4Addr::new(10, 0, 0, 11)));

        assert_eq!(assigner.assign("a", None), Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(assigner.assign("b", None), Ipv4Addr::new(10, 0, 0, 12));
    }

    #[test]
    fn test_synthetic_cursor_rolls_into_next_octet() {
        let mut assigner = IdentityAssigner::default();
        let last = (0..250)
            .map(|i| assigner.assign(&format!("host-{i}"), None))
            .last()
            .unwrap();
        assert_eq!(last, Ipv4Addr::new(10, 0, 1, 3));
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4(" 10.1.2.3 "), Some(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(parse_ipv4("10.1.2"), None);
        assert_eq!(parse_ipv4("10.1.2.256"), None);
        assert_eq!(parse_ipv4("not-an-ip"), None);
    }

    #[test]
    fn test_display_name_from_address() {
        assert_eq!(display_name("titan-01", Some("10.0.0.7")), "REFLECTOR-007");
        assert_eq!(display_name("titan-01", Some("192.168.1.142")), "REFLECTOR-142");
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(display_name("titan.lab_01", None), "REFLECTOR-TITAN-LAB-01");
        assert_eq!(display_name("titan-01", Some("garbage")), "REFLECTOR-TITAN-01");
        assert_eq!(display_name("   ", None), UNKNOWN_DISPLAY_NAME);
    }

    #[test]
    fn test_format_label() {
        assert_eq!(
            format_label("REFLECTOR-010", "10.0.0.10", Some("R1")),
            "REFLECTOR-010\n10.0.0.10\nR1"
        );
        assert_eq!(format_label("REFLECTOR-010", "10.0.0.10", None), "REFLECTOR-010\n10.0.0.10");
    }
}
