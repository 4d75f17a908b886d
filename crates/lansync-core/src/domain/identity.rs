//! Local address selection.
//!
//! Machines commonly carry several adapters: the real Wi-Fi or Ethernet
//! card, plus hypervisor bridges, WSL, container networks, VPN tunnels.
//! Only the real card's address is useful to a phone on the same LAN, so
//! selection skips adapters whose names look virtual.
//!
//! The "looks virtual" check is an injectable predicate.  [`AdapterPolicy`]
//! is the standard one (a case-insensitive denylist of name fragments), but
//! tests and callers can pass any `Fn(&str) -> bool`.

use std::net::IpAddr;

/// Returned when no interface qualifies.
pub const FALLBACK_ADDRESS: &str = "localhost";

/// Name fragments that mark an adapter as virtual.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "virtual",
    "vmware",
    "wsl",
    "pseudo",
    "vethernet",
    "vbox",
    "docker",
];

/// One address bound to one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub ip: IpAddr,
}

impl InterfaceAddr {
    pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            ip,
        }
    }
}

/// Denylist of adapter-name fragments, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPolicy {
    deny_fragments: Vec<String>,
}

impl AdapterPolicy {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            deny_fragments: fragments
                .into_iter()
                .map(|f| f.as_ref().to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if no denylisted fragment occurs in `adapter_name`.
    pub fn allows(&self, adapter_name: &str) -> bool {
        let lower = adapter_name.to_lowercase();
        !self.deny_fragments.iter().any(|f| lower.contains(f.as_str()))
    }
}

impl Default for AdapterPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST)
    }
}

/// Picks the first IPv4, non-loopback address on an allowed adapter.
///
/// Never fails: returns [`FALLBACK_ADDRESS`] if nothing qualifies.
pub fn select_local_address<F>(interfaces: &[InterfaceAddr], allowed: F) -> String
where
    F: Fn(&str) -> bool,
{
    interfaces
        .iter()
        .find(|iface| match iface.ip {
            IpAddr::V4(v4) => !v4.is_loopback() && allowed(&iface.name),
            IpAddr::V6(_) => false,
        })
        .map(|iface| iface.ip.to_string())
        .unwrap_or_else(|| FALLBACK_ADDRESS.to_string())
}
