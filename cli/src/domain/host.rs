//! Host classification helpers.

use std::net::IpAddr;

use dockhand_common::{Host, HostRole};

/// Returns `true` when the address names this machine.
///
/// Loopback hosts bypass SSH and run the command string in a local shell.
#[must_use]
pub fn is_loopback(address: &str) -> bool {
    let addr = address.trim().trim_start_matches('[').trim_end_matches(']');
    if addr.eq_ignore_ascii_case("localhost") {
        return true;
    }
    addr.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Whether commands for `host` run locally rather than over SSH.
#[must_use]
pub fn runs_locally(host: &Host) -> bool {
    host.role == HostRole::Local || is_loopback(&host.address)
}

/// Whether the proxy may be injected for `host` under the local-only policy.
#[must_use]
pub fn proxy_allowed(host: &Host, local_only: bool) -> bool {
    !local_only || host.role == HostRole::Local || host.has_tag("local")
}
