use dns_lookup::lookup_host;
use std::net::IpAddr;

/// Resolve a probe target to one address, preferring IPv4.
pub async fn resolve_target(target: &str) -> anyhow::Result<IpAddr> {
    let target = target.trim();
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addresses = tokio::task::spawn_blocking({
        let hostname = target.to_string();
        move || lookup_host(&hostname)
    })
    .await??;

    pick_address(&addresses)
        .ok_or_else(|| anyhow::anyhow!("No addresses found for hostname: {}", target))
}

fn pick_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
}
