use std::net::Ipv4Addr;

/// Parse a comma-separated list of IPv4 addresses as entered in the
/// custom DNS field. Entries are trimmed; every entry must be a dotted
/// quad and the list must contain at least one.
pub fn parse_dns_list(raw: &str) -> Result<Vec<Ipv4Addr>, String> {
    let mut ips = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err("DNS list contains an empty entry".to_string());
        }
        match entry.parse::<Ipv4Addr>() {
            Ok(ip) => ips.push(ip),
            Err(_) => return Err(format!("Invalid DNS server address: {entry}")),
        }
    }
    if ips.is_empty() {
        return Err("At least one DNS server is required".to_string());
    }
    Ok(ips)
}
