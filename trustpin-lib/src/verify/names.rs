//! Name checks: the expected peer host against a leaf, and CA name
//! constraints (RFC 5280 Section 4.2.1.10) against the certificates below.
//!
//! Only subjectAltName entries are consulted. The subject CN is never used
//! as a host name.

use std::net::IpAddr;
use x509_parser::extensions::NameConstraints;
use x509_parser::prelude::*;

/// Upper bound on names × subtrees for one constraint check.
pub(crate) const MAX_NC_WORK_FACTOR: usize = 65_536;

#[derive(Default)]
struct SanNames<'a> {
    dns: Vec<&'a str>,
    ips: Vec<&'a [u8]>,
}

fn san_names<'a>(cert: &X509Certificate<'a>) -> SanNames<'a> {
    let mut names = SanNames::default();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for gn in &san.value.general_names {
            match gn {
                GeneralName::DNSName(name) => names.dns.push(*name),
                GeneralName::IPAddress(bytes) => names.ips.push(*bytes),
                _ => {}
            }
        }
    }
    names
}

fn ip_octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn display_ip(bytes: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        IpAddr::from(octets).to_string()
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        IpAddr::from(octets).to_string()
    } else {
        hex::encode(bytes)
    }
}

/// Whether `host` is covered by the certificate's subjectAltName.
///
/// An IP literal must equal an iPAddress entry. A DNS name matches a
/// dNSName exactly (ASCII case-insensitive, trailing dot ignored) or through
/// a wildcard in the left-most label, which covers exactly one label and
/// never a bare public suffix such as `*.com`.
pub(crate) fn matches_host(cert: &X509Certificate, host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    let names = san_names(cert);
    if let Ok(ip) = host.parse::<IpAddr>() {
        let octets = ip_octets(ip);
        return names.ips.iter().any(|san| *san == octets.as_slice());
    }
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    names
        .dns
        .iter()
        .any(|pattern| dns_pattern_matches(pattern, &host))
}

fn dns_pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => {
            suffix.contains('.')
                && host
                    .split_once('.')
                    .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix)
        }
        None => !pattern.is_empty() && pattern == host,
    }
}

/// `.example.com` covers subdomains only; `example.com` also covers itself.
fn dns_within(name: &str, constraint: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let constraint = constraint.to_ascii_lowercase();
    if constraint.is_empty() {
        return true;
    }
    if constraint.starts_with('.') {
        return name.ends_with(&constraint);
    }
    name == constraint
        || name
            .strip_suffix(&constraint)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// `constraint` is address then mask, each as long as `ip`.
fn ip_within(ip: &[u8], constraint: &[u8]) -> bool {
    if !matches!(ip.len(), 4 | 16) || constraint.len() != ip.len() * 2 {
        return false;
    }
    let (net, mask) = constraint.split_at(ip.len());
    ip.iter()
        .zip(net)
        .zip(mask)
        .all(|((a, n), m)| a & m == n & m)
}

/// Names of `cert` that `nc` forbids, one message each.
///
/// Excluded subtrees are checked first. A permitted list restricts a name
/// type only when it holds at least one subtree of that type.
pub(crate) fn name_constraint_violations(nc: &NameConstraints, cert: &X509Certificate) -> Vec<String> {
    let names = san_names(cert);
    let permitted = nc.permitted_subtrees.as_deref().unwrap_or_default();
    let excluded = nc.excluded_subtrees.as_deref().unwrap_or_default();

    let work = (names.dns.len() + names.ips.len()).saturating_mul(permitted.len() + excluded.len());
    if work > MAX_NC_WORK_FACTOR {
        return vec![format!(
            "name constraints check exceeds resource limits ({} names x {} subtrees)",
            names.dns.len() + names.ips.len(),
            permitted.len() + excluded.len()
        )];
    }

    let mut violations = Vec::new();

    for subtree in excluded {
        match &subtree.base {
            GeneralName::DNSName(c) => {
                for name in names.dns.iter().filter(|n| dns_within(n, c)) {
                    violations.push(format!("DNS name '{}' is in excluded subtree '{}'", name, c));
                }
            }
            GeneralName::IPAddress(c) => {
                for ip in names.ips.iter().filter(|ip| ip_within(ip, c)) {
                    violations.push(format!("IP '{}' is in an excluded subtree", display_ip(ip)));
                }
            }
            _ => {}
        }
    }

    let dns_permitted: Vec<&str> = permitted
        .iter()
        .filter_map(|s| match &s.base {
            GeneralName::DNSName(c) => Some(*c),
            _ => None,
        })
        .collect();
    if !dns_permitted.is_empty() {
        for name in &names.dns {
            if !dns_permitted.iter().any(|c| dns_within(name, c)) {
                violations.push(format!("DNS name '{}' is outside every permitted subtree", name));
            }
        }
    }

    let ip_permitted: Vec<&[u8]> = permitted
        .iter()
        .filter_map(|s| match &s.base {
            GeneralName::IPAddress(c) => Some(*c),
            _ => None,
        })
        .collect();
    if !ip_permitted.is_empty() {
        for ip in &names.ips {
            if !ip_permitted.iter().any(|c| ip_within(ip, c)) {
                violations.push(format!(
                    "IP '{}' is outside every permitted subtree",
                    display_ip(ip)
                ));
            }
        }
    }

    violations
}
