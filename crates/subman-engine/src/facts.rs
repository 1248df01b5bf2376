//! Host facts sent with a registration.

use std::env;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use subman_core::register::Facts;

/// Collect the fact bag for this host.
pub fn collect_facts() -> Facts {
    let mut facts = Facts::new();
    facts.insert("uname.sysname".into(), env::consts::OS.to_string());
    facts.insert("uname.machine".into(), env::consts::ARCH.to_string());
    facts.insert("network.hostname".into(), host_name());
    facts.insert("distribution.version".into(), os_version());
    facts.insert(
        "cpu.cpu(s)".into(),
        std::thread::available_parallelism()
            .map(|n| n.get().to_string())
            .unwrap_or_else(|_| "1".to_string()),
    );
    let machine_id = machine_id();
    if let Some(id) = &machine_id {
        facts.insert("system.machine_id".into(), id.clone());
    }
    facts.insert("system.fingerprint".into(), fingerprint(&facts, machine_id.as_deref()));
    facts
}

/// Stable identifier derived from the identifying facts.
fn fingerprint(facts: &Facts, machine_id: Option<&str>) -> String {
    let components = [
        facts.get("uname.sysname").map(String::as_str),
        facts.get("uname.machine").map(String::as_str),
        facts.get("network.hostname").map(String::as_str),
        machine_id,
    ];
    let combined = components.iter().flatten().copied().collect::<Vec<_>>().join("|");
    let hash = Sha256::digest(combined.as_bytes());
    BASE64.encode(&hash[..16])
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("VERSION_ID="))
                    .map(|l| {
                        l.trim_start_matches("VERSION_ID=")
                            .trim_matches('"')
                            .to_string()
                    })
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(not(target_os = "linux"))]
    {
        "unknown".to_string()
    }
}

fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
