//! ICMP liveness probe
//!
//! A single ping with a one second wait decides whether a device is worth
//! a protocol call. Any failure to run or parse the probe counts as "not
//! live"; the probe never errors.

use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Pre-flight reachability check
pub trait LivenessProbe: Send + Sync {
    fn is_live(&self, ip: &str) -> bool;
}

/// Probe backed by the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
}

impl PingProbe {
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }

    /// Use a different ping binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for PingProbe {
    fn is_live(&self, ip: &str) -> bool {
        if ip.trim().is_empty() {
            return false;
        }

        let output = match Command::new(&self.program)
            .args(["-n", "-c", "1", "-W", "1", ip])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("cannot run {}: {}", self.program, e);
                return false;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_latency(&stdout) {
            Some(latency) => {
                debug!("{} answered in {} ms", ip, latency);
                true
            }
            None => {
                debug!("{} did not answer", ip);
                false
            }
        }
    }
}

/// Extract the round-trip latency in milliseconds from ping output
pub fn parse_latency(output: &str) -> Option<f64> {
    static LATENCY: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = LATENCY
        .get_or_init(|| Regex::new(r"time(?:=|<)([.0-9]+)\s?ms").ok())
        .as_ref()?;

    regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// A probe with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl LivenessProbe for StaticProbe {
    fn is_live(&self, _ip: &str) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latency_linux() {
        let output = "PING 192.168.1.20 (192.168.1.20) 56(84) bytes of data.\n\
                      64 bytes from 192.168.1.20: icmp_seq=1 ttl=64 time=0.412 ms\n";
        assert_eq!(parse_latency(output), Some(0.412));
    }

    #[test]
    fn test_parse_latency_below_resolution() {
        assert_eq!(parse_latency("Reply from 10.0.0.1: bytes=32 time<1ms TTL=64"), Some(1.0));
    }

    #[test]
    fn test_parse_latency_miss() {
        let output = "PING 192.168.1.99 (192.168.1.99) 56(84) bytes of data.\n\n\
                      --- 192.168.1.99 ping statistics ---\n\
                      1 packets transmitted, 0 received, 100% packet loss, time 0ms\n";
        assert_eq!(parse_latency(output), None);
    }

    #[test]
    fn test_empty_ip_is_not_live() {
        assert!(!PingProbe::new().is_live(""));
    }

    #[test]
    fn test_missing_binary_is_not_live() {
        let probe = PingProbe::with_program("/nonexistent/ping-binary");
        assert!(!probe.is_live("127.0.0.1"));
    }
}
