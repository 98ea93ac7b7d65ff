//! Ping output parser

use once_cell::sync::Lazy;
use regex::Regex;

use super::{helpers, make_host, ParseContext, ParseError, ParseResult, Parser};

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time[=<]([\d.]+)\s*ms").expect("valid time regex"));

/// Parses ping output into a single alive Host entity.
///
/// Understands both Unix (`64 bytes from 192.168.1.1: icmp_seq=1 ttl=64
/// time=0.045 ms`) and Windows (`Reply from 192.168.1.1: bytes=32 time<1ms
/// TTL=64`) reply lines. Output with no reply lines yields no entities.
pub struct PingParser;

impl Parser for PingParser {
    fn parse(&self, output: &str, _ctx: &ParseContext) -> Result<ParseResult, ParseError> {
        let mut result = ParseResult::default();
        let mut times: Vec<f64> = Vec::new();
        let mut reply_ips: Vec<String> = Vec::new();

        for line in output.lines() {
            let lower = line.to_lowercase();
            if !(lower.contains("bytes from") || lower.contains("reply from")) {
                continue;
            }

            for ip in helpers::extract_ipv4(line) {
                if !reply_ips.contains(&ip) {
                    reply_ips.push(ip);
                }
            }
            if let Some(caps) = TIME_RE.captures(&lower) {
                if let Ok(ms) = caps[1].parse::<f64>() {
                    times.push(ms);
                }
            }
        }

        let avg_time = (!times.is_empty())
            .then(|| times.iter().sum::<f64>() / times.len() as f64);

        for ip in reply_ips {
            result
                .entities
                .push(make_host(&ip, "ping", 0.95, avg_time)?);
        }

        Ok(result)
    }
}
