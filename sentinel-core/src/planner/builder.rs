//! Deterministic command builder
//!
//! Merges a registry ToolDef with the intent's validated target and
//! parameters into an argv vector. No LLM involvement, no shell: the argv
//! is handed to the process runner as a vector, never a joined string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::planner::registry::{ToolDef, DANGEROUS_CHARS};
use crate::planner::RiskLevel;
use crate::{Error, Result};

/// Upper bound on a single argument, in bytes
const MAX_ARG_LEN: usize = 1024;
/// Upper bound on total argv length
const MAX_ARGS: usize = 64;

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("valid hostname regex")
});
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[a-zA-Z0-9]([a-zA-Z0-9.-]{0,253})?(:\d{1,5})?(/[^\s]*)?$")
        .expect("valid url regex")
});
static PORT_SPEC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,5}(-\d{1,5})?(,\d{1,5}(-\d{1,5})?)*$").expect("valid port spec regex")
});

/// Validated argv vector ready to hand to the execution manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalCommand {
    pub tool_id: String,
    pub binary: String,
    pub argv: Vec<String>,
    pub target: String,
    pub requires_root: bool,
    pub risk: RiskLevel,
}

impl FinalCommand {
    /// Human-readable form for display only; execution always uses the
    /// argv vector.
    pub fn display(&self) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(self.argv.iter().cloned());
        parts.join(" ")
    }
}

/// Build a FinalCommand from a tool definition, target, and parameters.
///
/// Algorithm: start from base args; expand each provided parameter's
/// template (split on whitespace, substitute `{value}` once); attach the
/// target via the def's flag or as the last positional argument.
pub fn build_command(
    def: &ToolDef,
    target: &str,
    params: &std::collections::BTreeMap<String, String>,
) -> Result<FinalCommand> {
    validate_target(target)?;

    let mut argv: Vec<String> = def.base_args.clone();

    for (key, value) in params {
        let template = def.arg_templates.get(key).ok_or_else(|| Error::CommandBuild {
            reason: format!("unknown parameter '{key}' for tool {}", def.tool_id),
        })?;

        if matches!(key.as_str(), "ports" | "port") {
            validate_port_spec(value)?;
        }

        for token in template.split_whitespace() {
            let expanded = token.replace("{value}", value);
            validate_argument(&expanded)?;
            argv.push(expanded);
        }
    }

    let full_target = match &def.target_prefix {
        Some(prefix) => format!("{prefix}{target}"),
        None => target.to_string(),
    };
    match &def.target_flag {
        Some(flag) => {
            argv.push(flag.clone());
            argv.push(full_target);
        }
        None => argv.push(full_target),
    }

    if argv.len() > MAX_ARGS {
        return Err(Error::CommandBuild {
            reason: format!("too many arguments: {} > {MAX_ARGS}", argv.len()),
        });
    }
    for arg in &argv {
        validate_argument(arg)?;
    }

    Ok(FinalCommand {
        tool_id: def.tool_id.clone(),
        binary: def.binary.clone(),
        argv,
        target: target.to_string(),
        requires_root: def.requires_root,
        risk: def.risk,
    })
}

/// Accepts IPv4 (optionally CIDR), IPv6, RFC 1123 hostnames, and http(s)
/// URLs. Anything carrying shell metacharacters is rejected before format
/// checks.
pub fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(Error::InvalidTarget("target is empty".to_string()));
    }
    if let Some(c) = target.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(Error::InvalidTarget(format!(
            "target contains forbidden character {c:?}"
        )));
    }

    if is_ip_or_cidr(target) || target == "localhost" {
        return Ok(());
    }
    if target.len() <= 253 && HOSTNAME_RE.is_match(target) && target.contains('.') {
        return Ok(());
    }
    if URL_RE.is_match(target) {
        return Ok(());
    }

    Err(Error::InvalidTarget(format!(
        "target must be an IP, CIDR range, hostname, or URL: {target}"
    )))
}

fn is_ip_or_cidr(target: &str) -> bool {
    if target.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    if let Some((addr, prefix)) = target.split_once('/') {
        let Ok(prefix) = prefix.parse::<u8>() else {
            return false;
        };
        return match addr.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V4(_)) => prefix <= 32,
            Ok(std::net::IpAddr::V6(_)) => prefix <= 128,
            Err(_) => false,
        };
    }
    false
}

/// Port specification: single port, comma list, dash ranges, or bare `-`
/// for all ports. Port numbers must be 1–65535.
pub fn validate_port_spec(spec: &str) -> Result<()> {
    if spec == "-" {
        return Ok(());
    }
    if !PORT_SPEC_RE.is_match(spec) {
        return Err(Error::CommandBuild {
            reason: format!("invalid port specification: {spec}"),
        });
    }

    for part in spec.split(',') {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (a, b),
            None => (part, part),
        };
        let start: u32 = start.parse().map_err(|_| Error::CommandBuild {
            reason: format!("invalid port number in: {part}"),
        })?;
        let end: u32 = end.parse().map_err(|_| Error::CommandBuild {
            reason: format!("invalid port number in: {part}"),
        })?;
        if start == 0 || end == 0 {
            return Err(Error::CommandBuild {
                reason: "port 0 is not valid".to_string(),
            });
        }
        if start > 65535 || end > 65535 {
            return Err(Error::CommandBuild {
                reason: format!("port above 65535 in: {part}"),
            });
        }
        if start > end {
            return Err(Error::CommandBuild {
                reason: format!("port range start exceeds end: {part}"),
            });
        }
    }
    Ok(())
}

fn validate_argument(arg: &str) -> Result<()> {
    if arg.is_empty() {
        return Err(Error::CommandBuild {
            reason: "empty argument".to_string(),
        });
    }
    if arg.len() > MAX_ARG_LEN {
        return Err(Error::CommandBuild {
            reason: format!("argument exceeds {MAX_ARG_LEN} bytes"),
        });
    }
    if let Some(c) = arg
        .chars()
        .find(|c| DANGEROUS_CHARS.contains(c) || c.is_control())
    {
        return Err(Error::CommandBuild {
            reason: format!("argument contains forbidden character {c:?}"),
        });
    }
    Ok(())
}
