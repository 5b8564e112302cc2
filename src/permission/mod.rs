//! Command permission service
//!
//! Gates shell-command execution behind risk assessment and a per-
//! conversation approval cache. Precedence is fixed: whitelist, then
//! cache, then risk assessment — tests depend on that ordering. The
//! whitelist and command-tool tables are policy data supplied by
//! [`crate::config::PermissionPolicy`]; the destructive/mutating pattern
//! tables live here.
//!
//! A denial is not an error: callers surface an approval prompt and, on
//! approval, record it via [`CommandPermissionService::approve`] before
//! retrying.
//!
//! # Example
//!
//! ```
//! use femtoloop::config::PermissionPolicy;
//! use femtoloop::permission::{CommandPermissionService, PermissionReason};
//!
//! let service = CommandPermissionService::new(PermissionPolicy::default());
//!
//! let decision = service.check_permission("conv-1", "git status");
//! assert!(decision.allowed);
//! assert_eq!(decision.reason, PermissionReason::Whitelist);
//!
//! let decision = service.check_permission("conv-1", "cargo install ripgrep");
//! assert!(!decision.allowed);
//! assert_eq!(decision.reason, PermissionReason::Permission);
//! ```

mod cache;

pub use cache::ApprovalCache;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::PermissionPolicy;

/// Risk classification for a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only / non-destructive.
    Low,
    /// Mutates local state (packages, dependencies, unrecognized commands).
    Medium,
    /// Controls system state (processes, services, ownership).
    High,
    /// Destructive or irreversible (recursive delete, format, privilege
    /// escalation).
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Risk assessment for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Assessed risk level
    pub level: RiskLevel,
    /// Normalized command signature used as the cache/whitelist key
    pub signature: String,
}

/// Why a permission decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionReason {
    /// Allowed by the static whitelist.
    Whitelist,
    /// Allowed by a cached approval.
    Cache,
    /// Requires an explicit approval.
    Permission,
}

/// Outcome of a permission check. Never persisted beyond the approval
/// cache; recomputed per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    /// Whether the command may execute now
    pub allowed: bool,
    /// Which rule produced the decision
    pub reason: PermissionReason,
    /// The command's risk assessment
    pub risk: RiskAssessment,
}

/// Destructive patterns whose commands keep their verbatim text as the
/// signature: truncating `rm -rf /` to `rm` would merge safe and unsafe
/// variants under one cache key.
static DESTRUCTIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\brm\s+-\w*r\w*\s",
        r"\brm\s+-\w*r\w*$",
        r"\bmkfs\b|\bmkfs\.",
        r"\bdd\s+if=",
        r">\s*/dev/sd",
        r":\(\)\s*\{\s*:\|:&\s*\};:",
        r"\bchmod\s+(-\w+\s+)*777\s+/\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid destructive pattern: {e}")))
    .collect()
});

/// Privilege escalation and pipe-to-shell patterns, also critical.
static CRITICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\s*sudo\s",
        r"^\s*su\s",
        r"\b(curl|wget)\b[^|]*\|\s*(ba|z)?sh\b",
        r"bash\s+-i\s+>&\s*/dev/tcp",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid critical pattern: {e}")))
    .collect()
});

/// System-state control: processes, services, ownership, mounts.
static HIGH_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\s*(kill|pkill|killall)\b",
        r"^\s*(systemctl|service)\b",
        r"^\s*(chmod|chown)\b",
        r"^\s*(mount|umount)\b",
        r"^\s*(shutdown|reboot|halt)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid high-risk pattern: {e}")))
    .collect()
});

/// Package/dependency mutation keywords.
static MEDIUM_RISK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\b(install|uninstall|upgrade)\b", r"\b(npm|yarn|pnpm)\s+(add|remove)\b"]
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid medium-risk pattern: {e}")))
        .collect()
});

/// Executables whose first non-flag argument is a subcommand worth keeping
/// in the signature.
static MULTI_COMMAND_TOOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "git", "npm", "pnpm", "yarn", "cargo", "pip", "pip3", "docker", "kubectl", "apt",
        "apt-get", "brew", "go", "gem", "composer", "systemctl", "service",
    ]
    .into_iter()
    .collect()
});

/// Extract the normalized signature for a shell command.
///
/// The signature is the executable plus its primary subcommand for tools
/// that have one (`git pull origin main` -> `git pull`), or just the
/// executable otherwise (`ls -la` -> `ls`). Commands matching a recognized
/// destructive pattern keep their verbatim (trimmed) text.
///
/// # Examples
/// ```
/// use femtoloop::permission::extract_command_signature;
///
/// assert_eq!(extract_command_signature("git pull origin main"), "git pull");
/// assert_eq!(extract_command_signature("ls -la /tmp"), "ls");
/// assert_eq!(extract_command_signature("rm -rf /"), "rm -rf /");
/// ```
pub fn extract_command_signature(command: &str) -> String {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if DESTRUCTIVE_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        return trimmed.to_string();
    }

    let tokens = shell_words::split(trimmed)
        .unwrap_or_else(|_| trimmed.split_whitespace().map(str::to_string).collect());
    let Some(executable) = tokens.first() else {
        return trimmed.to_string();
    };

    let base = executable
        .rsplit('/')
        .next()
        .unwrap_or(executable)
        .to_string();

    if MULTI_COMMAND_TOOLS.contains(base.as_str()) {
        if let Some(sub) = tokens.iter().skip(1).find(|t| !t.starts_with('-')) {
            return format!("{} {}", base, sub);
        }
    }
    base
}

/// Assess a command's risk without touching any conversation state.
///
/// Exposed standalone for pre-flight display of commands not yet tied to a
/// conversation.
pub fn assess_command_risk(command: &str) -> RiskAssessment {
    let signature = extract_command_signature(command);
    let trimmed = command.trim();

    let level = if DESTRUCTIVE_PATTERNS.iter().any(|p| p.is_match(trimmed))
        || CRITICAL_PATTERNS.iter().any(|p| p.is_match(trimmed))
    {
        RiskLevel::Critical
    } else if HIGH_RISK_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        RiskLevel::High
    } else if MEDIUM_RISK_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        RiskLevel::Medium
    } else {
        RiskLevel::Medium
    };

    RiskAssessment { level, signature }
}

/// Permission gate for shell-command execution.
pub struct CommandPermissionService {
    cache: Arc<ApprovalCache>,
    whitelist: HashSet<String>,
}

impl CommandPermissionService {
    /// Create a service with a fresh approval cache.
    pub fn new(policy: PermissionPolicy) -> Self {
        Self::with_cache(policy, Arc::new(ApprovalCache::new()))
    }

    /// Create a service over a shared approval cache.
    pub fn with_cache(policy: PermissionPolicy, cache: Arc<ApprovalCache>) -> Self {
        Self {
            cache,
            whitelist: policy.whitelist.into_iter().collect(),
        }
    }

    /// The approval cache backing this service.
    pub fn cache(&self) -> &Arc<ApprovalCache> {
        &self.cache
    }

    /// Decide whether a command may execute in a conversation.
    ///
    /// Precedence: whitelist, then cache (consuming one-shot entries),
    /// then a denial carrying the risk assessment for the approval prompt.
    pub fn check_permission(&self, conversation_id: &str, command: &str) -> PermissionDecision {
        let signature = extract_command_signature(command);

        if self.whitelist.contains(&signature) {
            return PermissionDecision {
                allowed: true,
                reason: PermissionReason::Whitelist,
                risk: RiskAssessment {
                    level: RiskLevel::Low,
                    signature,
                },
            };
        }

        let risk = assess_command_risk(command);

        if self.cache.is_approved(conversation_id, &signature) {
            debug!(
                conversation_id = %conversation_id,
                signature = %signature,
                "Command allowed by cached approval"
            );
            return PermissionDecision {
                allowed: true,
                reason: PermissionReason::Cache,
                risk,
            };
        }

        PermissionDecision {
            allowed: false,
            reason: PermissionReason::Permission,
            risk,
        }
    }

    /// Record a user approval for a command, keyed by its signature.
    pub fn approve(&self, conversation_id: &str, command: &str, remember: bool) {
        let signature = extract_command_signature(command);
        self.cache.approve(conversation_id, &signature, remember);
    }
}
