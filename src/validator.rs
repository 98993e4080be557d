use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

// Any single chaining operator, or the doubled forms.
const CHAINING_PATTERN: &str = r"[;&|]|&&|\|\|";

// Shell metacharacters plus substitution constructs.
const INJECTION_PATTERN: &str = r#"[;&|`$(){}\[\]<>"'\\]|\$\{.*\}|\(.*\)|`.*`"#;

/// First tokens that are refused unless the whole command matches an allowed shape.
const DENYLIST: &[&str] = &[
    // destructive file and disk operations
    "rm", "rmdir", "del", "rd", "format", "fdisk", "mkfs", "dd",
    // power state
    "shutdown", "reboot", "halt", "poweroff", "init",
    // privilege and accounts
    "sudo", "su", "passwd", "useradd", "userdel", "usermod",
    "chmod", "chown", "chgrp", "chattr", "lsattr",
    "mount", "umount", "fstab", "crontab", "at",
    // process control
    "kill", "killall", "pkill", "xkill",
    // network fetch and remote access
    "wget", "curl", "nc", "netcat", "telnet", "ssh", "scp", "rsync",
    // interpreters and shells
    "python", "perl", "ruby", "node", "php", "bash", "sh", "zsh", "csh", "tcsh",
    // build tools and package managers
    "java", "javac", "mvn", "gradle", "npm", "pip", "gem",
    // version control
    "git", "svn", "hg", "bzr",
    // containers and orchestration
    "docker", "kubectl", "helm", "terraform",
    // editors
    "vi", "vim", "nano", "emacs", "pico",
    // read and inspection tools
    "cat", "less", "more", "head", "tail", "grep", "awk", "sed",
    "find", "locate", "which", "whereis", "type",
    "ps", "top", "htop", "free", "df", "du", "ls", "dir",
    // filesystem navigation and mutation
    "cd", "pwd", "mkdir", "touch", "cp", "mv", "ln",
    // environment and shell state
    "echo", "printf", "printenv", "env", "set", "unset",
    "export", "alias", "unalias", "history", "clear",
];

/// How many arguments an allowed shape takes after its keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    /// Keyword alone, nothing after it.
    None,
    /// Keyword followed by a space and something.
    Required,
    /// Either of the above.
    Optional,
}

#[derive(Debug)]
struct AllowedShape {
    keyword: &'static str,
    arity: Arity,
    usage: &'static str,
}

impl AllowedShape {
    const fn new(keyword: &'static str, arity: Arity, usage: &'static str) -> Self {
        Self { keyword, arity, usage }
    }

    /// `lowered` must already be trimmed and lowercased.
    fn matches(&self, lowered: &str) -> bool {
        let exact = lowered == self.keyword;
        let prefixed = lowered
            .strip_prefix(self.keyword)
            .is_some_and(|rest| rest.starts_with(' '));
        match self.arity {
            Arity::None => exact,
            Arity::Required => prefixed,
            Arity::Optional => exact || prefixed,
        }
    }
}

const ALLOWED_SHAPES: &[AllowedShape] = &[
    AllowedShape::new("echo", Arity::Required, "echo <text>"),
    AllowedShape::new("ls", Arity::Optional, "ls [directory]"),
    AllowedShape::new("cat", Arity::Required, "cat <file>"),
    AllowedShape::new("head", Arity::Required, "head <file>"),
    AllowedShape::new("tail", Arity::Required, "tail <file>"),
    AllowedShape::new("grep", Arity::Required, "grep <pattern> <file>"),
    AllowedShape::new("pwd", Arity::None, "pwd"),
    AllowedShape::new("whoami", Arity::None, "whoami"),
    AllowedShape::new("date", Arity::None, "date"),
    AllowedShape::new("uptime", Arity::None, "uptime"),
    AllowedShape::new("ping", Arity::Required, "ping <host>"),
    AllowedShape::new("nslookup", Arity::Required, "nslookup <domain>"),
];

static POLICY: Lazy<CommandPolicy> = Lazy::new(CommandPolicy::build);

/// Why a command was refused. Variants follow the order of the checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("command is empty")]
    Empty,
    #[error("command chaining is not allowed")]
    Chaining,
    #[error("shell metacharacters are not allowed")]
    Injection,
    #[error("'{0}' is a blocked command")]
    Denylisted(String),
    #[error("command does not match any allowed shape")]
    NotAllowlisted,
}

/// The allow/deny tables and compiled patterns, built once per process.
pub struct CommandPolicy {
    chaining: Regex,
    injection: Regex,
    denylist: HashSet<&'static str>,
    catalog: Vec<&'static str>,
}

impl CommandPolicy {
    fn build() -> Self {
        Self {
            chaining: Regex::new(CHAINING_PATTERN).expect("chaining pattern compiles"),
            injection: Regex::new(INJECTION_PATTERN).expect("injection pattern compiles"),
            denylist: DENYLIST.iter().copied().collect(),
            catalog: ALLOWED_SHAPES.iter().map(|shape| shape.usage).collect(),
        }
    }

    pub fn global() -> &'static CommandPolicy {
        &POLICY
    }

    /// Run the full decision pipeline; the first failing check wins.
    pub fn check(&self, command: &str) -> Result<(), Rejection> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(self.reject(command, Rejection::Empty));
        }

        if self.chaining.is_match(trimmed) {
            return Err(self.reject(command, Rejection::Chaining));
        }

        if self.injection.is_match(trimmed) {
            return Err(self.reject(command, Rejection::Injection));
        }

        let lowered = trimmed.to_lowercase();
        let allowed = ALLOWED_SHAPES.iter().any(|shape| shape.matches(&lowered));

        // Allowed shapes take precedence over a denylisted first token.
        let name = lowered.split_whitespace().next().unwrap_or_default();
        if self.denylist.contains(name) && !allowed {
            return Err(self.reject(command, Rejection::Denylisted(name.to_string())));
        }

        if !allowed {
            return Err(self.reject(command, Rejection::NotAllowlisted));
        }

        Ok(())
    }

    pub fn is_safe(&self, command: &str) -> bool {
        self.check(command).is_ok()
    }

    pub fn allowed_commands(&self) -> &[&'static str] {
        &self.catalog
    }

    fn reject(&self, command: &str, reason: Rejection) -> Rejection {
        debug!(command = %command, reason = %reason, "command rejected by policy");
        reason
    }
}

pub fn check(command: &str) -> Result<(), Rejection> {
    CommandPolicy::global().check(command)
}

#[allow(dead_code)]
pub fn is_safe(command: &str) -> bool {
    CommandPolicy::global().is_safe(command)
}

/// Human-readable shapes accepted by the policy, in display order.
pub fn allowed_commands() -> &'static [&'static str] {
    CommandPolicy::global().allowed_commands()
}
