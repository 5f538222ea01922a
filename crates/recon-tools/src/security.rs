//! Security Validator: the argv gate and executable gate that stand
//! between a resolved invocation and `Command::spawn`.

use std::path::{Component, Path, PathBuf};

use recon_types::ArgvPolicy;
use tracing::warn;

use crate::errors::SecurityError;

const SHELL_METACHARS: &[char] = &[
    ';', '&', '|', '$', '`', '>', '<', '*', '?', '[', ']', '!', '~', '\'', '"', '\\', '\n', '\r',
    '\t',
];

/// Reject an argv before it is ever handed to the process spawner.
///
/// Checks run in a fixed order; the first violation wins, so error
/// messages are deterministic given the same input.
pub fn validate_argv(argv: &[String], policy: &ArgvPolicy) -> Result<(), SecurityError> {
    if argv.len() > policy.max_args {
        return Err(SecurityError::violation(
            format!("argv has {} args, max is {}", argv.len(), policy.max_args),
            argv.join(" ").as_str(),
        ));
    }

    let mut total_bytes = 0usize;
    for arg in argv {
        if arg.len() > policy.max_arg_bytes {
            return Err(SecurityError::violation(
                format!(
                    "arg is {} bytes, max is {}",
                    arg.len(),
                    policy.max_arg_bytes
                ),
                arg,
            ));
        }
        total_bytes += arg.len();
    }
    if total_bytes > policy.max_argv_bytes {
        return Err(SecurityError::violation(
            format!(
                "argv totals {total_bytes} bytes, max is {}",
                policy.max_argv_bytes
            ),
            argv.join(" ").as_str(),
        ));
    }

    if policy.deny_shell_metachars {
        for arg in argv {
            if let Some(c) = arg.chars().find(|c| SHELL_METACHARS.contains(c)) {
                warn!(arg = %arg, metachar = %c, "rejected argv: shell metacharacter");
                return Err(SecurityError::violation(format!("metachar {c}"), arg));
            }
        }
    }

    if !policy.allowed_char_classes.is_empty() {
        let is_allowed = char_class_predicate(&policy.allowed_char_classes);
        for arg in argv {
            if let Some(c) = arg.chars().find(|c| !is_allowed(*c)) {
                return Err(SecurityError::violation(
                    format!("character '{c}' outside allowed classes"),
                    arg,
                ));
            }
        }
    }

    for arg in argv {
        if contains_path_traversal(arg) {
            return Err(SecurityError::violation("path traversal pattern", arg));
        }
    }

    Ok(())
}

fn char_class_predicate(classes: &[String]) -> impl Fn(char) -> bool + '_ {
    move |c: char| {
        classes.iter().any(|class| match class.as_str() {
            "alnum" => c.is_alphanumeric(),
            "alpha" => c.is_alphabetic(),
            "digit" => c.is_ascii_digit(),
            literal => literal.contains(c),
        })
    }
}

/// Matches `../`, `..\`, and the URL-encoded forms of `.`, `/`, `\`,
/// case-insensitively.
fn contains_path_traversal(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    const PATTERNS: &[&str] = &[
        "../", "..\\", "%2e%2e%2f", "%2e%2e\\", "..%2f", "..%5c", "%2e%2e%5c",
    ];
    PATTERNS.iter().any(|p| lower.contains(p))
}

/// Reject a resolved executable path that escapes the configured tools
/// root. An empty `tools_root` disables the gate (PATH lookups are allowed
/// through unchecked) — validation is opt-in per deployment.
///
/// No symlink resolution is performed; containment is purely lexical over
/// the absolute, `.`/`..`-normalised form of both paths.
pub fn validate_executable(candidate: &Path, tools_root: &Path) -> Result<(), SecurityError> {
    if tools_root.as_os_str().is_empty() {
        return Ok(());
    }

    let root = lexical_absolute(tools_root);
    let cand = lexical_absolute(candidate);

    if cand.starts_with(&root) {
        Ok(())
    } else {
        Err(SecurityError::violation(
            "executable escapes tools_root",
            &candidate.to_string_lossy(),
        ))
    }
}

/// Resolve `path` to an absolute form without touching the filesystem:
/// prefix with the process cwd if relative, then collapse `.`/`..`
/// components lexically.
fn lexical_absolute(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ArgvPolicy {
        ArgvPolicy {
            max_args: 8,
            max_arg_bytes: 64,
            max_argv_bytes: 256,
            deny_shell_metachars: true,
            allowed_char_classes: vec!["alnum".to_string(), "-_.:/,".to_string()],
        }
    }

    #[test]
    fn rejects_too_many_args() {
        let argv: Vec<String> = (0..9).map(|i| i.to_string()).collect();
        assert!(validate_argv(&argv, &policy()).is_err());
    }

    #[test]
    fn rejects_shell_metacharacter() {
        let argv = vec!["-x".to_string(), "target; rm -rf /".to_string()];
        let err = validate_argv(&argv, &policy()).unwrap_err();
        match err {
            SecurityError::Violation { reason, .. } => assert!(reason.contains("metachar ;")),
        }
    }

    #[test]
    fn rejects_path_traversal_and_encoded_variants() {
        assert!(validate_argv(&["../etc/passwd".to_string()], &policy()).is_err());
        assert!(validate_argv(&["..%2fetc%2fpasswd".to_string()], &policy()).is_err());
        assert!(validate_argv(&["%2e%2e%2fetc".to_string()], &policy()).is_err());
    }

    #[test]
    fn rejects_disallowed_character_class() {
        let argv = vec!["target@#!".to_string()];
        assert!(validate_argv(&argv, &policy()).is_err());
    }

    #[test]
    fn accepts_well_formed_argv() {
        let argv = vec![
            "-p".to_string(),
            "80,443".to_string(),
            "scanme.example.com".to_string(),
        ];
        assert!(validate_argv(&argv, &policy()).is_ok());
    }

    #[test]
    fn sample_in_error_is_truncated_to_50_chars() {
        let long_arg = "a".repeat(200) + ";";
        let argv = vec![long_arg];
        let err = validate_argv(&argv, &policy()).unwrap_err();
        match err {
            SecurityError::Violation { sample, .. } => assert!(sample.len() <= 50),
        }
    }

    #[test]
    fn executable_inside_tools_root_is_allowed() {
        let root = PathBuf::from("/opt/tools");
        let candidate = PathBuf::from("/opt/tools/naabu/naabu");
        assert!(validate_executable(&candidate, &root).is_ok());
    }

    #[test]
    fn executable_escaping_tools_root_is_forbidden() {
        let root = PathBuf::from("/opt/tools");
        let candidate = PathBuf::from("/opt/tools/../../etc/passwd");
        assert!(validate_executable(&candidate, &root).is_err());
    }

    #[test]
    fn empty_tools_root_disables_the_gate() {
        let candidate = PathBuf::from("/usr/bin/nmap");
        assert!(validate_executable(&candidate, &PathBuf::new()).is_ok());
    }
}
