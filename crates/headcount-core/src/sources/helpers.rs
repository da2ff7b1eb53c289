//! Shared helpers used by the detector adapters.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Check if a command exists by running `which`.
pub fn command_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Characters that only make sense to a shell: quoting, expansion,
/// redirection and command chaining.
const SHELL_SYNTAX: &[char] = &[
    ';', '&', '|', '<', '>', '(', ')', '{', '}', '$', '`', '\'', '"', '\\', '*', '?', '~',
];

/// Builtins that can lead a command line without naming a program.
const SHELL_BUILTINS: &[&str] = &[".", "cd", "eval", "exec", "export", "source", "ulimit", "umask"];

/// Program that must exist for `sh -c <command_line>` to start the detector.
///
/// A plain `program args...` line names its program. Anything that leans on
/// the shell (`CAM=0 prog`, `cd dir && ./prog`, quoting) is checked as `sh`.
pub fn program_name(command_line: &str) -> Option<&str> {
    let first = command_line.split_whitespace().next()?;
    let needs_shell = first.contains('=')
        || SHELL_BUILTINS.contains(&first)
        || command_line.contains(SHELL_SYNTAX);
    Some(if needs_shell { "sh" } else { first })
}

/// Lock a mutex, recovering the data if a reader thread panicked while
/// holding it. The guarded values are plain counters and stay consistent.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_exists_true() {
        assert!(command_exists("sh"));
    }

    #[test]
    fn command_exists_false() {
        assert!(!command_exists("nonexistent_binary_xyz_12345"));
    }

    #[test]
    fn program_name_is_first_word() {
        assert_eq!(program_name("python3 detect.py --cam 0"), Some("python3"));
        assert_eq!(program_name("/opt/yolo/detect --fps 2"), Some("/opt/yolo/detect"));
        assert_eq!(program_name("   "), None);
    }

    #[test]
    fn program_name_falls_back_to_shell() {
        assert_eq!(program_name("CAM=0 python3 detect.py"), Some("sh"));
        assert_eq!(program_name("cd /opt && ./detect"), Some("sh"));
        assert_eq!(program_name("exec ./detect"), Some("sh"));
        assert_eq!(program_name("detect --label 'person'"), Some("sh"));
        assert_eq!(program_name("./detect 2>/dev/null"), Some("sh"));
        assert_eq!(program_name("~/bin/detect"), Some("sh"));
    }

    #[test]
    fn lock_recovers_from_poison() {
        let m = std::sync::Arc::new(Mutex::new(1));
        let m2 = std::sync::Arc::clone(&m);
        let _ = std::thread::spawn(move || {
            let _guard = m2.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(m.is_poisoned());
        assert_eq!(*lock(&m), 1);
    }
}
