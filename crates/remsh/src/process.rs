//! Exit-code convention for local processes

use std::io;
use std::process::ExitStatus;

/// Reported when a process ended without an exit code
pub const STATUS_UNAVAILABLE: i32 = 666;

/// Exit code of a waited-for local process.
///
/// Success is 0 and a normal exit yields its code. A spawn or wait error and
/// a process killed by a signal yield [`STATUS_UNAVAILABLE`].
pub fn exit_code(result: &io::Result<ExitStatus>) -> i32 {
    match result {
        Ok(status) if status.success() => 0,
        Ok(status) => status.code().unwrap_or(STATUS_UNAVAILABLE),
        Err(_) => STATUS_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn sh(script: &str) -> io::Result<ExitStatus> {
        Command::new("sh").arg("-c").arg(script).status()
    }

    #[test]
    fn test_success() {
        assert_eq!(exit_code(&sh("exit 0")), 0);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&sh("exit 3")), 3);
    }

    #[test]
    fn test_signal() {
        assert_eq!(exit_code(&sh("kill -9 $$")), STATUS_UNAVAILABLE);
    }

    #[test]
    fn test_spawn_error() {
        let result = Command::new("/nonexistent/remsh-test-binary").status();
        assert_eq!(exit_code(&result), STATUS_UNAVAILABLE);
    }
}
