//! Command validation before execution

use crate::error::{AdminError, Result};

/// Sanitize a command before execution
///
/// Trims surrounding whitespace, rejects empty commands and enforces the
/// optional length limit.
///
/// # Examples
/// ```
/// use dbhost_admin::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  ls -la  ", Some(1000)).unwrap();
/// assert_eq!(cmd, "ls -la");
///
/// let result = sanitize_command("a".repeat(100).as_str(), Some(50));
/// assert!(result.is_err());
/// ```
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(AdminError::invalid_params("Command cannot be empty"));
    }

    if trimmed.contains('\0') {
        return Err(AdminError::invalid_params("Command cannot contain NUL bytes"));
    }

    if let Some(max) = max_chars {
        let length = trimmed.chars().count();
        if length > max {
            return Err(AdminError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max, length
            )));
        }
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_command_trims_whitespace() {
        assert_eq!(sanitize_command("  ls -la  ", Some(1000)).unwrap(), "ls -la");
    }

    #[test]
    fn test_sanitize_command_empty() {
        let result = sanitize_command("   ", Some(1000));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sanitize_command_nul() {
        let result = sanitize_command("ls\0rm", None);
        assert!(result.unwrap_err().to_string().contains("NUL"));
    }

    #[test]
    fn test_sanitize_command_too_long() {
        let result = sanitize_command(&"a".repeat(100), Some(50));
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_sanitize_command_exactly_at_limit() {
        assert!(sanitize_command(&"a".repeat(50), Some(50)).is_ok());
    }

    #[test]
    fn test_sanitize_command_counts_characters() {
        assert!(sanitize_command("échoé", Some(5)).is_ok());
    }

    #[test]
    fn test_sanitize_command_unlimited() {
        assert!(sanitize_command(&"a".repeat(10000), None).is_ok());
    }
}
