//! Validation functions for configuration values.

use validator::ValidationError;

pub fn validate_hostname<S: AsRef<str>>(hostname: S) -> Result<(), ValidationError> {
    let hostname = hostname.as_ref();
    if hostname.is_empty() {
        return Err(ValidationError::new("InvalidHostname")
            .with_message("hostname must not be empty".into()));
    }

    if hostname.starts_with('-') || hostname.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("InvalidHostname").with_message(
            format!("{hostname:?} cannot be passed to the transport as a hostname").into(),
        ));
    }

    Ok(())
}

pub fn validate_lock_template<S: AsRef<str>>(template: S) -> Result<(), ValidationError> {
    let template = template.as_ref();
    if template.trim().is_empty() {
        return Err(ValidationError::new("InvalidLockTemplate")
            .with_message("default lock template must not be empty".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hostname() {
        assert!(validate_hostname("foo.test").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("foo bar").is_err());
        // would be parsed as an ssh option
        assert!(validate_hostname("-oProxyCommand=x").is_err());
    }

    #[test]
    fn test_validate_lock_template() {
        assert!(validate_lock_template("/var/lock/backup/{}.lock").is_ok());
        assert!(validate_lock_template("  ").is_err());
    }
}
