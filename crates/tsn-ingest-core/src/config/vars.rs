//! Environment variable interpolation for config files.
//!
//! Credentials (GitHub token, destination credentials) are never written into
//! config files; they are referenced and resolved at load time:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - literal `$`

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ ([A-Za-z_][A-Za-z0-9_]*) (?: (:?-) ([^}]*) )? \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("static interpolation pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// How a `${VAR...}` reference falls back when the variable is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    None,
    /// `${VAR-default}`
    IfUnset(&'a str),
    /// `${VAR:-default}`
    IfUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        match (caps.get(2).map(|m| m.as_str()), caps.get(3)) {
            (Some(":-"), Some(default)) => Fallback::IfUnsetOrEmpty(default.as_str()),
            (Some("-"), Some(default)) => Fallback::IfUnset(default.as_str()),
            _ => Fallback::None,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (std::env::var(name), fallback) {
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::IfUnsetOrEmpty(default)) if value.is_empty() => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::IfUnset(default) | Fallback::IfUnsetOrEmpty(default)) => {
            Ok(default.to_string())
        }
        (Err(_), Fallback::None) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| {
            let whole = &caps[0];
            if whole == "$$" {
                return "$".to_string();
            }

            let name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());

            resolve(name, Fallback::from_captures(caps)).unwrap_or_else(|message| {
                errors.push(message);
                whole.to_string()
            })
        })
        .into_owned();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Each test uses its own variable names, so parallel tests never race.
    fn set(key: &str, value: Option<&str>) {
        // SAFETY: variable names are unique per test.
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
    }

    #[test]
    fn test_unbraced_and_braced() {
        set("TSN_INGEST_TEST_TOKEN", Some("secret"));
        let result = interpolate("a: $TSN_INGEST_TEST_TOKEN\nb: ${TSN_INGEST_TEST_TOKEN}");
        assert!(result.is_ok());
        assert_eq!(result.text, "a: secret\nb: secret");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        set("TSN_INGEST_TEST_MISSING_A", None);
        set("TSN_INGEST_TEST_MISSING_B", None);
        let result = interpolate("$TSN_INGEST_TEST_MISSING_A ${TSN_INGEST_TEST_MISSING_B}");
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("TSN_INGEST_TEST_MISSING_A"));
        assert!(result.errors[1].contains("not set"));
    }

    #[test]
    fn test_colon_dash_default_covers_empty() {
        set("TSN_INGEST_TEST_EMPTY", Some(""));
        let result = interpolate("${TSN_INGEST_TEST_EMPTY:-fallback}");
        assert!(result.is_ok());
        assert_eq!(result.text, "fallback");
    }

    #[test]
    fn test_dash_default_keeps_empty() {
        set("TSN_INGEST_TEST_EMPTY_KEEP", Some(""));
        let result = interpolate("[${TSN_INGEST_TEST_EMPTY_KEEP-fallback}]");
        assert_eq!(result.text, "[]");

        set("TSN_INGEST_TEST_UNSET_DASH", None);
        let result = interpolate("${TSN_INGEST_TEST_UNSET_DASH-fallback}");
        assert_eq!(result.text, "fallback");
    }

    #[test]
    fn test_newline_injection_rejected() {
        set("TSN_INGEST_TEST_NEWLINE", Some("a\nb"));
        let result = interpolate("$TSN_INGEST_TEST_NEWLINE");
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("newlines"));
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }
}
