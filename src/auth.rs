use std::fmt;

/// Personal access token used as a bearer credential.
///
/// Debug output is redacted so tokens never reach the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace_from_env_values() {
        let token = Token::from("  ghp_abc123\n");
        assert_eq!(token.as_str(), "ghp_abc123");
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = Token::from("ghp_secret");
        assert_eq!(format!("{token:?}"), "Token(***)");
    }
}
