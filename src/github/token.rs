//! Bearer-token resolution.
//!
//! Providers are tried in order: the `gh` CLI helper first, then the
//! environment. The first provider that yields a non-empty token wins.

use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Environment variables consulted, in order, by the env provider.
const TOKEN_ENV_VARS: [&str; 2] = ["SOBA_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// A source of GitHub bearer tokens.
pub trait TokenProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn token(&self) -> Option<String>;
}

/// Asks the `gh` CLI for the token of the logged-in user.
pub struct GhCliTokenProvider;

impl TokenProvider for GhCliTokenProvider {
    fn name(&self) -> &'static str {
        "gh-cli"
    }

    fn token(&self) -> Option<String> {
        let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() { None } else { Some(token) }
    }
}

/// Reads the token from `SOBA_GITHUB_TOKEN`, then `GITHUB_TOKEN`.
pub struct EnvTokenProvider;

impl TokenProvider for EnvTokenProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn token(&self) -> Option<String> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|t| !t.trim().is_empty())
            .map(|t| t.trim().to_string())
    }
}

/// Resolve a token from the default provider chain.
pub fn resolve_token() -> Result<String> {
    resolve_from(&[&GhCliTokenProvider, &EnvTokenProvider])
}

fn resolve_from(providers: &[&dyn TokenProvider]) -> Result<String> {
    for provider in providers {
        if let Some(token) = provider.token() {
            debug!(provider = provider.name(), "resolved GitHub token");
            return Ok(token);
        }
    }
    Err(Error::validation(
        "no GitHub token available; run `gh auth login` or set GITHUB_TOKEN",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct FixedProvider(Option<&'static str>);

    impl TokenProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn token(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_first_provider_wins() {
        let token = resolve_from(&[&FixedProvider(Some("aaa")), &FixedProvider(Some("bbb"))]).unwrap();
        assert_eq!(token, "aaa");
    }

    #[test]
    fn test_chain_falls_through_empty_providers() {
        let token = resolve_from(&[&FixedProvider(None), &FixedProvider(Some("bbb"))]).unwrap();
        assert_eq!(token, "bbb");
    }

    #[test]
    fn test_empty_chain_is_validation_error() {
        let err = resolve_from(&[&FixedProvider(None)]).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Validation);
    }

    #[test]
    #[serial]
    fn test_env_provider_prefers_soba_variable() {
        unsafe {
            std::env::set_var("SOBA_GITHUB_TOKEN", "soba-token");
            std::env::set_var("GITHUB_TOKEN", "gh-token");
        }
        assert_eq!(EnvTokenProvider.token().as_deref(), Some("soba-token"));
        unsafe {
            std::env::remove_var("SOBA_GITHUB_TOKEN");
        }
        assert_eq!(EnvTokenProvider.token().as_deref(), Some("gh-token"));
        unsafe {
            std::env::remove_var("GITHUB_TOKEN");
        }
        assert_eq!(EnvTokenProvider.token(), None);
    }
}
