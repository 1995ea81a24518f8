//! Operator interaction capability.

use crate::secret::RawToken;

/// Shows the one-time admin token and asks the operator to acknowledge it.
///
/// Implementations that cannot reach a human must fail closed: `confirm`
/// returns `false` instead of blocking or assuming consent.
pub trait ConfirmationPrompt: Send + Sync {
    /// Display `secret` to the operator. Called exactly once per token.
    fn present_secret(&self, label: &str, secret: &RawToken);

    /// Ask a yes/no `question`; `true` only on an explicit yes.
    fn confirm(&self, question: &str) -> bool;
}

/// A prompt for unattended runs: shows nothing and declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl ConfirmationPrompt for DeclineAll {
    fn present_secret(&self, _label: &str, _secret: &RawToken) {}

    fn confirm(&self, _question: &str) -> bool {
        false
    }
}
