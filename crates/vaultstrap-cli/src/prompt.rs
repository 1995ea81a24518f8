//! Terminal confirmation prompt.
//!
//! The admin token is written to stderr so it reaches the operator even when
//! stdout is redirected (for example with `--json`). Without a terminal on
//! both stdin and stderr the prompt fails closed: the token is never printed
//! and every question is answered "no".

use std::io::{BufRead, IsTerminal, Write};

use vaultstrap_core::prompt::ConfirmationPrompt;
use vaultstrap_core::secret::RawToken;

use crate::{BOLD, DIM, RESET, YELLOW};

pub struct TerminalPrompt {
    interactive: bool,
}

impl TerminalPrompt {
    /// Detect whether a human can answer.
    pub fn detect() -> Self {
        Self {
            interactive: std::io::stdin().is_terminal() && std::io::stderr().is_terminal(),
        }
    }
}

impl ConfirmationPrompt for TerminalPrompt {
    fn present_secret(&self, label: &str, secret: &RawToken) {
        if !self.interactive {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err);
        let _ = writeln!(err, "  {YELLOW}{BOLD}⚠ {label} (shown once):{RESET}");
        let _ = writeln!(err);
        let _ = writeln!(err, "    {BOLD}{}{RESET}", secret.expose());
        let _ = writeln!(err);
        let _ = writeln!(
            err,
            "  {DIM}Only its hash is stored. Log in to /admin with this value.{RESET}"
        );
    }

    fn confirm(&self, question: &str) -> bool {
        if !self.interactive {
            let _ = writeln!(
                std::io::stderr(),
                "  {YELLOW}no terminal attached; refusing to continue without confirmation{RESET}"
            );
            return false;
        }
        {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "  {question} [y/N] ");
            let _ = err.flush();
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
