//! Terminal handoff prompt

use crate::capture::handoff::{HandoffDecision, HumanNotifier};
use std::io::{BufRead, Write};
use tokio::sync::oneshot;
use tracing::warn;

/// Asks on stderr and reads the answer from stdin.
///
/// Enter or `c` continues, `s` skips. End of input counts as skip.
#[derive(Debug, Default, Clone)]
pub struct TerminalNotifier;

/// Interpret one line of terminal input
pub fn parse_answer(line: &str) -> Option<HandoffDecision> {
    match line.trim().to_lowercase().as_str() {
        "" | "c" | "continue" | "y" | "yes" => Some(HandoffDecision::proceed()),
        "s" | "skip" | "n" | "no" => Some(HandoffDecision::skip()),
        _ => None,
    }
}

impl HumanNotifier for TerminalNotifier {
    fn request(&self, url: &str) -> oneshot::Receiver<HandoffDecision> {
        let (tx, rx) = oneshot::channel();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\nCAPTCHA detected for:\n  {}\nSolve it in the browser window, then press Enter to continue (or type 's' to skip).",
                url
            );
            let mut line = String::new();
            loop {
                let _ = write!(stderr, "[continue/skip] > ");
                let _ = stderr.flush();
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => return,
                    Ok(_) => {
                        if let Some(decision) = parse_answer(&line) {
                            let _ = tx.send(decision);
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Reading answer failed: {}", e);
                        return;
                    }
                }
            }
        });

        rx
    }
}
