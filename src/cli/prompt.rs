use std::io::{BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

use crate::navigator::Prompter;

/// Asks on the terminal. An empty answer or end of input declines.
///
/// Prompts go to stderr; stdout carries page HTML.
pub struct StdinPrompter;

#[async_trait]
impl Prompter for StdinPrompter {
    async fn request_input(&self, prompt: &str, sensitive: bool) -> Option<String> {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr().lock();
            write_prompt(&mut stderr, &prompt, sensitive)?;
            read_answer(&mut std::io::stdin().lock())
        })
        .await;

        match answer {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Failed to read input: {}", e);
                None
            }
            Err(e) => {
                warn!("Input task failed: {}", e);
                None
            }
        }
    }
}

fn write_prompt<W: Write>(out: &mut W, prompt: &str, sensitive: bool) -> std::io::Result<()> {
    if sensitive {
        writeln!(out, "(sensitive input, will be visible)")?;
    }
    write!(out, "{}: ", prompt)?;
    out.flush()
}

fn read_answer<R: BufRead>(input: &mut R) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']);
    Ok((!line.is_empty()).then(|| line.to_string()))
}
