//! Line-based player input

use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What a typed line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Rename(String),
    Text(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();

    if line.eq_ignore_ascii_case("exit") {
        return Command::Exit;
    }

    if let Some(rest) = line.strip_prefix("/name") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Command::Rename(rest.trim().to_string());
        }
    }

    Command::Text(line.to_string())
}

/// Delivers typed lines without blocking the network loop.
pub struct InputManager {
    lines: mpsc::UnboundedReceiver<String>,
}

impl InputManager {
    /// Reads standard input on a background task.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Failed to read standard input: {}", e);
                        break;
                    }
                }
            }
        });

        Self { lines: rx }
    }

    /// Lines come from the given channel instead of a terminal.
    pub fn from_channel(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self { lines }
    }

    /// Next typed line, or `None` once input is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("exit"), Command::Exit);
        assert_eq!(parse_command("  EXIT \n"), Command::Exit);
        assert_eq!(
            parse_command("/name  alice "),
            Command::Rename("alice".to_string())
        );
        assert_eq!(parse_command("/name"), Command::Rename(String::new()));
        assert_eq!(
            parse_command("/names"),
            Command::Text("/names".to_string())
        );
        assert_eq!(parse_command(" yes "), Command::Text("yes".to_string()));
    }

    #[tokio::test]
    async fn test_lines_from_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut input = InputManager::from_channel(rx);

        tx.send("yes".to_string()).unwrap();
        drop(tx);

        assert_eq!(input.next_line().await, Some("yes".to_string()));
        assert_eq!(input.next_line().await, None);
    }
}
