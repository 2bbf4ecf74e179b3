//! Terminal output with ANSI styling

use rand::Rng;
use shared::Opcode;

const RESET: &str = "\x1b[0m";

const RAINBOW: [Style; 6] = [
    Style::Red,
    Style::Yellow,
    Style::Green,
    Style::Cyan,
    Style::Blue,
    Style::Magenta,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Bold,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Style::Bold => "\x1b[1m",
            Style::Red => "\x1b[31m",
            Style::Green => "\x1b[32m",
            Style::Yellow => "\x1b[33m",
            Style::Blue => "\x1b[34m",
            Style::Magenta => "\x1b[35m",
            Style::Cyan => "\x1b[36m",
        }
    }
}

/// Wraps `text` in the given styles, resetting afterwards.
pub fn augment(text: &str, styles: &[Style]) -> String {
    if styles.is_empty() {
        return text.to_string();
    }

    let mut styled: String = styles.iter().map(|style| style.code()).collect();
    styled.push_str(text);
    styled.push_str(RESET);
    styled
}

/// Colors every visible character, cycling through the rainbow from a random
/// starting hue.
pub fn rainbowify(text: &str) -> String {
    let mut hue = rand::thread_rng().gen_range(0..RAINBOW.len());
    let mut styled = String::with_capacity(text.len() * 6);

    for c in text.chars() {
        if c.is_whitespace() {
            styled.push(c);
            continue;
        }
        styled.push_str(RAINBOW[hue].code());
        styled.push(c);
        hue = (hue + 1) % RAINBOW.len();
    }

    styled.push_str(RESET);
    styled
}

/// How a server message is shown to the player.
pub fn render_message(opcode: Opcode, text: &str) -> String {
    match opcode {
        Opcode::Start => augment(text, &[Style::Bold, Style::Cyan]),
        Opcode::Question => augment(text, &[Style::Bold, Style::Yellow]),
        Opcode::Positive => rainbowify(text),
        Opcode::Negative => augment(text, &[Style::Red]),
        Opcode::End => augment(text, &[Style::Bold, Style::Magenta]),
        Opcode::Abort => augment(text, &[Style::Bold, Style::Red]),
        Opcode::Info | Opcode::Unknown => text.to_string(),
    }
}

/// Where the client writes what the player sees.
pub trait UserInterface {
    fn display(&mut self, text: &str);
}

/// Prints to standard output.
#[derive(Debug, Default)]
pub struct Terminal;

impl UserInterface for Terminal {
    fn display(&mut self, text: &str) {
        println!("{}", text);
    }
}

#[cfg(test)]
pub(crate) fn strip_ansi(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            plain.push(c);
        }
    }
    plain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment() {
        assert_eq!(augment("hi", &[]), "hi");
        assert_eq!(augment("hi", &[Style::Bold]), "\x1b[1mhi\x1b[0m");
        assert_eq!(
            augment("hi", &[Style::Bold, Style::Green]),
            "\x1b[1m\x1b[32mhi\x1b[0m"
        );
    }

    #[test]
    fn test_rainbowify_keeps_text() {
        let styled = rainbowify("Correct! Well done");
        assert_eq!(strip_ansi(&styled), "Correct! Well done");
        // One color code per visible character.
        assert_eq!(styled.matches('\x1b').count(), "Correct!Welldone".len() + 1);
    }

    #[test]
    fn test_render_message() {
        assert_eq!(render_message(Opcode::Info, "plain"), "plain");
        assert_eq!(strip_ansi(&render_message(Opcode::Question, "q?")), "q?");
        assert!(render_message(Opcode::Negative, "Incorrect!").starts_with("\x1b[31m"));
    }
}
