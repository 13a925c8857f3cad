//! Message parser - Splits raw input into commands or plain text

/// A parsed line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// `/name arg1 arg2`; the arguments double as the subcommand path
    Command { name: String, args: Vec<String> },
    Text(String),
    Empty,
}

/// Parses incoming text into commands and messages
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn parse(&self, text: &str) -> ParsedInput {
        let text = text.trim();
        if text.is_empty() {
            return ParsedInput::Empty;
        }

        // Check if it's a command
        let Some(cmd_text) = text
            .strip_prefix('/')
            .or_else(|| text.strip_prefix(self.command_prefix.as_str()))
        else {
            return ParsedInput::Text(text.to_string());
        };

        let mut parts = cmd_text.split_whitespace();
        match parts.next() {
            Some(name) => ParsedInput::Command {
                name: name.to_lowercase(),
                args: parts.map(str::to_string).collect(),
            },
            None => ParsedInput::Text(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_and_args() {
        let parser = MessageParser::new("!");
        assert_eq!(
            parser.parse("/Config greeting Howdy"),
            ParsedInput::Command {
                name: "config".into(),
                args: vec!["greeting".into(), "Howdy".into()]
            }
        );
        assert_eq!(
            parser.parse("!ping"),
            ParsedInput::Command {
                name: "ping".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn plain_text_and_blank_lines() {
        let parser = MessageParser::new("/");
        assert_eq!(parser.parse("  hello there "), ParsedInput::Text("hello there".into()));
        assert_eq!(parser.parse("   "), ParsedInput::Empty);
        assert_eq!(parser.parse("/"), ParsedInput::Text("/".into()));
    }
}
