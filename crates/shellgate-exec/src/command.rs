//! Command classification: truncation, builtin detection and shell dispatch

/// Characters that require running the command through `shell -c`.
const SHELL_METACHARACTERS: &[char] = &['>', '<', '|', '&', ';'];

/// Commands the runner answers itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    /// `cd [target]`
    ChangeDirectory(Option<String>),
}

impl Builtin {
    /// Recognize a builtin from a trimmed command line.
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        match parts.next()? {
            "cd" => {
                let rest: Vec<&str> = parts.collect();
                let target = (!rest.is_empty()).then(|| rest.join(" "));
                Some(Builtin::ChangeDirectory(target))
            }
            _ => None,
        }
    }
}

/// A validated command line, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    text: String,
}

impl CommandLine {
    /// Trim `raw` and cut it to `max_chars` characters.
    pub fn new(raw: &str, max_chars: usize) -> Self {
        let trimmed = raw.trim();
        let text = match trimmed.char_indices().nth(max_chars) {
            Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
            None => trimmed.to_string(),
        };
        Self { text }
    }

    /// The command text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether nothing is left after trimming
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether redirection or chaining forces `shell -c` dispatch.
    pub fn needs_shell(&self) -> bool {
        self.text.contains(SHELL_METACHARACTERS)
    }

    /// Program and arguments for direct (non-shell) dispatch.
    pub fn argv(&self) -> Option<(&str, Vec<&str>)> {
        let mut parts = self.text.split_whitespace();
        let program = parts.next()?;
        Some((program, parts.collect()))
    }

    /// Builtin this line invokes, if any
    pub fn builtin(&self) -> Option<Builtin> {
        Builtin::parse(&self.text)
    }
}
