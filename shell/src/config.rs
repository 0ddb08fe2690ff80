/// Prompt printed before every line when none is configured.
pub const DEFAULT_PROMPT: &str = "$ ";

/// Number of lines the history log keeps when none is configured.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Session settings, collected from the command line by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Constant prompt printed before each line is read.
    pub prompt: String,
    /// Capacity of the history log; values below 1 are raised to 1.
    pub history_size: usize,
    /// Use the line editor when standard input is a terminal.
    pub use_editor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_owned(),
            history_size: DEFAULT_HISTORY_SIZE,
            use_editor: true,
        }
    }
}
