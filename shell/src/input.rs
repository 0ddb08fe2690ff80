use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Read, Write};

/// Where the session loop gets its lines from.
pub trait LineSource {
    /// Show `prompt` and return the next line, or `None` at end of input.
    ///
    /// The line may still carry its record delimiter.
    fn next_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Interactive source backed by a rustyline editor.
pub struct EditorSource {
    editor: DefaultEditor,
}

impl EditorSource {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to initialise line editor")?;
        Ok(Self { editor })
    }
}

impl LineSource for EditorSource {
    fn next_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => {
                log::debug!("interrupted at the prompt");
                Ok(None)
            }
            Err(err) => Err(err).context("failed to read line"),
        }
    }
}

/// Plain source for pipes, files and tests: writes the prompt, reads a line.
///
/// Reads one byte at a time so that nothing past the current line is taken
/// from a shared descriptor: whatever follows stays there for the commands
/// the line runs. Invalid UTF-8 is replaced rather than rejected.
pub struct ReaderSource<R, W> {
    reader: R,
    prompt_out: W,
}

impl<R: Read, W: Write> ReaderSource<R, W> {
    pub fn new(reader: R, prompt_out: W) -> Self {
        Self { reader, prompt_out }
    }

    fn read_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut record = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) if record.is_empty() => return Ok(None),
                Ok(0) => return Ok(Some(record)),
                Ok(_) => {
                    record.push(byte[0]);
                    if byte[0] == b'\n' {
                        return Ok(Some(record));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read, W: Write> LineSource for ReaderSource<R, W> {
    fn next_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompt_out
            .write_all(prompt.as_bytes())
            .and_then(|_| self.prompt_out.flush())
            .context("failed to write prompt")?;

        let record = self.read_record().context("failed to read line")?;
        Ok(record.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}
