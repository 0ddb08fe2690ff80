use crate::error::ShellError;
use crate::lexer;

/// One command of a pipeline: the command name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    words: Vec<String>,
}

impl Stage {
    /// Build a stage from its words. Returns `None` when there are no words.
    pub fn new<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        if words.is_empty() {
            None
        } else {
            Some(Self { words })
        }
    }

    /// The command name (`argv[0]`).
    pub fn name(&self) -> &str {
        &self.words[0]
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[String] {
        &self.words[1..]
    }
}

/// Stages of one input line in execution and connection order.
///
/// A pipeline is either empty (a blank line) or has no blank stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<T: IntoIterator<Item = Stage>>(iter: T) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

/// Parse one input line into a [`Pipeline`].
///
/// A blank line is an empty pipeline. Otherwise every stage must contain at
/// least one word: `a||b`, `a |` and `| a` are rejected with
/// [`ShellError::EmptyStage`] carrying the 1-based position of the blank stage.
pub fn parse(line: &str) -> Result<Pipeline, ShellError> {
    let line = lexer::trim_record(line);
    if line.trim().is_empty() {
        return Ok(Pipeline::default());
    }

    lexer::split_pipeline(line)
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            Stage::new(lexer::split_words(segment))
                .ok_or(ShellError::EmptyStage { position: i + 1 })
        })
        .collect()
}
