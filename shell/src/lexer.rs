//! A module implementing lexical analysis for pipelines.
//!
//! The language has no quoting: a line is cut on the pipe character into
//! stages, and every stage is cut on whitespace into words.

/// The pipe operator separating stages.
pub const PIPE: char = '|';

/// Splits a line into one substring per stage.
///
/// Internal whitespace is preserved, so `"a | b"` yields `["a ", " b"]`.
/// An empty line still yields one (empty) stage; callers decide what blank
/// stages mean.
pub fn split_pipeline(line: &str) -> Vec<&str> {
    line.split(PIPE).collect()
}

/// Splits a stage into argument words on runs of whitespace.
pub fn split_words(stage: &str) -> Vec<&str> {
    stage.split_whitespace().collect()
}

/// Removes the record delimiter (`\n` or `\r\n`) a line source leaves behind.
pub fn trim_record(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
