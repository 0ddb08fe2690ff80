use anyhow::Context;
use argh::FromArgs;
use pipeshell::config::{DEFAULT_HISTORY_SIZE, DEFAULT_PROMPT};
use pipeshell::{Config, EditorSource, Interpreter, LineSource, ReaderSource};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

#[derive(FromArgs)]
/// Interactive shell running pipelines of programs.
struct Options {
    #[argh(option, default = "String::from(DEFAULT_PROMPT)")]
    /// prompt printed before each line.
    prompt: String,

    #[argh(option, default = "DEFAULT_HISTORY_SIZE")]
    /// number of lines kept in history.
    history_size: usize,

    #[argh(switch)]
    /// read plain lines even when standard input is a terminal.
    plain: bool,

    #[argh(switch, short = 'v')]
    /// log debug information to standard error.
    verbose: bool,
}

impl From<Options> for Config {
    fn from(options: Options) -> Self {
        Config {
            prompt: options.prompt,
            history_size: options.history_size.max(1),
            use_editor: !options.plain,
        }
    }
}

fn main() {
    let options: Options = argh::from_env();
    let default_level = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(err) = run(&Config::from(options)) {
        eprintln!("pipeshell: {err:#}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let mut interpreter = Interpreter::new(config)?;
    let mut source: Box<dyn LineSource> = if config.use_editor && io::stdin().is_terminal() {
        Box::new(EditorSource::new()?)
    } else {
        let stdin = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .context("failed to duplicate standard input")?;
        Box::new(ReaderSource::new(File::from(stdin), io::stdout()))
    };
    interpreter.repl(source.as_mut())
}
