//! Colored terminal sink.

use std::io::{self, BufRead, Write};

use colored::{Color, Colorize};
use runtime::Sink;

/// Writes each channel in its own color and reads lines from any buffered
/// reader.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Output errors are dropped; there is nowhere left to report them.
    fn line(&mut self, text: &str, color: Color) {
        let _ = writeln!(self.output, "{}", text.color(color));
    }
}

impl<R: BufRead, W: Write> Sink for Console<R, W> {
    fn system(&mut self, text: &str) {
        self.line(text, Color::Blue);
    }

    fn llm(&mut self, text: &str) {
        self.line(text, Color::Green);
    }

    fn tool(&mut self, text: &str) {
        self.line(text, Color::Yellow);
    }

    fn progress(&mut self, text: &str) {
        self.line(text, Color::Cyan);
    }

    fn error(&mut self, text: &str) {
        self.line(text, Color::Magenta);
    }

    fn question(&mut self, prompt: &str) -> io::Result<Option<String>> {
        writeln!(self.output, "{}", prompt.color(Color::Blue))?;
        write!(self.output, "> ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
