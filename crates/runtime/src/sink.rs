//! Where a session writes what the user sees, and reads what they type.

use std::io;

/// Channel-tagged output plus line input.
///
/// Each output method is one logical line on its channel. Implementations
/// decide how channels look (the binary colors them); the session only
/// picks the channel.
pub trait Sink {
    /// Session notices: greetings, lifecycle.
    fn system(&mut self, text: &str);

    /// Text produced by the model.
    fn llm(&mut self, text: &str);

    /// Capability output.
    fn tool(&mut self, text: &str);

    /// Progress notices while capabilities run.
    fn progress(&mut self, text: &str);

    fn error(&mut self, text: &str);

    /// Prompt for one line of input. `Ok(None)` means input is exhausted.
    fn question(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn system(&mut self, text: &str) {
        (**self).system(text);
    }

    fn llm(&mut self, text: &str) {
        (**self).llm(text);
    }

    fn tool(&mut self, text: &str) {
        (**self).tool(text);
    }

    fn progress(&mut self, text: &str) {
        (**self).progress(text);
    }

    fn error(&mut self, text: &str) {
        (**self).error(text);
    }

    fn question(&mut self, prompt: &str) -> io::Result<Option<String>> {
        (**self).question(prompt)
    }
}
