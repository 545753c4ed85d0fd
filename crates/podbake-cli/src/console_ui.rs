use console::{Style, Term};
use podbake_core::Ui;

/// Styled build narration on stderr, keeping stdout for the result.
pub struct ConsoleUi {
    term: Term,
    arrow: Style,
    failure: Style,
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self {
            term: Term::stderr(),
            arrow: Style::new().cyan().bold(),
            failure: Style::new().red(),
        }
    }
}

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        let _ = self
            .term
            .write_line(&format!("{} {message}", self.arrow.apply_to("==>")));
    }

    fn message(&self, message: &str) {
        let _ = self.term.write_line(&format!("    {message}"));
    }

    fn error(&self, message: &str) {
        let _ = self
            .term
            .write_line(&self.failure.apply_to(message).to_string());
    }
}
