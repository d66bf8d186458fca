use crate::NavigationState;

/// Parses dialog input into a page candidate. Surrounding whitespace is
/// ignored; anything else that is not an unsigned integer is rejected.
pub fn parse_page(input: &str) -> Option<usize> {
    input.trim().parse::<usize>().ok()
}

pub fn is_input_valid(input: &str, state: &NavigationState) -> bool {
    parse_page(input)
        .map(|page| state.is_valid_page(page))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcome {
    /// The page was applied and the dialog should close.
    Submitted(usize),
    /// The affirmative action is disabled for the current input.
    Disabled,
}

/// "Go to page" prompt. Invalid input never raises an error, it only keeps
/// confirmation disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoToPageDialog {
    input: String,
}

impl GoToPageDialog {
    /// Opens the dialog prefilled with the current page.
    pub fn new(state: &NavigationState) -> Self {
        Self {
            input: state.page_number().to_string(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn push_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn is_input_valid(&self, state: &NavigationState) -> bool {
        is_input_valid(&self.input, state)
    }

    pub fn confirm(&self, state: &mut NavigationState) -> DialogOutcome {
        match parse_page(&self.input) {
            Some(page) if state.go_to_page(page) => DialogOutcome::Submitted(page),
            _ => DialogOutcome::Disabled,
        }
    }
}
