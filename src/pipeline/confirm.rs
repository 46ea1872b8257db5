use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationChoice {
    Confirm,
    Cancel,
}

impl ConfirmationChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationChoice::Confirm => "confirm",
            ConfirmationChoice::Cancel => "cancel",
        }
    }

    fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "" | "confirm" | "c" | "y" | "yes" => Some(ConfirmationChoice::Confirm),
            "cancel" | "n" | "no" => Some(ConfirmationChoice::Cancel),
            _ => None,
        }
    }
}

/// An action awaiting a human decision.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub action: String,
    pub description: String,
    pub details: BTreeMap<String, String>,
    pub options: Vec<ConfirmationChoice>,
}

impl ConfirmationRequest {
    pub fn new(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            details: BTreeMap::new(),
            options: vec![ConfirmationChoice::Confirm, ConfirmationChoice::Cancel],
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

pub trait Confirmer: Send + Sync {
    fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationChoice>;
}

/// Non-interactive mode: always the first option.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationChoice> {
        let choice = request
            .options
            .first()
            .copied()
            .unwrap_or(ConfirmationChoice::Confirm);
        tracing::info!(action = %request.action, choice = choice.as_str(), "Auto-confirmed");
        Ok(choice)
    }
}

/// Prompts on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirm;

impl Confirmer for TerminalConfirm {
    fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationChoice> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stderr();
        prompt(request, &mut input, &mut output)
    }
}

/// Ask until a recognised answer arrives. End of input cancels.
pub fn prompt<R: BufRead, W: Write>(
    request: &ConfirmationRequest,
    input: &mut R,
    output: &mut W,
) -> Result<ConfirmationChoice> {
    let rule = "=".repeat(60);
    writeln!(output, "\n{rule}\nCONFIRMATION REQUIRED\n{rule}")?;
    writeln!(output, "Action: {}", request.action)?;
    writeln!(output, "Description: {}", request.description)?;
    if !request.details.is_empty() {
        writeln!(output, "Details:")?;
        for (key, value) in &request.details {
            writeln!(output, "  {key}: {value}")?;
        }
    }
    let options: Vec<&str> = request.options.iter().map(|o| o.as_str()).collect();

    loop {
        write!(output, "[{}] (default {}): ", options.join("/"), options.first().unwrap_or(&"confirm"))?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(ConfirmationChoice::Cancel);
        }
        match ConfirmationChoice::parse(&line) {
            Some(choice) if request.options.contains(&choice) => return Ok(choice),
            _ => writeln!(output, "Please answer one of: {}", options.join(", "))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConfirmationRequest {
        ConfirmationRequest::new("create_project", "Create project 'demo'?").detail("language", "python")
    }

    fn answer(text: &str) -> (ConfirmationChoice, String) {
        let mut input = std::io::Cursor::new(text.as_bytes().to_vec());
        let mut output = Vec::new();
        let choice = prompt(&request(), &mut input, &mut output).unwrap();
        (choice, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_auto_confirm_picks_first_option() {
        assert_eq!(AutoConfirm.confirm(&request()).unwrap(), ConfirmationChoice::Confirm);
    }

    #[test]
    fn test_empty_line_confirms() {
        let (choice, shown) = answer("\n");
        assert_eq!(choice, ConfirmationChoice::Confirm);
        assert!(shown.contains("language: python"));
    }

    #[test]
    fn test_reprompts_until_valid() {
        let (choice, shown) = answer("maybe\ncancel\n");
        assert_eq!(choice, ConfirmationChoice::Cancel);
        assert!(shown.contains("Please answer one of: confirm, cancel"));
    }

    #[test]
    fn test_end_of_input_cancels() {
        assert_eq!(answer("").0, ConfirmationChoice::Cancel);
    }
}
