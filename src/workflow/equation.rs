//! Equation preparation for the minimize workflow
//!
//! The source process only minimizes equations that appear in a complete
//! document, so a single equation is wrapped into one: every variable except
//! the assignment target is declared as an input first.

use crate::error::{Result, ToolchainError};
use serde_json::Value;

/// Assignment operator of the equation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Equals,
    /// `:=`
    Define,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Equals => "=",
            AssignOp::Define => ":=",
        }
    }
}

/// An equation ready to be sent to the source process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEquation {
    /// Equation text without comment and leading spaces
    pub equation: String,
    /// Trailing comment including the `//` marker
    pub comment: Option<String>,
    pub op: AssignOp,
    /// Distinct identifiers in order of appearance; the first is the target
    pub variables: Vec<String>,
}

impl PreparedEquation {
    /// Validate and normalize one equation
    pub fn parse(input: &str) -> Result<Self> {
        let (equation, comment) = match input.split_once("//") {
            Some((equation, comment)) => (equation, Some(format!("//{}", comment))),
            None => (input, None),
        };

        let Some(eq_pos) = equation.find('=') else {
            return Err(ToolchainError::Equation(
                "There is no \"=\" in the equation".to_string(),
            ));
        };
        if !equation.contains(';') {
            return Err(ToolchainError::Equation(
                "Could not find a semicolon (\";\") at the end of the equation".to_string(),
            ));
        }

        let op = if equation[..eq_pos].ends_with(':') {
            AssignOp::Define
        } else {
            AssignOp::Equals
        };

        let equation = equation.trim_start_matches(' ').to_string();
        let variables = distinct_identifiers(&equation);
        if variables.is_empty() {
            return Err(ToolchainError::Equation(
                "The equation has no assignment target".to_string(),
            ));
        }

        Ok(Self {
            equation,
            comment,
            op,
            variables,
        })
    }

    /// Assignment target
    pub fn target(&self) -> &str {
        &self.variables[0]
    }

    /// Variables declared as inputs
    pub fn inputs(&self) -> &[String] {
        &self.variables[1..]
    }

    /// Document text: one `input x;` line per input, then the equation
    pub fn document(&self) -> String {
        let mut text = String::new();
        for input in self.inputs() {
            text.push_str("input ");
            text.push_str(input);
            text.push_str(";\n");
        }
        text.push_str(&self.equation);
        text
    }

    /// Line of the equation inside [`Self::document`]
    pub fn equation_line(&self) -> usize {
        self.inputs().len()
    }

    /// Rebuild the answer from a `minimized_equation` payload
    ///
    /// Every token of `infixRep` is a `[kind, text]` pair; the texts are joined
    /// with single spaces the way the source process prints them.
    pub fn render_minimized(&self, payload: &Value) -> Result<String> {
        let tokens = payload
            .get("infixRep")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ToolchainError::Equation("Minimized equation carries no infixRep".to_string())
            })?;

        let mut out = format!("{} {}", self.target(), self.op.as_str());
        for token in tokens {
            let text = token.get(1).ok_or_else(|| {
                ToolchainError::Equation(format!("Malformed infix token {}", token))
            })?;
            out.push(' ');
            match text {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push(';');

        if let Some(comment) = &self.comment {
            out.push(' ');
            out.push_str(comment);
        }
        Ok(out)
    }
}

fn distinct_identifiers(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let starts_with_digit = word.chars().next().is_some_and(|c| c.is_ascii_digit());
        if word.is_empty() || starts_with_digit {
            continue;
        }
        if !seen.iter().any(|w| w == word) {
            seen.push(word.to_string());
        }
    }
    seen
}
