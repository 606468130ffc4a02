//! Stateful REPL evaluation.
//!
//! Each session entry is evaluated against the accumulated top-level
//! bindings of previous entries. Top-level bindings are pure values, so the
//! session re-binds them by splicing the retained entry texts in front of
//! the new entry and recompiling; observable semantics match a persistent
//! environment.

use crate::error::{EmberError, ParseError};
use crate::parser::parse;
use crate::run::run;
use crate::value::Value;

/// An interactive session retaining top-level bindings across entries.
#[derive(Debug, Default)]
pub struct ReplSession {
    /// Retained binding-only entries, in submission order.
    entries: Vec<String>,
}

impl ReplSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates one entry. Binding entries (`val x = ...`) are retained for
    /// subsequent evaluations and yield the bound value; expression entries
    /// are evaluated and discarded.
    ///
    /// # Errors
    ///
    /// Returns the entry's parse, compile, or runtime error. A failed entry
    /// is never retained.
    pub fn eval(&mut self, entry: &str) -> Result<Value, EmberError> {
        if entry.trim().is_empty() {
            return Err(ParseError::Empty { what: "entry" }.into());
        }
        // Parse the entry alone first: it classifies the entry and rejects
        // garbage before it can poison the session splice.
        let block = parse(entry)?;
        let retain = !block.has_explicit_result && !block.bindings.is_empty();

        let mut source = self.entries.join("\n");
        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(entry);
        let value = run(&source)?;

        if retain {
            self.entries.push(entry.to_owned());
        }
        Ok(value)
    }

    /// Names bound so far, in binding order.
    #[must_use]
    pub fn bound_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|entry| parse(entry).ok())
            .flat_map(|block| block.bindings.into_iter().map(|b| b.name))
            .collect()
    }

    /// Drops all retained bindings.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
