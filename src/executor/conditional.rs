//! Conditional cursor for `if`/`else`/`endif`
//!
//! Each open `if` contributes one entry to the stack: the flag value, inverted by
//! `else`. Directives run only while every entry is true, so a branch nested in
//! a suppressed block stays suppressed whatever its own flag says.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalState {
    condition_stack: Vec<bool>,
    skip_until_endif: bool,
    in_conditional_block: bool,
}

impl ConditionalState {
    pub fn new() -> Self {
        Self::default()
    }

    fn recompute(&mut self) {
        self.skip_until_endif = !self.condition_stack.iter().all(|c| *c);
        self.in_conditional_block = !self.condition_stack.is_empty();
    }

    /// `if <flag>` evaluated to `value`
    pub fn enter_if(&mut self, value: bool) {
        self.condition_stack.push(value);
        self.recompute();
    }

    /// `else`: switch the innermost block to its other branch
    pub fn enter_else(&mut self) -> Result<()> {
        let top = self
            .condition_stack
            .last_mut()
            .ok_or_else(|| Error::ConditionalMismatch {
                directive: "else".to_string(),
            })?;
        *top = !*top;
        self.recompute();
        Ok(())
    }

    /// `endif`: close the innermost block
    pub fn exit_if(&mut self) -> Result<()> {
        self.condition_stack
            .pop()
            .ok_or_else(|| Error::ConditionalMismatch {
                directive: "endif".to_string(),
            })?;
        self.recompute();
        Ok(())
    }

    /// Whether non-control directives are currently skipped
    pub fn is_suppressed(&self) -> bool {
        self.skip_until_endif
    }

    pub fn in_conditional_block(&self) -> bool {
        self.in_conditional_block
    }

    pub fn depth(&self) -> usize {
        self.condition_stack.len()
    }
}
