//! Conditional state
//!
//! Tracks whether output is currently suppressed. Two modes are supported:
//!
//! - [`ConditionalMode::Flat`]: a single flag for the whole pass. Nested
//!   `#if` blocks share it, so an inner `#endif` re-enables output even
//!   inside a suppressed outer block.
//! - [`ConditionalMode::Nested`]: one frame per open block; `#endif` closes
//!   exactly one level and mismatched directives are errors.

pub mod expr;

pub use expr::{EvalResult, Evaluator};

use dpp_core::{ConditionalMode, Error, Result};

/// State of one open conditional block (nested mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Current branch is emitting
    Active,
    /// No branch taken yet
    Pending,
    /// A branch was already taken, or the enclosing block is suppressed
    Done,
}

/// Suppression state for one preprocessing pass
#[derive(Debug, Clone)]
pub struct ConditionalState {
    mode: ConditionalMode,
    suppressed: bool,
    frames: Vec<Frame>,
}

impl ConditionalState {
    pub fn new(mode: ConditionalMode) -> Self {
        Self {
            mode,
            suppressed: false,
            frames: Vec::new(),
        }
    }

    pub fn mode(&self) -> ConditionalMode {
        self.mode
    }

    /// Whether tokens are currently dropped
    pub fn is_suppressed(&self) -> bool {
        match self.mode {
            ConditionalMode::Flat => self.suppressed,
            ConditionalMode::Nested => self.frames.iter().any(|f| *f != Frame::Active),
        }
    }

    /// Number of open blocks (always 0 in flat mode)
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// `#if`, `#ifdef`, `#ifndef`
    ///
    /// In nested mode the condition is not evaluated inside a suppressed block.
    pub fn enter(&mut self, condition: impl FnOnce() -> bool) {
        match self.mode {
            ConditionalMode::Flat => self.suppressed = !condition(),
            ConditionalMode::Nested => {
                let frame = if self.is_suppressed() {
                    Frame::Done
                } else if condition() {
                    Frame::Active
                } else {
                    Frame::Pending
                };
                self.frames.push(frame);
            }
        }
    }

    /// Whether an `#elif` here would evaluate its condition
    pub fn elif_evaluates(&self) -> bool {
        match self.mode {
            ConditionalMode::Flat => self.suppressed,
            ConditionalMode::Nested => self.frames.last() == Some(&Frame::Pending),
        }
    }

    /// `#elif`: close a taken branch, or try this one if none was taken yet
    pub fn elif(&mut self, condition: impl FnOnce() -> bool) -> Result<()> {
        match self.mode {
            ConditionalMode::Flat => {
                if self.suppressed {
                    self.suppressed = !condition();
                } else {
                    self.suppressed = true;
                }
                Ok(())
            }
            ConditionalMode::Nested => {
                let frame = self.top_mut("elif")?;
                match *frame {
                    Frame::Active => *frame = Frame::Done,
                    Frame::Pending => {
                        if condition() {
                            *frame = Frame::Active;
                        }
                    }
                    Frame::Done => {}
                }
                Ok(())
            }
        }
    }

    /// `#else`
    pub fn else_branch(&mut self) -> Result<()> {
        match self.mode {
            ConditionalMode::Flat => {
                self.suppressed = !self.suppressed;
                Ok(())
            }
            ConditionalMode::Nested => {
                let frame = self.top_mut("else")?;
                *frame = match *frame {
                    Frame::Pending => Frame::Active,
                    Frame::Active | Frame::Done => Frame::Done,
                };
                Ok(())
            }
        }
    }

    /// `#endif`
    pub fn endif(&mut self) -> Result<()> {
        match self.mode {
            ConditionalMode::Flat => {
                self.suppressed = false;
                Ok(())
            }
            ConditionalMode::Nested => self.frames.pop().map(|_| ()).ok_or_else(|| Error::Unbalanced {
                directive: "endif".to_string(),
            }),
        }
    }

    /// Check that every block was closed at the end of a pass
    pub fn finish(&self) -> Result<()> {
        if self.frames.is_empty() {
            Ok(())
        } else {
            Err(Error::Unterminated {
                depth: self.frames.len(),
            })
        }
    }

    /// Forget all state (start of a pass)
    pub fn reset(&mut self) {
        self.suppressed = false;
        self.frames.clear();
    }

    fn top_mut(&mut self, directive: &str) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| Error::Unbalanced {
            directive: directive.to_string(),
        })
    }
}

impl Default for ConditionalState {
    fn default() -> Self {
        Self::new(ConditionalMode::Flat)
    }
}
