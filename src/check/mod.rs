//! Completion and precondition gates
//!
//! Both gates are path templates rendered with the instance binding and
//! matched against the filesystem. A gate holds when at least one path
//! matches. Completion is decided first, so a finished job is never
//! reported as blocked.
//!
//! Only the template's own wildcards act as globs: substituted values are
//! escaped, so a value like `run[1]` names the literal path.

use std::io;

use slurmer_sweep::{render_with, Binding, PathLister, TemplateError};

use crate::job::SkipReason;

/// Gate evaluation errors
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("cannot check '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: io::Error,
    },
}

/// Decides whether an instance is done or blocked.
pub struct CompletionChecker<'a> {
    lister: &'a dyn PathLister,
}

impl<'a> CompletionChecker<'a> {
    pub fn new(lister: &'a dyn PathLister) -> Self {
        Self { lister }
    }

    /// Skip reason from the gates alone (never `AlreadyRunning`).
    pub fn check_state(
        &self,
        precondition: Option<&str>,
        completion: Option<&str>,
        binding: &Binding,
    ) -> Result<SkipReason, CheckError> {
        if let Some(template) = completion {
            if self.matches(template, binding)? {
                return Ok(SkipReason::AlreadyComplete);
            }
        }

        if let Some(template) = precondition {
            if !self.matches(template, binding)? {
                return Ok(SkipReason::PreconditionUnmet);
            }
        }

        Ok(SkipReason::None)
    }

    fn matches(&self, template: &str, binding: &Binding) -> Result<bool, CheckError> {
        let pattern = render_with(template, binding, globset::escape)?;
        let found = self
            .lister
            .list(&pattern, None)
            .map_err(|source| CheckError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        log::trace!("{} matched {} path(s)", pattern, found.len());
        Ok(!found.is_empty())
    }
}
