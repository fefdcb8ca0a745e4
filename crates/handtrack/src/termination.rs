//! Defines the [`Termination`] trait.

use std::{convert::Infallible, fmt::Debug, process};

/// Extends [`std::process::Termination`] so that the GUI runner can decide on an exit code.
///
/// The event loop never returns control to `main`, so [`crate::run`] exits the process itself
/// after the application thread finishes, using [`Termination::is_success`] to pick the status.
pub trait Termination: process::Termination {
    fn is_success(&self) -> bool;

    /// Prints a failure report to *stderr*. Successful values print nothing.
    fn report_failure(self)
    where
        Self: Sized,
    {
        if !self.is_success() {
            // `process::Termination::report` prints the `Debug` representation of errors.
            let _ = process::Termination::report(self);
        }
    }
}

impl Termination for Infallible {
    fn is_success(&self) -> bool {
        match *self {}
    }
}

impl Termination for () {
    fn is_success(&self) -> bool {
        true
    }
}

impl<T: Termination, E: Debug> Termination for Result<T, E> {
    fn is_success(&self) -> bool {
        match self {
            Ok(term) => term.is_success(),
            Err(_) => false,
        }
    }
}
