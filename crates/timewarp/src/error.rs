// Copyright (c) The Timewarp Project Authors.
// Licensed under the MIT License.

use std::borrow::Cow;

/// The result for fallible operations that use the [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while configuring or driving the engine.
///
/// Covers invalid or contradictory configuration, values that do not fit
/// the chosen resolution's integer range, and run handles that no longer
/// match the configured run. Terminal run conditions are *not* errors of
/// this type; see [`TerminalError`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// The concrete kind of an [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Invalid or mutually inconsistent settings, rejected at configuration
    /// time and never recovered automatically.
    #[error("{0}")]
    Config(Cow<'static, str>),

    /// A duration or instant does not fit the integer range of the chosen
    /// resolution. Surfaced at the point of conversion, never silently
    /// truncated.
    #[error("{0}")]
    OutOfRange(Cow<'static, str>),

    /// The run handle belongs to a configuration that has since been
    /// replaced.
    #[error("the run handle for run {expected} is stale; run {actual} is configured")]
    StaleRun {
        /// The run the handle was issued for.
        expected: u64,
        /// The run currently configured.
        actual: u64,
    },
}

impl Error {
    pub(crate) fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::Config(message.into()))
    }

    pub(crate) fn out_of_range(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::OutOfRange(message.into()))
    }

    pub(crate) const fn stale_run(expected: u64, actual: u64) -> Self {
        Self(ErrorKind::StaleRun { expected, actual })
    }

    #[cfg(test)]
    pub(crate) const fn kind(&self) -> &ErrorKind {
        &self.0
    }
}

/// A terminal condition delivered into every currently-suspended unit of
/// work when one of the run guards fires.
///
/// These are never returned from [`Governor::activate`][crate::Governor::activate];
/// they are injected through the scheduler exactly as a cancellation would
/// be, so ordinary cleanup paths still run. The two kinds are distinct so
/// callers can tell "ran out of virtual time" from "nothing happened in
/// real time".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TerminalError {
    /// The loop's clock reached its configured end-of-time.
    #[error("the loop has reached its end-of-time; all waiting work is timed out")]
    EndOfTime,

    /// The loop idled too long in real time with no external activity.
    #[error("the loop idled too long with no external activity; all waiting work is timed out")]
    IdleTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync);
        static_assertions::assert_impl_all!(TerminalError: Send, Sync);
    }

    #[test]
    fn config_error() {
        let error = Error::config("bad setting");
        assert!(matches!(error.kind(), ErrorKind::Config(_)));
        assert_eq!(error.to_string(), "bad setting");
    }

    #[test]
    fn out_of_range_error() {
        let error = Error::out_of_range("too far");
        assert!(matches!(error.kind(), ErrorKind::OutOfRange(_)));
        assert_eq!(error.to_string(), "too far");
    }

    #[test]
    fn stale_run_error() {
        let error = Error::stale_run(1, 3);
        assert_eq!(
            error.to_string(),
            "the run handle for run 1 is stale; run 3 is configured"
        );
    }

    #[test]
    fn terminal_kinds_are_distinct() {
        assert_ne!(TerminalError::EndOfTime, TerminalError::IdleTimeout);
    }
}
