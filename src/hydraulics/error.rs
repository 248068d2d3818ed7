//! Error types for network loading and hydraulic solving.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HydraulicsError {
    #[error("cannot read input file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input error at line {line}: {what}")]
    Input { line: usize, what: String },

    #[error("invalid network: {what}")]
    Network { what: String },

    #[error("invalid demand model: {what}")]
    InvalidDemandModel { what: String },

    #[error("system unbalanced at {time}: no convergence after {trials} trials")]
    Unbalanced { time: String, trials: usize },

    #[error("system ill-conditioned at {time}: {what}")]
    IllConditioned { time: String, what: String },
}

pub type HydraulicsResult<T> = Result<T, HydraulicsError>;

impl HydraulicsError {
    pub(crate) fn input(line: usize, what: impl Into<String>) -> Self {
        Self::Input {
            line,
            what: what.into(),
        }
    }

    pub(crate) fn network(what: impl Into<String>) -> Self {
        Self::Network { what: what.into() }
    }
}

/// Formats simulation seconds as `h:mm:ss` for messages.
pub fn clock_time(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::{clock_time, HydraulicsError};

    #[test]
    fn formats_clock_time() {
        assert_eq!(clock_time(0), "0:00:00");
        assert_eq!(clock_time(3_725), "1:02:05");
        assert_eq!(clock_time(90_000), "25:00:00");
    }

    #[test]
    fn input_error_names_line() {
        let error = HydraulicsError::input(12, "unknown node 'J9'");
        assert_eq!(
            error.to_string(),
            "input error at line 12: unknown node 'J9'"
        );
    }
}
