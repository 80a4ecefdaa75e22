use serde::{Deserialize, Serialize};

use crate::config::{ByteSize, MicroSecond};
use crate::error::GradeError;

/// One test case of a concurrency question
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConcurrencyTestCase {
    /// Threads that must be created for the run to count as concurrent
    pub min_threads: u32,
    /// Ceiling on live threads/processes enforced by the sandbox
    pub max_threads: u32,
    #[serde(default)]
    pub stdin: String,
    pub expected_stdout: String,
    pub time_limit: Option<MicroSecond>,
    pub memory_limit: Option<ByteSize>,
}

impl ConcurrencyTestCase {
    pub fn validate(&self) -> Result<(), GradeError> {
        if self.min_threads > self.max_threads {
            return Err(GradeError::InvalidTestCase(format!(
                "min_threads ({}) exceeds max_threads ({})",
                self.min_threads, self.max_threads
            )));
        }
        if self.max_threads == 0 {
            return Err(GradeError::InvalidTestCase(
                "max_threads must allow at least the main thread".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(min_threads: u32, max_threads: u32) -> ConcurrencyTestCase {
        ConcurrencyTestCase {
            min_threads,
            max_threads,
            stdin: String::new(),
            expected_stdout: String::new(),
            time_limit: None,
            memory_limit: None,
        }
    }

    #[test]
    fn test_validate_bounds() {
        assert!(case(0, 4).validate().is_ok());
        assert!(case(4, 4).validate().is_ok());
        assert!(matches!(
            case(5, 4).validate(),
            Err(GradeError::InvalidTestCase(_))
        ));
        assert!(matches!(
            case(0, 0).validate(),
            Err(GradeError::InvalidTestCase(_))
        ));
    }
}
