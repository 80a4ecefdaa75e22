use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Status of one graded test case.
///
/// Codes 1 to 14 are the execution sandbox's own statuses; the remaining
/// ones are only ever assigned by the result interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    InQueue,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompilationError,
    RuntimeErrorSigsegv,
    RuntimeErrorSigxfsz,
    RuntimeErrorSigfpe,
    RuntimeErrorSigabrt,
    RuntimeErrorNzec,
    RuntimeErrorOther,
    InternalError,
    ExecFormatError,
    InsufficientThreads,
    DataRaceDetected,
    ExceededThreadsLimit,
}

impl Verdict {
    pub fn from_id(id: u32) -> Option<Self> {
        let verdict = match id {
            1 => Self::InQueue,
            2 => Self::Processing,
            3 => Self::Accepted,
            4 => Self::WrongAnswer,
            5 => Self::TimeLimitExceeded,
            6 => Self::CompilationError,
            7 => Self::RuntimeErrorSigsegv,
            8 => Self::RuntimeErrorSigxfsz,
            9 => Self::RuntimeErrorSigfpe,
            10 => Self::RuntimeErrorSigabrt,
            11 => Self::RuntimeErrorNzec,
            12 => Self::RuntimeErrorOther,
            13 => Self::InternalError,
            14 => Self::ExecFormatError,
            15 => Self::InsufficientThreads,
            16 => Self::DataRaceDetected,
            17 => Self::ExceededThreadsLimit,
            _ => return None,
        };
        Some(verdict)
    }

    pub fn id(self) -> u32 {
        match self {
            Self::InQueue => 1,
            Self::Processing => 2,
            Self::Accepted => 3,
            Self::WrongAnswer => 4,
            Self::TimeLimitExceeded => 5,
            Self::CompilationError => 6,
            Self::RuntimeErrorSigsegv => 7,
            Self::RuntimeErrorSigxfsz => 8,
            Self::RuntimeErrorSigfpe => 9,
            Self::RuntimeErrorSigabrt => 10,
            Self::RuntimeErrorNzec => 11,
            Self::RuntimeErrorOther => 12,
            Self::InternalError => 13,
            Self::ExecFormatError => 14,
            Self::InsufficientThreads => 15,
            Self::DataRaceDetected => 16,
            Self::ExceededThreadsLimit => 17,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InQueue => "In Queue",
            Self::Processing => "Processing",
            Self::Accepted => "Accepted",
            Self::WrongAnswer => "Wrong Answer",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::CompilationError => "Compilation Error",
            Self::RuntimeErrorSigsegv => "Runtime Error (SIGSEGV)",
            Self::RuntimeErrorSigxfsz => "Runtime Error (SIGXFSZ)",
            Self::RuntimeErrorSigfpe => "Runtime Error (SIGFPE)",
            Self::RuntimeErrorSigabrt => "Runtime Error (SIGABRT)",
            Self::RuntimeErrorNzec => "Runtime Error (NZEC)",
            Self::RuntimeErrorOther => "Runtime Error (Other)",
            Self::InternalError => "Internal Error",
            Self::ExecFormatError => "Exec Format Error",
            Self::InsufficientThreads => "Insufficient Threads Used",
            Self::DataRaceDetected => "Data Race Detected",
            Self::ExceededThreadsLimit => "Exceeded Threads Limit",
        }
    }

    /// Still queued or running inside the sandbox
    pub fn is_pending(self) -> bool {
        matches!(self, Self::InQueue | Self::Processing)
    }

    pub fn is_runtime_error(self) -> bool {
        (7..=12).contains(&self.id())
    }

    /// Any finished status other than Accepted
    pub fn is_failure(self) -> bool {
        self.id() >= 4
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Verdict", 2)?;
        state.serialize_field("id", &self.id())?;
        state.serialize_field("description", self.description())?;
        state.end()
    }
}
