use crate::protocol::{self, Marker};
use crate::timeline::ThreadTimeline;
use crate::verdict::Verdict;

/// Race detector diagnostics, matched case-insensitively against stderr
const RACE_DIAGNOSTICS: [&str; 2] = ["data race", "threadsanitizer: race"];

/// What the sandbox reported for one instrumented run
#[derive(Debug, Clone, Copy)]
pub struct SandboxOutcome<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub baseline: Verdict,
    pub expected_stdout: &'a str,
    /// Live thread ceiling of the test case, including the main thread
    pub thread_ceiling: Option<u32>,
}

/// Concurrency facts recovered from a run, plus the revised verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Stdout with every marker removed
    pub stdout: String,
    pub verdict: Verdict,
    pub timeline: ThreadTimeline,
    /// Largest creation count seen in any marker
    pub threads_used: u64,
    /// Most candidate threads alive at once, when the run printed timing
    /// markers to track joins with
    pub peak_live_threads: Option<u64>,
    pub sufficient_threads: bool,
    pub output_matches: bool,
    pub race_detected: bool,
}

/// Recomputes the verdict of an instrumented run.
///
/// Total: missing or truncated markers degrade to zero threads used and an
/// insufficient run rather than an error.
pub fn interpret(outcome: &SandboxOutcome) -> Interpretation {
    let markers = protocol::markers(outcome.stdout);

    let mut sufficient_threads = false;
    let mut threads_used = 0;
    for marker in &markers {
        if let Marker::Count {
            created,
            sufficient,
        } = *marker
        {
            sufficient_threads |= sufficient;
            threads_used = threads_used.max(created);
        }
    }

    let peak_live_threads = peak_live_threads(&markers);
    let stdout = protocol::strip(outcome.stdout);
    let timeline = ThreadTimeline::from_markers(&markers);
    let output_matches = compare_output_standard(&stdout, outcome.expected_stdout);
    let race_detected = race_detected(outcome.stderr);

    let verdict = if race_detected {
        Verdict::DataRaceDetected
    } else {
        revise_verdict(
            outcome.baseline,
            output_matches,
            sufficient_threads,
            peak_live_threads,
            outcome.thread_ceiling,
        )
    };

    log::debug!(
        "Interpreted run: baseline {}, final {}, threads used {threads_used}, output matches {output_matches}",
        outcome.baseline.description(),
        verdict.description(),
    );

    Interpretation {
        stdout,
        verdict,
        timeline,
        threads_used,
        peak_live_threads,
        sufficient_threads,
        output_matches,
        race_detected,
    }
}

/// Replays creations and joins in emission order and returns the highest
/// number of threads created but not yet joined. `None` without any timing
/// marker, since joins are then invisible.
fn peak_live_threads(markers: &[Marker]) -> Option<u64> {
    let mut timed = false;
    let mut created = 0u64;
    let mut joined = 0u64;
    let mut peak = 0u64;

    for marker in markers {
        match *marker {
            Marker::Count { created: n, .. } => created = created.max(n),
            Marker::ThreadStart { .. } => timed = true,
            Marker::ThreadEnd { .. } | Marker::ThreadElapsed { .. } => {
                timed = true;
                joined += 1;
            }
        }
        peak = peak.max(created.saturating_sub(joined));
    }

    timed.then_some(peak)
}

/// Line-by-line comparison ignoring trailing whitespace on each line and at
/// the end of the output
pub fn compare_output_standard(program_output: &str, expected_output: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.lines()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    };

    normalize(program_output) == normalize(expected_output)
}

pub fn race_detected(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    RACE_DIAGNOSTICS.iter().any(|d| stderr.contains(d))
}

fn revise_verdict(
    baseline: Verdict,
    output_matches: bool,
    sufficient_threads: bool,
    peak_live_threads: Option<u64>,
    thread_ceiling: Option<u32>,
) -> Verdict {
    match baseline {
        // the sandbox compared output that still had markers in it, so its
        // accepted/wrong answer split is meaningless here
        Verdict::Accepted | Verdict::WrongAnswer => match (output_matches, sufficient_threads) {
            (true, true) => Verdict::Accepted,
            (true, false) => Verdict::InsufficientThreads,
            (false, _) => Verdict::WrongAnswer,
        },
        v if v.is_runtime_error() => match (peak_live_threads, thread_ceiling) {
            // the main thread takes one slot of the ceiling
            (Some(peak), Some(ceiling)) if peak + 1 >= u64::from(ceiling) => {
                Verdict::ExceededThreadsLimit
            }
            _ => v,
        },
        v => v,
    }
}
