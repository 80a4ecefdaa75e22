use crate::case::ConcurrencyTestCase;
use crate::config::Second;
use crate::instrument::InstrumentedProgram;
use crate::sandbox::SubmissionRequest;

/// Assembles the sandbox request for an instrumented program. Runs nothing.
pub fn prepare_submission(
    program: &InstrumentedProgram,
    language_id: u32,
    case: &ConcurrencyTestCase,
) -> SubmissionRequest {
    let generator = program.language().generator();

    SubmissionRequest {
        source_code: program.source().to_string(),
        language_id,
        stdin: case.stdin.clone(),
        expected_output: Some(case.expected_stdout.clone()),
        compiler_options: Some(generator.compiler_options().to_string()),
        cpu_time_limit: case.time_limit.map(|t| Second::from(t).0),
        memory_limit: case.memory_limit.map(|m| m.kilobytes()),
        max_processes_and_or_threads: Some(case.max_threads),
        enable_per_process_and_thread_time_limit: Some(true),
    }
}
