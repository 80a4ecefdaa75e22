use std::collections::HashMap;

use crate::protocol::{FieldKind, INSUFFICIENT, MICROS_WIDTH, Marker, MarkerKind, SUFFICIENT, Segment};

use super::{
    FieldExprs, InstrumentOptions, SourceGenerator, TimingMode, apply_template, c_string_literal,
};

/// `std::thread` based instrumentation.
///
/// `createThread(f, args...)` returns the new `std::thread`;
/// `joinThread(t)` joins it.
pub struct CppGenerator;

const COUNTER_STATE: &str = r#"#include <chrono>
#include <iostream>
#include <map>
#include <mutex>
#include <string>
#include <thread>
#include <utility>

static std::mutex aasp_create_mtx;
static unsigned long long aasp_threads_created = 0;
"#;

const TIMING_STATE: &str = r#"static std::mutex aasp_join_mtx;
static std::map<std::thread::id, std::pair<unsigned long long, unsigned long long>> aasp_live_threads;

static unsigned long long aasp_now_us() {
    return static_cast<unsigned long long>(
        std::chrono::duration_cast<std::chrono::microseconds>(
            std::chrono::steady_clock::now().time_since_epoch())
            .count());
}

static std::string aasp_pad_micros(unsigned long long value) {
    std::string digits = std::to_string(value);
    if (digits.size() < %MICROS_WIDTH%) {
        digits.insert(0, %MICROS_WIDTH% - digits.size(), '0');
    }
    return digits;
}
"#;

const BASELINE: &str = r#"
static void aasp_report_baseline() {
    std::lock_guard<std::mutex> aasp_lock(aasp_create_mtx);
    std::cout << %BASELINE% << std::flush;
}
"#;

const CREATE: &str = r#"
template <typename Function, typename... Args>
std::thread createThread(Function&& func, Args&&... args) {
    std::lock_guard<std::mutex> aasp_lock(aasp_create_mtx);
%BEFORE_CREATE%    std::thread aasp_thread(std::forward<Function>(func), std::forward<Args>(args)...);
    aasp_threads_created++;
    const char* aasp_sufficiency = aasp_threads_created >= %MIN_THREADS%ULL ? %SUFFICIENT% : %INSUFFICIENT%;
    %EMIT_COUNT%
%AFTER_CREATE%    std::cout << std::flush;
    return aasp_thread;
}
"#;

const RECORD_START: &str = r#"    unsigned long long aasp_id = aasp_threads_created;
    aasp_live_threads[aasp_thread.get_id()] = std::make_pair(aasp_id, aasp_start);
"#;

const JOIN_PLAIN: &str = r#"
void joinThread(std::thread& thread) {
    thread.join();
}
"#;

const JOIN_TIMED: &str = r#"
void joinThread(std::thread& thread) {
    unsigned long long aasp_id = 0;
    unsigned long long aasp_start = 0;
    {
        std::lock_guard<std::mutex> aasp_lock(aasp_create_mtx);
        auto aasp_found = aasp_live_threads.find(thread.get_id());
        if (aasp_found != aasp_live_threads.end()) {
            aasp_id = aasp_found->second.first;
            aasp_start = aasp_found->second.second;
            aasp_live_threads.erase(aasp_found);
        }
    }
    thread.join();
    unsigned long long aasp_end = aasp_now_us();
    std::lock_guard<std::mutex> aasp_lock(aasp_join_mtx);
    if (aasp_id != 0) {
        %EMIT_JOIN%
        std::cout << std::flush;
    }
    (void) aasp_start;
}
"#;

impl SourceGenerator for CppGenerator {
    fn compiler_options(&self) -> &'static str {
        "-pthread -fsanitize=thread"
    }

    fn emit_marker(&self, kind: MarkerKind, fields: &FieldExprs) -> String {
        // one string, one write: keeps a marker from being split by other threads' output
        let mut parts = vec!["std::string()".to_string()];

        for segment in kind.template() {
            let part = match segment {
                Segment::Literal(text) => c_string_literal(&text),
                Segment::Field(FieldKind::Count) => format!("std::to_string({})", fields.count),
                Segment::Field(FieldKind::Sufficiency) => fields.sufficiency.to_string(),
                Segment::Field(FieldKind::ThreadId) => {
                    format!("std::to_string({})", fields.thread_id)
                }
                Segment::Field(FieldKind::Micros) => format!("aasp_pad_micros({})", fields.micros),
            };
            parts.push(part);
        }

        format!("std::cout << ({});", parts.join(" + "))
    }

    fn preamble(&self, options: &InstrumentOptions) -> String {
        let timed = options.timing != TimingMode::None;

        let mut mapping = HashMap::<&str, String>::new();
        mapping.insert("%MICROS_WIDTH%", MICROS_WIDTH.to_string());
        mapping.insert("%MIN_THREADS%", options.min_threads.to_string());
        mapping.insert("%SUFFICIENT%", c_string_literal(SUFFICIENT));
        mapping.insert("%INSUFFICIENT%", c_string_literal(INSUFFICIENT));
        mapping.insert("%BASELINE%", c_string_literal(&Marker::BASELINE.to_string()));
        mapping.insert(
            "%EMIT_COUNT%",
            self.emit_marker(
                MarkerKind::Count,
                &FieldExprs::count("aasp_threads_created", "aasp_sufficiency"),
            ),
        );
        mapping.insert(
            "%BEFORE_CREATE%",
            if timed {
                "    unsigned long long aasp_start = aasp_now_us();\n".to_string()
            } else {
                String::new()
            },
        );

        let after_create = match options.timing {
            TimingMode::None => String::new(),
            TimingMode::Elapsed => RECORD_START.to_string(),
            TimingMode::StartEnd => format!(
                "{RECORD_START}    {}\n",
                self.emit_marker(
                    MarkerKind::Started,
                    &FieldExprs::thread("aasp_id", "aasp_start")
                )
            ),
        };
        mapping.insert("%AFTER_CREATE%", after_create);

        let emit_join = match options.timing {
            TimingMode::Elapsed => self.emit_marker(
                MarkerKind::Elapsed,
                &FieldExprs::thread("aasp_id", "aasp_end - aasp_start"),
            ),
            _ => self.emit_marker(
                MarkerKind::Ended,
                &FieldExprs::thread("aasp_id", "aasp_end"),
            ),
        };
        mapping.insert("%EMIT_JOIN%", emit_join);

        let mut preamble = String::from(COUNTER_STATE);
        if timed {
            preamble.push_str(TIMING_STATE);
        }
        preamble.push_str(BASELINE);
        preamble.push_str(CREATE);
        preamble.push_str(if timed { JOIN_TIMED } else { JOIN_PLAIN });

        apply_template(&preamble, &mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{Language, instrument};

    fn options(timing: TimingMode) -> InstrumentOptions {
        InstrumentOptions {
            min_threads: 4,
            max_threads: 10,
            timing,
        }
    }

    #[test]
    fn test_marker_is_built_as_one_string() {
        let statement = CppGenerator.emit_marker(
            MarkerKind::Ended,
            &FieldExprs::thread("id", "end"),
        );
        assert_eq!(
            statement,
            r#"std::cout << (std::string() + "AASP_ENDED_THREAD_" + std::to_string(id) + "_" + aasp_pad_micros(end));"#
        );
    }

    #[test]
    fn test_preamble_wraps_std_thread() {
        let preamble = CppGenerator.preamble(&options(TimingMode::StartEnd));
        assert!(preamble.contains("std::thread createThread(Function&& func, Args&&... args)"));
        assert!(preamble.contains("void joinThread(std::thread& thread)"));
        assert!(preamble.contains("aasp_threads_created >= 4ULL"));
        assert!(preamble.contains("if (digits.size() < 16)"));
        assert!(preamble.contains(r#"std::cout << "AASP_0_THREADS_CREATED_INSUFFICIENT" << std::flush;"#));
        assert!(preamble.contains("AASP_STARTED_THREAD_"));
        assert!(!preamble.contains('%'));
    }

    #[test]
    fn test_plain_mode_has_no_timing_state() {
        let preamble = CppGenerator.preamble(&options(TimingMode::None));
        assert!(!preamble.contains("aasp_live_threads"));
        assert!(!preamble.contains("aasp_now_us"));
        assert!(preamble.contains("thread.join();"));
    }

    #[test]
    fn test_join_releases_entry_before_joining() {
        for timing in [TimingMode::StartEnd, TimingMode::Elapsed] {
            let preamble = CppGenerator.preamble(&options(timing));
            let (_, join) = preamble.split_once("void joinThread(").unwrap();
            let lookup = join.find("aasp_live_threads.find(thread.get_id())").unwrap();
            let release = join.find("aasp_live_threads.erase(aasp_found);").unwrap();
            let real_join = join.find("thread.join();").unwrap();
            let end = join.find("aasp_end = aasp_now_us()").unwrap();
            assert!(lookup < release);
            assert!(release < real_join);
            assert!(real_join < end);
        }
    }

    #[test]
    fn test_candidate_code_follows_preamble() {
        let candidate = "#include <bits/stdc++.h>\nint main() {\n    auto t = createThread([] {});\n    joinThread(t);\n}\n";
        let program = instrument(candidate, Language::Cpp, &options(TimingMode::Elapsed));
        assert!(program.baseline_injected());
        let (preamble, body) = program.source().split_once("#include <bits/stdc++.h>").unwrap();
        assert!(preamble.contains("AASP_ELAPSED_THREAD_"));
        assert!(body.contains("int main() {\n    aasp_report_baseline();\n    auto t"));
    }
}
