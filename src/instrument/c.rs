use std::collections::HashMap;

use crate::protocol::{FieldKind, INSUFFICIENT, MICROS_WIDTH, Marker, MarkerKind, SUFFICIENT, Segment};

use super::{
    FieldExprs, InstrumentOptions, SourceGenerator, TimingMode, apply_template, c_string_literal,
};

/// pthreads based instrumentation.
///
/// Candidates call `createThread`/`joinThread`, which take the same
/// arguments as `pthread_create`/`pthread_join`.
pub struct CGenerator;

const COUNTER_STATE: &str = r#"#include <pthread.h>
#include <stdio.h>
#include <time.h>

static pthread_mutex_t aasp_create_mtx = PTHREAD_MUTEX_INITIALIZER;
static unsigned long long aasp_threads_created = 0;
"#;

const TIMING_STATE: &str = r#"static pthread_mutex_t aasp_join_mtx = PTHREAD_MUTEX_INITIALIZER;

#define AASP_SLOTS %SLOTS%
struct aasp_slot {
    pthread_t handle;
    unsigned long long id;
    unsigned long long start;
    int live;
};
static struct aasp_slot aasp_slots[AASP_SLOTS];

static unsigned long long aasp_now_us(void) {
    struct timespec ts;
    clock_gettime(CLOCK_MONOTONIC, &ts);
    return (unsigned long long) ts.tv_sec * 1000000ULL + (unsigned long long) ts.tv_nsec / 1000ULL;
}
"#;

const BASELINE: &str = r#"
static void aasp_report_baseline(void) {
    pthread_mutex_lock(&aasp_create_mtx);
    %EMIT_BASELINE%
    fflush(stdout);
    pthread_mutex_unlock(&aasp_create_mtx);
}
"#;

const CREATE: &str = r#"
int createThread(pthread_t *thread, const pthread_attr_t *attr, void *(*start_routine)(void *), void *arg) {
    pthread_mutex_lock(&aasp_create_mtx);
%BEFORE_CREATE%    int aasp_rc = pthread_create(thread, attr, start_routine, arg);
    if (aasp_rc == 0) {
        aasp_threads_created++;
        const char *aasp_sufficiency = aasp_threads_created >= %MIN_THREADS%ULL ? %SUFFICIENT% : %INSUFFICIENT%;
        %EMIT_COUNT%
%AFTER_CREATE%        fflush(stdout);
    }
    pthread_mutex_unlock(&aasp_create_mtx);
    return aasp_rc;
}
"#;

const RECORD_START: &str = r#"        unsigned long long aasp_id = aasp_threads_created;
        for (int aasp_i = 0; aasp_i < AASP_SLOTS; aasp_i++) {
            if (!aasp_slots[aasp_i].live) {
                aasp_slots[aasp_i].handle = *thread;
                aasp_slots[aasp_i].id = aasp_id;
                aasp_slots[aasp_i].start = aasp_start;
                aasp_slots[aasp_i].live = 1;
                break;
            }
        }
"#;

const JOIN_PLAIN: &str = r#"
int joinThread(pthread_t thread, void **retval) {
    return pthread_join(thread, retval);
}
"#;

const JOIN_TIMED: &str = r#"
int joinThread(pthread_t thread, void **retval) {
    unsigned long long aasp_id = 0;
    unsigned long long aasp_start = 0;
    pthread_mutex_lock(&aasp_create_mtx);
    for (int aasp_i = 0; aasp_i < AASP_SLOTS; aasp_i++) {
        if (aasp_slots[aasp_i].live && pthread_equal(aasp_slots[aasp_i].handle, thread)) {
            aasp_id = aasp_slots[aasp_i].id;
            aasp_start = aasp_slots[aasp_i].start;
            aasp_slots[aasp_i].live = 0;
            break;
        }
    }
    pthread_mutex_unlock(&aasp_create_mtx);
    int aasp_rc = pthread_join(thread, retval);
    if (aasp_rc != 0) {
        return aasp_rc;
    }
    unsigned long long aasp_end = aasp_now_us();
    pthread_mutex_lock(&aasp_join_mtx);
    if (aasp_id != 0) {
        %EMIT_JOIN%
        fflush(stdout);
    }
    pthread_mutex_unlock(&aasp_join_mtx);
    (void) aasp_start;
    return aasp_rc;
}
"#;

impl SourceGenerator for CGenerator {
    fn compiler_options(&self) -> &'static str {
        "-pthread -fsanitize=thread"
    }

    fn emit_marker(&self, kind: MarkerKind, fields: &FieldExprs) -> String {
        let mut format = String::new();
        let mut args = Vec::new();

        for segment in kind.template() {
            match segment {
                Segment::Literal(text) => format.push_str(&text.replace('%', "%%")),
                Segment::Field(FieldKind::Count) => {
                    format.push_str("%llu");
                    args.push(format!("(unsigned long long) ({})", fields.count));
                }
                Segment::Field(FieldKind::Sufficiency) => {
                    format.push_str("%s");
                    args.push(fields.sufficiency.to_string());
                }
                Segment::Field(FieldKind::ThreadId) => {
                    format.push_str("%llu");
                    args.push(format!("(unsigned long long) ({})", fields.thread_id));
                }
                Segment::Field(FieldKind::Micros) => {
                    format.push_str(&format!("%0{MICROS_WIDTH}llu"));
                    args.push(format!("(unsigned long long) ({})", fields.micros));
                }
            }
        }

        format!("printf({}, {});", c_string_literal(&format), args.join(", "))
    }

    fn preamble(&self, options: &InstrumentOptions) -> String {
        let timed = options.timing != TimingMode::None;
        let baseline = Marker::BASELINE.to_string();

        let mut mapping = HashMap::<&str, String>::new();
        mapping.insert("%SLOTS%", (options.max_threads as u64 + 1).to_string());
        mapping.insert("%MIN_THREADS%", options.min_threads.to_string());
        mapping.insert("%SUFFICIENT%", c_string_literal(SUFFICIENT));
        mapping.insert("%INSUFFICIENT%", c_string_literal(INSUFFICIENT));
        mapping.insert(
            "%EMIT_BASELINE%",
            format!("fputs({}, stdout);", c_string_literal(&baseline)),
        );
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
                "{RECORD_START}        {}\n",
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
