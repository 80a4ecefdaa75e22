use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::protocol::Marker;

/// Lifecycle of one candidate thread, as reported by timing markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadSpan {
    Interval {
        thread_id: u64,
        start_us: u64,
        end_us: u64,
    },
    Elapsed {
        thread_id: u64,
        elapsed_us: u64,
    },
}

/// Per-thread timing reconstructed from stdout. Informational only; grading
/// never looks at it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ThreadTimeline {
    spans: Vec<ThreadSpan>,
}

impl ThreadTimeline {
    /// Builds the timeline from markers in emission order.
    ///
    /// Start/end pairs are matched by thread id and listed in the order the
    /// threads started; a start without an end (the thread was never joined
    /// or the run was killed) is left out. Elapsed markers are listed in the
    /// order they were emitted.
    pub fn from_markers(markers: &[Marker]) -> Self {
        let mut started: Vec<(u64, u64)> = Vec::new();
        let mut ended: HashMap<u64, u64> = HashMap::new();
        let mut spans = Vec::new();

        for marker in markers {
            match *marker {
                Marker::ThreadStart { thread_id, micros } => {
                    if started.iter().all(|&(id, _)| id != thread_id) {
                        started.push((thread_id, micros));
                    }
                }
                Marker::ThreadEnd { thread_id, micros } => {
                    ended.entry(thread_id).or_insert(micros);
                }
                Marker::ThreadElapsed { thread_id, micros } => spans.push(ThreadSpan::Elapsed {
                    thread_id,
                    elapsed_us: micros,
                }),
                Marker::Count { .. } => {}
            }
        }

        let intervals = started.into_iter().filter_map(|(thread_id, start_us)| {
            let end_us = *ended.get(&thread_id)?;
            Some(ThreadSpan::Interval {
                thread_id,
                start_us,
                end_us,
            })
        });

        let mut all: Vec<ThreadSpan> = intervals.collect();
        all.append(&mut spans);
        Self { spans: all }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Shifts every interval so the earliest start is 0
    pub fn normalized(&self) -> Self {
        let origin = self
            .spans
            .iter()
            .filter_map(|span| match *span {
                ThreadSpan::Interval { start_us, .. } => Some(start_us),
                ThreadSpan::Elapsed { .. } => None,
            })
            .min()
            .unwrap_or(0);

        let spans = self
            .spans
            .iter()
            .map(|span| match *span {
                ThreadSpan::Interval {
                    thread_id,
                    start_us,
                    end_us,
                } => ThreadSpan::Interval {
                    thread_id,
                    start_us: start_us - origin,
                    end_us: end_us.saturating_sub(origin),
                },
                elapsed => elapsed,
            })
            .collect();

        Self { spans }
    }
}

/// `id:start-end` or `id:elapsed`, joined by `|`
impl fmt::Display for ThreadTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            match *span {
                ThreadSpan::Interval {
                    thread_id,
                    start_us,
                    end_us,
                } => write!(f, "{thread_id}:{start_us}-{end_us}")?,
                ThreadSpan::Elapsed {
                    thread_id,
                    elapsed_us,
                } => write!(f, "{thread_id}:{elapsed_us}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intervals_follow_start_order() {
        let stdout = "AASP_STARTED_THREAD_1_0000000000000100\
                      AASP_STARTED_THREAD_2_0000000000000150\
                      AASP_ENDED_THREAD_2_0000000000000400\
                      AASP_ENDED_THREAD_1_0000000000000500";
        let timeline = ThreadTimeline::from_markers(&protocol::markers(stdout));
        assert_eq!(
            serde_json::to_value(&timeline).unwrap(),
            serde_json::json!([
                { "kind": "interval", "thread_id": 1, "start_us": 100, "end_us": 500 },
                { "kind": "interval", "thread_id": 2, "start_us": 150, "end_us": 400 },
            ])
        );
        assert_eq!(timeline.to_string(), "1:100-500|2:150-400");
        assert_eq!(timeline.normalized().to_string(), "1:0-400|2:50-300");
    }

    #[test]
    fn test_unjoined_thread_is_omitted() {
        let markers = [
            Marker::ThreadStart {
                thread_id: 1,
                micros: 10,
            },
            Marker::ThreadStart {
                thread_id: 2,
                micros: 20,
            },
            Marker::ThreadEnd {
                thread_id: 1,
                micros: 30,
            },
        ];
        let timeline = ThreadTimeline::from_markers(&markers);
        assert_eq!(timeline.to_string(), "1:10-30");
    }

    #[test]
    fn test_elapsed_spans() {
        let markers = [
            Marker::Count {
                created: 1,
                sufficient: true,
            },
            Marker::ThreadElapsed {
                thread_id: 3,
                micros: 42,
            },
            Marker::ThreadElapsed {
                thread_id: 1,
                micros: 7,
            },
        ];
        let timeline = ThreadTimeline::from_markers(&markers);
        assert_eq!(timeline.to_string(), "3:42|1:7");
        assert_eq!(timeline.normalized(), timeline);
    }

    #[test]
    fn test_no_timing_markers() {
        let timeline = ThreadTimeline::from_markers(&[Marker::BASELINE]);
        assert!(timeline.is_empty());
        assert_eq!(timeline.to_string(), "");
        assert_eq!(serde_json::to_value(&timeline).unwrap(), serde_json::json!([]));
    }
}
