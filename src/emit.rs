//! scollector-style emission: newline-delimited JSON records on a sink.
//!
//! Two record shapes share the stream: `Metasend` (out-of-band metric
//! metadata, at most once per metric name and kind per run) and
//! `DataPoint` (one sample). By convention a metric's metadata lands
//! before its first data point. Diagnostics go to tracing, never to the
//! sink.

use crate::metrics;
use crate::sanitize::sanitize_tag_value;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;

/// One time-series sample.
#[derive(Debug, Serialize)]
pub struct DataPoint<'a> {
    pub metric: &'a str,
    pub timestamp: i64,
    pub value: serde_json::Value,
    pub tags: &'a BTreeMap<String, String>,
}

/// One out-of-band metadata record (`name` is "rate", "unit" or "desc").
#[derive(Debug, Serialize)]
pub struct Metasend<'a> {
    pub metric: &'a str,
    pub name: &'a str,
    pub value: &'a str,
}

/// Writes metric records to a sink, tracking which metrics already had
/// their metadata sent this run.
pub struct Emitter<W: Write> {
    out: W,
    sent_metadata: HashSet<&'static str>,
    host: String,
}

impl<W: Write> Emitter<W> {
    /// Emitter tagged with the local machine's hostname.
    pub fn new(out: W) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::with_host(out, host)
    }

    /// Emitter with an explicit host identity (tests, overrides).
    pub fn with_host(out: W, host: String) -> Self {
        Self {
            out,
            sent_metadata: HashSet::new(),
            host,
        }
    }

    /// Emit one data point, preceded by the metric's metadata if this is
    /// the metric's first appearance this run.
    ///
    /// The `host` tag is injected from the local identity unless the
    /// caller supplied one; a caller-supplied empty string removes the
    /// tag entirely (the "no host dimension" signal). Every tag value is
    /// sanitized before the point is written.
    pub fn point(
        &mut self,
        metric: &'static str,
        value: impl Into<serde_json::Value>,
        mut tags: BTreeMap<String, String>,
    ) {
        self.ensure_metadata(metric);

        match tags.get("host") {
            Some(h) if h.is_empty() => {
                tags.remove("host");
            }
            Some(_) => {}
            None => {
                if !self.host.is_empty() {
                    tags.insert("host".to_string(), self.host.clone());
                }
            }
        }
        for v in tags.values_mut() {
            *v = sanitize_tag_value(v);
        }

        let point = DataPoint {
            metric,
            timestamp: chrono::Utc::now().timestamp(),
            value: value.into(),
            tags: &tags,
        };
        self.write_record(&point);
    }

    /// Check-and-mark metadata emission for a metric name. Rate, unit and
    /// desc records come from the static table; empty fields are skipped.
    fn ensure_metadata(&mut self, metric: &'static str) {
        if !self.sent_metadata.insert(metric) {
            return;
        }
        let Some(meta) = metrics::metadata_for(metric) else {
            return;
        };
        for (kind, value) in [("rate", meta.rate), ("unit", meta.unit), ("desc", meta.desc)] {
            if value.is_empty() {
                continue;
            }
            self.write_record(&Metasend {
                metric,
                name: kind,
                value,
            });
        }
    }

    /// A failed write abandons this record only; the run continues.
    fn write_record<T: Serialize>(&mut self, record: &T) {
        match serde_json::to_string(record) {
            Ok(line) => {
                if let Err(e) = writeln!(self.out, "{line}") {
                    tracing::warn!(error = %e, "failed to write metric record");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize metric record"),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn test_emitter() -> Emitter<Vec<u8>> {
        Emitter::with_host(Vec::new(), "testhost".to_string())
    }

    fn lines(emitter: Emitter<Vec<u8>>) -> Vec<Value> {
        let raw = String::from_utf8(emitter.into_inner()).unwrap();
        raw.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn metadata_emitted_once_per_metric_across_many_points() {
        let mut emitter = test_emitter();
        for _ in 0..3 {
            emitter.point(crate::metrics::JOB_STATUS, 6, tags(&[("job", "Nightly")]));
        }

        let records = lines(emitter);
        let meta: Vec<_> = records.iter().filter(|r| r.get("name").is_some()).collect();
        let points: Vec<_> = records.iter().filter(|r| r.get("tags").is_some()).collect();

        assert_eq!(points.len(), 3);
        assert_eq!(meta.len(), 3); // one rate, one unit, one desc
        for kind in ["rate", "unit", "desc"] {
            assert_eq!(
                meta.iter()
                    .filter(|m| m["name"] == kind && m["metric"] == crate::metrics::JOB_STATUS)
                    .count(),
                1
            );
        }
    }

    #[test]
    fn metadata_precedes_first_data_point() {
        let mut emitter = test_emitter();
        emitter.point(crate::metrics::JOB_COUNT, 2, BTreeMap::new());

        let records = lines(emitter);
        assert_eq!(records[0]["name"], "rate");
        assert_eq!(records[1]["name"], "unit");
        assert_eq!(records[2]["name"], "desc");
        assert!(records[3].get("tags").is_some());
    }

    #[test]
    fn host_tag_injected_by_default() {
        let mut emitter = test_emitter();
        emitter.point(crate::metrics::JOB_COUNT, 1, BTreeMap::new());

        let records = lines(emitter);
        let point = records.last().unwrap();
        assert_eq!(point["tags"]["host"], "testhost");
    }

    #[test]
    fn explicit_host_is_kept() {
        let mut emitter = test_emitter();
        emitter.point(crate::metrics::JOB_COUNT, 1, tags(&[("host", "elsewhere")]));

        let records = lines(emitter);
        assert_eq!(records.last().unwrap()["tags"]["host"], "elsewhere");
    }

    #[test]
    fn empty_host_suppresses_the_tag() {
        let mut emitter = test_emitter();
        emitter.point(crate::metrics::JOB_COUNT, 1, tags(&[("host", "")]));

        let records = lines(emitter);
        let point = records.last().unwrap();
        assert!(point["tags"].get("host").is_none());
    }

    #[test]
    fn tag_values_are_sanitized() {
        let mut emitter = test_emitter();
        emitter.point(
            crate::metrics::JOB_STATUS,
            6,
            tags(&[("job", "My Job (prod)"), ("file", "C:\\data\\f.txt")]),
        );

        let records = lines(emitter);
        let point = records.last().unwrap();
        assert_eq!(point["tags"]["job"], "My_Job_prod");
        assert_eq!(point["tags"]["file"], "C-data-f.txt");
    }

    #[test]
    fn points_carry_value_and_unix_timestamp() {
        let before = chrono::Utc::now().timestamp();
        let mut emitter = test_emitter();
        emitter.point(crate::metrics::JOB_DURATION, 120.0, BTreeMap::new());
        let after = chrono::Utc::now().timestamp();

        let records = lines(emitter);
        let point = records.last().unwrap();
        assert_eq!(point["metric"], crate::metrics::JOB_DURATION);
        assert_eq!(point["value"], 120.0);
        let ts = point["timestamp"].as_i64().unwrap();
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn unknown_metric_gets_no_metadata_but_still_a_point() {
        let mut emitter = test_emitter();
        emitter.point("cloudberry.job.experimental", 1, BTreeMap::new());

        let records = lines(emitter);
        assert_eq!(records.len(), 1);
        assert!(records[0].get("tags").is_some());
    }
}
