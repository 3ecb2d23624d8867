//! Interaction log records and the preprocessing that turns them into
//! per-learner encoded histories.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{KtError, Result};
use crate::index::ItemIndex;
use crate::sequence::LearnerHistory;

/// Learners with fewer interactions than this are dropped by default.
pub const DEFAULT_MIN_INTERACTIONS: usize = 5;

/// One graded attempt from the raw log.
///
/// Ids may arrive as JSON strings or numbers; `is_correct` as a bool or 0/1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(alias = "learner_id", alias = "subject_id", deserialize_with = "de_id")]
    pub learner_id: String,
    #[serde(alias = "item_id", deserialize_with = "de_id")]
    pub item_id: String,
    #[serde(alias = "is_correct", deserialize_with = "de_flag")]
    pub is_correct: bool,
    pub timestamp: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(RawId::deserialize(deserializer)?.into_string())
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Int(n) => n.to_string(),
        }
    }
}

impl RawFlag {
    fn into_bool<E: serde::de::Error>(self) -> std::result::Result<bool, E> {
        match self {
            Self::Bool(b) => Ok(b),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            Self::Int(other) => Err(E::custom(format!("correctness must be 0 or 1, got {other}"))),
        }
    }
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    RawFlag::deserialize(deserializer)?.into_bool()
}

pub(crate) fn de_id_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(RawId::into_string)
        .collect())
}

pub(crate) fn de_flag_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<bool>, D::Error> {
    Vec::<RawFlag>::deserialize(deserializer)?
        .into_iter()
        .map(RawFlag::into_bool::<D::Error>)
        .collect()
}

// ── Loading ──────────────────────────────────────────────────────────────

/// Read a newline-delimited JSON log, one [`Interaction`] per line.
pub fn read_ndjson(path: &Path) -> Result<Vec<Interaction>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Interaction = serde_json::from_str(trimmed).map_err(|e| {
            tracing::warn!(line = line_no + 1, error = %e, "Malformed interaction record");
            KtError::Json(e)
        })?;
        records.push(record);
    }

    tracing::info!(path = %path.display(), records = records.len(), "Loaded interaction log");
    Ok(records)
}

// ── Preprocessing ────────────────────────────────────────────────────────

/// Index every distinct item id that appears in the log.
pub fn build_vocabulary(records: &[Interaction]) -> ItemIndex {
    ItemIndex::build(records.iter().map(|r| r.item_id.as_str()))
}

/// Records of learners with at least `min_interactions` entries, in log
/// order. Build the training vocabulary from these so every indexed item
/// was actually seen by a kept learner.
pub fn retain_active_learners(records: &[Interaction], min_interactions: usize) -> Vec<Interaction> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.learner_id.as_str()).or_default() += 1;
    }
    records
        .iter()
        .filter(|r| counts[r.learner_id.as_str()] >= min_interactions)
        .cloned()
        .collect()
}

/// Group by learner, order each learner's records by timestamp, drop learners
/// below `min_interactions`, and encode items through `index`.
///
/// Records sharing a timestamp keep their log order.
pub fn group_by_learner(
    records: &[Interaction],
    index: &ItemIndex,
    min_interactions: usize,
) -> Result<BTreeMap<String, LearnerHistory>> {
    let mut grouped: BTreeMap<&str, Vec<&Interaction>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.learner_id.as_str()).or_default().push(record);
    }

    let mut learners = BTreeMap::new();
    let mut dropped = 0usize;
    for (learner_id, mut log) in grouped {
        if log.len() < min_interactions {
            dropped += 1;
            continue;
        }
        log.sort_by_key(|r| r.timestamp);

        let mut history = LearnerHistory::new();
        for record in log {
            history.push(index.encode(&record.item_id)?, record.is_correct);
        }
        learners.insert(learner_id.to_string(), history);
    }

    tracing::debug!(
        kept = learners.len(),
        dropped,
        min_interactions,
        "Grouped interactions by learner"
    );
    Ok(learners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rec(learner: &str, item: &str, correct: bool, ts: i64) -> Interaction {
        Interaction {
            learner_id: learner.into(),
            item_id: item.into(),
            is_correct: correct,
            timestamp: ts,
        }
    }

    #[test]
    fn deserializes_snake_and_camel_case() {
        let a: Interaction = serde_json::from_str(
            r#"{"subject_id": 17, "item_id": "q3", "is_correct": 1, "timestamp": 5}"#,
        )
        .unwrap();
        let b: Interaction = serde_json::from_str(
            r#"{"learnerId": "17", "itemId": "q3", "isCorrect": true, "timestamp": 5}"#,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_binary_correctness() {
        let result: std::result::Result<Interaction, _> = serde_json::from_str(
            r#"{"learnerId": "1", "itemId": "q", "isCorrect": 2, "timestamp": 0}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn vocabulary_is_sorted_and_distinct() {
        let records = vec![rec("a", "q2", true, 1), rec("b", "q1", true, 1), rec("a", "q2", false, 2)];
        let index = build_vocabulary(&records);
        assert_eq!(index.items(), &["q1", "q2"]);
    }

    #[test]
    fn groups_sort_by_timestamp_and_filter_short_learners() {
        let records = vec![
            rec("a", "q3", true, 30),
            rec("a", "q1", false, 10),
            rec("a", "q2", true, 20),
            rec("b", "q1", true, 5),
        ];
        let index = build_vocabulary(&records);
        let learners = group_by_learner(&records, &index, 2).unwrap();

        assert_eq!(learners.len(), 1);
        let a = &learners["a"];
        assert_eq!(a.items(), &[1, 2, 3]);
        assert_eq!(a.correct(), &[false, true, true]);
    }

    #[test]
    fn equal_timestamps_keep_log_order() {
        let records = vec![rec("a", "q2", true, 1), rec("a", "q1", true, 1)];
        let index = build_vocabulary(&records);
        let learners = group_by_learner(&records, &index, 1).unwrap();
        assert_eq!(learners["a"].items(), &[2, 1]);
    }

    #[test]
    fn dropped_learners_do_not_contribute_items() {
        let mut records: Vec<Interaction> = (0..5)
            .map(|t| rec("a", if t % 2 == 0 { "q0" } else { "q1" }, true, t))
            .collect();
        records.push(rec("b", "orphan", false, 0));

        let kept = retain_active_learners(&records, 5);
        assert_eq!(kept.len(), 5);
        assert!(kept.iter().all(|r| r.learner_id == "a"));

        let index = build_vocabulary(&kept);
        assert_eq!(index.items(), &["q0", "q1"]);
        assert!(index.encode("orphan").is_err());
    }

    #[test]
    fn unseen_items_fail_grouping() {
        let records = vec![rec("a", "q9", true, 1)];
        let index = ItemIndex::build(["q1"]);
        assert!(matches!(
            group_by_learner(&records, &index, 1),
            Err(KtError::UnknownItem(_))
        ));
    }

    #[test]
    fn reads_ndjson_skipping_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"learnerId":"a","itemId":"q1","isCorrect":1,"timestamp":1}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"learnerId":"a","itemId":"q2","isCorrect":0,"timestamp":2}}"#).unwrap();
        let records = read_ndjson(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].is_correct);
    }
}
