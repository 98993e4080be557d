use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One attempted run of an approved command. Fields are read-only once built.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    output: String, // Merged stdout/stderr, trimmed
}

impl ExecutionRecord {
    pub(crate) fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, output: &str) -> Self {
        Self {
            start_time,
            end_time: end_time.max(start_time),
            output: output.trim().to_string(),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub command: String,
    #[serde(default)]
    pub task_executions: Vec<ExecutionRecord>, // Oldest first
}

impl Task {
    pub fn new(id: String, name: String, owner: Option<String>, command: String) -> Self {
        Self {
            id,
            name,
            owner,
            command,
            task_executions: Vec::new(),
        }
    }

    pub fn add_execution(&mut self, record: ExecutionRecord) {
        self.task_executions.push(record);
    }

    pub fn last_execution(&self) -> Option<&ExecutionRecord> {
        self.task_executions.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_clamps_end_before_start() {
        let start = Utc::now();
        let record = ExecutionRecord::new(start, start - Duration::seconds(1), "x");
        assert_eq!(record.end_time(), start);
        assert_eq!(record.duration(), Duration::zero());
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let start = Utc::now();
        let record = ExecutionRecord::new(start, start, "  hello\n");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["output"], "hello");
        assert!(json.get("startTime").is_some());
        assert!(json.get("endTime").is_some());

        let back: ExecutionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn task_without_history_deserializes() {
        let task: Task = serde_json::from_str(
            r#"{"id":"t1","name":"greet","command":"echo hi"}"#,
        )
        .unwrap();
        assert_eq!(task.owner, None);
        assert!(task.task_executions.is_empty());
        assert!(task.last_execution().is_none());
    }
}
