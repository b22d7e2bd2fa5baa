use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use visibility_engine::jobs::{JobType, HALT_PIPELINE_KEY};
use visibility_engine::providers::StageProvider;

/// Scripted stage provider.
///
/// Answers every stage with `{"stage": <name>, "subject_id": ...}` unless told
/// to fail a stage a number of times or to halt the pipeline after it.
#[derive(Default)]
pub struct FakeProvider {
    calls: Mutex<Vec<(JobType, JsonValue)>>,
    failures: Mutex<HashMap<JobType, u32>>,
    halts: Mutex<HashSet<JobType>>,
}

impl FakeProvider {
    /// Fail the next `times` requests for `job_type`.
    pub fn fail_times(&self, job_type: JobType, times: u32) {
        self.failures.lock().unwrap().insert(job_type, times);
    }

    pub fn halt_after(&self, job_type: JobType) {
        self.halts.lock().unwrap().insert(job_type);
    }

    pub fn calls_for(&self, job_type: JobType) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == job_type)
            .count()
    }
}

#[async_trait]
impl StageProvider for FakeProvider {
    async fn run_stage(&self, job_type: JobType, request: &JsonValue) -> Result<JsonValue> {
        self.calls
            .lock()
            .unwrap()
            .push((job_type, request.clone()));

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&job_type) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("{} provider returned 503", job_type);
                }
            }
        }

        let mut result = json!({
            "stage": job_type.as_str(),
            "subject_id": request["subject_id"],
        });
        if self.halts.lock().unwrap().contains(&job_type) {
            result[HALT_PIPELINE_KEY] = json!(true);
        }
        Ok(result)
    }
}
