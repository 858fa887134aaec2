use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::domain::AnalysisReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Ok,
    Error,
    Done,
}

/// One structured progress message published at a pipeline checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub message: String,
    pub status: ProgressStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

struct Job {
    status: JobStatus,
    events: Vec<ProgressEvent>,
    result: Option<AnalysisReport>,
    error: Option<String>,
    subscriber: Option<UnboundedSender<ProgressEvent>>,
}

/// Point-in-time view of a job, safe to hand to a transport.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub events: Vec<ProgressEvent>,
    pub result: Option<AnalysisReport>,
    pub error: Option<String>,
}

/// Owns every background analysis job and its per-job message channel.
/// All synchronization lives inside the store; nothing ambient leaks to
/// the rest of the system.
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn create(&self) -> Uuid {
        let job_id = Uuid::new_v4();
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(
            job_id,
            Job {
                status: JobStatus::Running,
                events: vec![],
                result: None,
                error: None,
                subscriber: None,
            },
        );
        job_id
    }

    /// Records a progress event and forwards it to the subscriber, if an
    /// external transport attached one. Unknown job ids are ignored.
    pub fn emit(
        &self,
        job_id: Uuid,
        stage: &str,
        status: ProgressStatus,
        message: impl Into<String>,
    ) {
        let event = ProgressEvent {
            stage: stage.to_string(),
            message: message.into(),
            status,
            timestamp: Utc::now(),
        };

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            if let Some(subscriber) = &job.subscriber {
                // A hung-up subscriber only stops the forwarding.
                let _ = subscriber.send(event.clone());
            }
            job.events.push(event);
        }
    }

    /// Attaches a message channel to a job and replays the events seen so
    /// far, so a late subscriber misses nothing.
    pub fn subscribe(&self, job_id: Uuid) -> Option<UnboundedReceiver<ProgressEvent>> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        for event in &job.events {
            let _ = sender.send(event.clone());
        }
        job.subscriber = Some(sender);
        Some(receiver)
    }

    pub fn complete(&self, job_id: Uuid, report: AnalysisReport) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = JobStatus::Done;
            job.result = Some(report);
        }
    }

    /// Marks a job terminally failed, distinguishable from completion.
    pub fn fail(&self, job_id: Uuid, message: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = JobStatus::Error;
            job.error = Some(message.to_string());
        }
    }

    pub fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(&job_id).map(|job| JobSnapshot {
            status: job.status,
            events: job.events.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::domain::{AnalysisReport, ProductSignals};

    use super::{JobStatus, JobStore, ProgressStatus};

    #[test]
    fn emit_and_snapshot_round_trip() {
        let store = JobStore::default();
        let job_id = store.create();

        store.emit(job_id, "extract", ProgressStatus::Running, "starting");
        store.emit(job_id, "extract", ProgressStatus::Ok, "finished");

        let snapshot = store.snapshot(job_id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[0].stage, "extract");
        assert_eq!(snapshot.events[1].status, ProgressStatus::Ok);
        assert!(snapshot.result.is_none());
    }

    #[test]
    fn unknown_job_is_ignored() {
        let store = JobStore::default();
        store.emit(Uuid::new_v4(), "extract", ProgressStatus::Running, "noop");
        assert!(store.snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn complete_and_fail_are_distinct_terminal_states() {
        let store = JobStore::default();

        let done = store.create();
        let report = AnalysisReport::new(
            "https://acme.com/p/1",
            ProductSignals::empty("https://acme.com/p/1"),
            vec![],
        );
        store.complete(done, report);
        let snapshot = store.snapshot(done).unwrap();
        assert_eq!(snapshot.status, JobStatus::Done);
        assert!(snapshot.result.is_some());
        assert!(snapshot.error.is_none());

        let failed = store.create();
        store.fail(failed, "provider exploded");
        let snapshot = store.snapshot(failed).unwrap();
        assert_eq!(snapshot.status, JobStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("provider exploded"));
        assert!(snapshot.result.is_none());
    }

    #[tokio::test]
    async fn subscriber_receives_replayed_and_new_events() {
        let store = JobStore::default();
        let job_id = store.create();
        store.emit(job_id, "extract", ProgressStatus::Running, "early");

        let mut receiver = store.subscribe(job_id).unwrap();
        store.emit(job_id, "search", ProgressStatus::Ok, "late");

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.message, "early");
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.stage, "search");
    }
}
