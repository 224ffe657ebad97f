use std::sync::Arc;

use dashmap::DashMap;

use crate::ingestion::TranscriptionPayload;

/// An uploaded document waiting to be ingested.
#[derive(Debug, Clone)]
pub struct Upload {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

/// Bulk per-run data kept beside the flow context, keyed by run id.
///
/// Context values are JSON and get cloned on every read, so documents and payloads live here
/// and the context only carries the run id.
#[derive(Debug, Default)]
pub struct Attachments {
    uploads: DashMap<String, Upload>,
    payloads: DashMap<String, Arc<TranscriptionPayload>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_upload(&self, run_id: &str, upload: Upload) {
        self.uploads.insert(run_id.to_string(), upload);
    }

    /// Removes the upload; the raw bytes are only needed until ingestion.
    pub fn take_upload(&self, run_id: &str) -> Option<Upload> {
        self.uploads.remove(run_id).map(|(_, upload)| upload)
    }

    pub fn put_payload(&self, run_id: &str, payload: TranscriptionPayload) {
        self.payloads.insert(run_id.to_string(), Arc::new(payload));
    }

    pub fn payload(&self, run_id: &str) -> Option<Arc<TranscriptionPayload>> {
        self.payloads.get(run_id).map(|entry| entry.value().clone())
    }

    /// Drop everything held for a run, whether it finished or failed.
    pub fn discard(&self, run_id: &str) {
        self.uploads.remove(run_id);
        self.payloads.remove(run_id);
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.payloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_is_taken_once_and_discard_clears_the_run() {
        let attachments = Attachments::new();
        attachments.put_upload(
            "run-1",
            Upload {
                media_type: "text/plain".into(),
                bytes: Arc::from(&b"glucose 90"[..]),
            },
        );
        attachments.put_payload(
            "run-1",
            TranscriptionPayload::Text {
                text: "glucose 90".into(),
                truncation: None,
            },
        );

        assert_eq!(&*attachments.take_upload("run-1").unwrap().bytes, b"glucose 90");
        assert!(attachments.take_upload("run-1").is_none());
        assert!(attachments.payload("run-1").is_some());

        attachments.discard("run-1");
        assert!(attachments.is_empty());
    }
}
