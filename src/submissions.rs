/// Public complaint and report submissions
///
/// Each submission becomes a tracker issue labelled `pending`. Complaints
/// must reference a proof previously uploaded through an upload ticket; the
/// link between issue and proof is kept in the proof store, never in the
/// public issue.
use crate::{
    error::{AppError, AppResult},
    metrics,
    moderation::StateLabel,
    proofs::normalize_object_path,
    storage::{object_path_from_signed_url, ObjectStorage},
    store::{ProofRecord, ProofStore},
    tracker::{IssueTracker, NewIssue},
    validation::Validator,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Line prefix that carries a complaint's public summary
pub const SUMMARY_PREFIX: &str = "**Summary**:";

const NAME_MIN_CHARS: usize = 8;
const NAME_MAX_CHARS: usize = 120;
const TEXT_MIN_CHARS: usize = 120;
const TEXT_MAX_CHARS: usize = 10_000;
// Tracker labels hold at most 50 characters, "topic: " included
const LABEL_VALUE_MAX_CHARS: usize = 40;
const PREVIEW_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Default)]
pub struct ComplaintInput {
    pub full_name: String,
    pub submitted_date: String,
    pub category: String,
    pub summary: String,
    pub show_name: bool,
    pub place: String,
    pub proof_path: String,
    pub proof_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub event_date_time: String,
    pub place: String,
    pub category: String,
    pub body: String,
    pub full_name: String,
    pub evidence_url: String,
}

/// Created submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub number: u64,
    pub html_url: String,
    /// Whether the proof link was stored; complaints only
    #[serde(rename = "proofRecorded", skip_serializing_if = "Option::is_none")]
    pub proof_recorded: Option<bool>,
}

#[derive(Clone)]
pub struct SubmissionService {
    tracker: Arc<dyn IssueTracker>,
    proofs: Arc<dyn ProofStore>,
    storage: Arc<dyn ObjectStorage>,
    upload_prefix: String,
    embed_proof_preview: bool,
}

impl SubmissionService {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        proofs: Arc<dyn ProofStore>,
        storage: Arc<dyn ObjectStorage>,
        upload_prefix: impl Into<String>,
        embed_proof_preview: bool,
    ) -> Self {
        Self {
            tracker,
            proofs,
            storage,
            upload_prefix: upload_prefix.into(),
            embed_proof_preview,
        }
    }

    /// Resolve the proof reference to an object path under the upload prefix
    fn proof_object_path(&self, input: &ComplaintInput) -> Option<String> {
        let bucket = self.storage.bucket();
        let raw = if !input.proof_path.is_empty() {
            input.proof_path.clone()
        } else {
            object_path_from_signed_url(&input.proof_url, bucket)?
        };

        let path = normalize_object_path(&raw, bucket)?;
        let prefix = format!("{}/", self.upload_prefix.trim_matches('/'));
        path.starts_with(&prefix).then_some(path)
    }

    pub async fn submit_complaint(
        &self,
        input: ComplaintInput,
        client_ip: Option<&str>,
    ) -> AppResult<SubmissionReceipt> {
        let mut v = Validator::new();
        v.length("fullName", &input.full_name, NAME_MIN_CHARS, NAME_MAX_CHARS, "Full name")
            .required("submittedDate", &input.submitted_date, "Submission date is required.")
            .length("category", &input.category, 1, LABEL_VALUE_MAX_CHARS, "Category")
            .length("summary", &input.summary, TEXT_MIN_CHARS, TEXT_MAX_CHARS, "Summary");
        if !input.place.is_empty() {
            v.length("place", &input.place, 1, LABEL_VALUE_MAX_CHARS, "Place");
        }

        let proof_path = if input.proof_path.is_empty() && input.proof_url.is_empty() {
            v.error("proof", "A signed document or photo of the complaint is required.");
            None
        } else {
            let path = self.proof_object_path(&input);
            if path.is_none() {
                v.error("proof", "Proof reference is invalid.");
            }
            path
        };
        v.finish()?;
        let proof_path =
            proof_path.ok_or_else(|| AppError::validation("Proof reference is invalid."))?;

        let preview = if self.embed_proof_preview {
            match self
                .storage
                .create_signed_download(&proof_path, PREVIEW_TTL_SECS)
                .await
            {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Proof preview link could not be created: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let issue = NewIssue {
            title: complaint_title(&input),
            body: complaint_body(&input, preview.as_deref()),
            labels: submission_labels("complaint", &input.category, &input.place),
        };
        let created = self.tracker.create_issue(&issue).await?;
        metrics::record_submission_created("complaint");
        info!("Complaint filed as issue #{}", created.number);

        let record = ProofRecord {
            issue_number: created.number,
            proof_path: proof_path.clone(),
            client_ip: client_ip.map(str::to_string),
        };
        let proof_recorded = match self.proofs.insert_proof(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    target: "civic_desk::reconciliation",
                    reconciliation_id = %Uuid::new_v4(),
                    issue_number = created.number,
                    proof_path = %proof_path,
                    error = %e,
                    "Complaint filed but its proof record was not stored"
                );
                false
            }
        };

        Ok(SubmissionReceipt {
            number: created.number,
            html_url: created.html_url,
            proof_recorded: Some(proof_recorded),
        })
    }

    pub async fn submit_report(&self, input: ReportInput) -> AppResult<SubmissionReceipt> {
        let mut v = Validator::new();
        v.required("eventDateTime", &input.event_date_time, "Event date and time are required.")
            .length("place", &input.place, 1, LABEL_VALUE_MAX_CHARS, "Place")
            .length("category", &input.category, 1, LABEL_VALUE_MAX_CHARS, "Category")
            .length("body", &input.body, TEXT_MIN_CHARS, TEXT_MAX_CHARS, "Report text");
        if !input.full_name.is_empty() {
            v.length("fullName", &input.full_name, 1, NAME_MAX_CHARS, "Full name");
        }
        v.finish()?;

        let issue = NewIssue {
            title: format!(
                "Report: [{}] {} — {}",
                input.category, input.place, input.event_date_time
            ),
            body: report_body(&input),
            labels: submission_labels("report", &input.category, &input.place),
        };
        let created = self.tracker.create_issue(&issue).await?;
        metrics::record_submission_created("report");
        info!("Report filed as issue #{}", created.number);

        Ok(SubmissionReceipt {
            number: created.number,
            html_url: created.html_url,
            proof_recorded: None,
        })
    }
}

/// Initial label set: pending state, type, topic and optional city
pub fn submission_labels(kind: &str, category: &str, place: &str) -> Vec<String> {
    let mut labels = vec![
        StateLabel::Pending.as_str().to_string(),
        format!("type: {}", kind),
        format!("topic: {}", category.trim()),
    ];
    if !place.trim().is_empty() {
        labels.push(format!("city: {}", place.trim()));
    }
    labels
}

fn complaint_title(input: &ComplaintInput) -> String {
    let name = if input.show_name {
        input.full_name.as_str()
    } else {
        "Name withheld"
    };
    format!(
        "Complaint: [{}] {} — {}",
        input.category, name, input.submitted_date
    )
}

fn complaint_body(input: &ComplaintInput, preview: Option<&str>) -> String {
    let mut lines = vec![
        "**Type:** Complaint".to_string(),
        format!("**Submitted on:** {}", input.submitted_date),
    ];
    if input.show_name {
        lines.push(format!("**Name:** {}", input.full_name));
    }
    if !input.place.is_empty() {
        lines.push(format!("**Place:** {}", input.place));
    }
    // Status reads only this line, so the summary stays on it
    let summary = input.summary.replace("\r\n", " ").replace('\n', " ");
    lines.push(format!("{} {}", SUMMARY_PREFIX, summary));
    lines.push(String::new());
    match preview {
        Some(url) => lines.push(format!("> **Proof (private, link expires in one hour):** {}", url)),
        None => lines.push("> **Proof:** held privately by the administration.".to_string()),
    }
    lines.join("\n")
}

fn report_body(input: &ReportInput) -> String {
    let mut lines = vec!["**Type:** Report".to_string()];
    if !input.full_name.is_empty() {
        lines.push(format!("**Name:** {}", input.full_name));
    }
    lines.push(format!("**Time:** {}", input.event_date_time));
    lines.push(format!("**Place:** {}", input.place));
    if !input.evidence_url.is_empty() {
        lines.push(format!("**Evidence links:** {}", input.evidence_url));
    }
    lines.push(String::new());
    lines.push(input.body.clone());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complaint() -> ComplaintInput {
        ComplaintInput {
            full_name: "Youssef El Amrani".to_string(),
            submitted_date: "2024-05-01".to_string(),
            category: "roads".to_string(),
            summary: "x".repeat(130),
            show_name: false,
            place: "Rabat".to_string(),
            proof_path: "incoming/2024/05/01/1-abc.pdf".to_string(),
            proof_url: String::new(),
        }
    }

    #[test]
    fn test_submission_labels() {
        assert_eq!(
            submission_labels("complaint", "roads", "Rabat"),
            vec!["pending", "type: complaint", "topic: roads", "city: Rabat"]
        );
        assert_eq!(
            submission_labels("complaint", "roads", " "),
            vec!["pending", "type: complaint", "topic: roads"]
        );
    }

    #[test]
    fn test_complaint_title_withholds_name() {
        let mut input = complaint();
        assert_eq!(
            complaint_title(&input),
            "Complaint: [roads] Name withheld — 2024-05-01"
        );
        assert!(!complaint_body(&input, None).contains("Youssef"));

        input.show_name = true;
        assert_eq!(
            complaint_title(&input),
            "Complaint: [roads] Youssef El Amrani — 2024-05-01"
        );
    }

    #[test]
    fn test_complaint_body_keeps_summary_on_one_line() {
        let mut input = complaint();
        input.summary = format!("first part\nsecond part {}", "y".repeat(120));
        let body = complaint_body(&input, None);
        let line = body
            .lines()
            .find(|l| l.starts_with(SUMMARY_PREFIX))
            .unwrap();
        assert!(line.contains("first part second part"));
    }

    #[test]
    fn test_report_body_skips_empty_optionals() {
        let input = ReportInput {
            event_date_time: "2024-05-01 10:00".to_string(),
            place: "Fes".to_string(),
            category: "lighting".to_string(),
            body: "z".repeat(125),
            full_name: String::new(),
            evidence_url: String::new(),
        };
        let body = report_body(&input);
        assert!(!body.contains("**Name:**"));
        assert!(!body.contains("**Evidence links:**"));
        assert!(body.ends_with(&"z".repeat(125)));
    }
}
