//! # Document Status Reporting
//!
//! Aggregated counts over the document set, filterable by folder,
//! department, and type. Counts use `BTreeMap` so report output is
//! deterministic.

use crate::document::Document;
use crate::types::DocumentStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// FILTERS
// =============================================================================

/// Optional filters applied before counting. Department and type match
/// case-insensitively after trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
}

impl ReportFilter {
    fn matches(&self, doc: &Document) -> bool {
        if let Some(folder_id) = &self.folder_id {
            if doc.folder_id != *folder_id {
                return false;
            }
        }
        if let Some(department) = &self.department {
            let doc_department = doc.department.as_deref().unwrap_or("");
            if !doc_department.trim().eq_ignore_ascii_case(department.trim()) {
                return false;
            }
        }
        if let Some(document_type) = &self.document_type {
            if !doc
                .document_type
                .trim()
                .eq_ignore_ascii_case(document_type.trim())
            {
                return false;
            }
        }
        if let Some(status) = self.status {
            if doc.status != status {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Counts of documents grouped by status, department, and type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusReport {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_department: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
}

/// Build the status report over an already-loaded document set.
#[must_use]
pub fn document_status_report<'a, I>(documents: I, filter: &ReportFilter) -> DocumentStatusReport
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut report = DocumentStatusReport::default();
    for doc in documents {
        if !filter.matches(doc) {
            continue;
        }
        report.total += 1;
        *report
            .by_status
            .entry(doc.status.as_str().to_string())
            .or_insert(0) += 1;
        let department = doc
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("unassigned");
        *report
            .by_department
            .entry(department.to_string())
            .or_insert(0) += 1;
        *report
            .by_type
            .entry(doc.document_type.trim().to_string())
            .or_insert(0) += 1;
    }
    report
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(folder: &str, department: Option<&str>, doc_type: &str, status: DocumentStatus) -> Document {
        let now = Utc::now();
        Document {
            id: crate::types::new_id(),
            folder_id: folder.to_string(),
            code: "QM-001".to_string(),
            title: "t".to_string(),
            description: None,
            document_type: doc_type.to_string(),
            department: department.map(str::to_string),
            status,
            author_id: "u1".to_string(),
            version: "1.0".to_string(),
            tags: vec![],
            distribution_list: vec![],
            approval_matrix: vec![],
            read_receipts: vec![],
            status_history: vec![],
            version_history: vec![],
            current_version_id: None,
            review_date: None,
            expiry_date: None,
            published_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn report_counts_all_dimensions() {
        let docs = vec![
            doc("f1", Some("QA"), "SOP", DocumentStatus::Approved),
            doc("f1", Some("QA"), "Policy", DocumentStatus::Draft),
            doc("f2", None, "SOP", DocumentStatus::Approved),
        ];
        let report = document_status_report(&docs, &ReportFilter::default());
        assert_eq!(report.total, 3);
        assert_eq!(report.by_status.get("approved"), Some(&2));
        assert_eq!(report.by_status.get("draft"), Some(&1));
        assert_eq!(report.by_department.get("QA"), Some(&2));
        assert_eq!(report.by_department.get("unassigned"), Some(&1));
        assert_eq!(report.by_type.get("SOP"), Some(&2));
    }

    #[test]
    fn filters_are_case_insensitive() {
        let docs = vec![
            doc("f1", Some("QA"), "SOP", DocumentStatus::Approved),
            doc("f2", Some("Plant"), "SOP", DocumentStatus::Draft),
        ];
        let filter = ReportFilter {
            department: Some("qa".to_string()),
            ..ReportFilter::default()
        };
        let report = document_status_report(&docs, &filter);
        assert_eq!(report.total, 1);

        let filter = ReportFilter {
            document_type: Some(" sop ".to_string()),
            status: Some(DocumentStatus::Draft),
            ..ReportFilter::default()
        };
        let report = document_status_report(&docs, &filter);
        assert_eq!(report.total, 1);
        assert_eq!(report.by_department.get("Plant"), Some(&1));
    }

    #[test]
    fn folder_filter_scopes_report() {
        let docs = vec![
            doc("f1", None, "SOP", DocumentStatus::Draft),
            doc("f2", None, "SOP", DocumentStatus::Draft),
        ];
        let filter = ReportFilter {
            folder_id: Some("f1".to_string()),
            ..ReportFilter::default()
        };
        assert_eq!(document_status_report(&docs, &filter).total, 1);
    }
}
