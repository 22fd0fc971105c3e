// src/report/mod.rs

use chrono::{DateTime, Utc};

use crate::models::{Category, Participant, Record, RecordDetails, Shift};

pub mod document;

use document::{Font, ReportDocument};

/// Everything the closure report shows. Built from the records as they were read inside
/// the closing transaction, so the document matches what was archived.
#[derive(Debug, Clone)]
pub struct ReportBundle {
    pub shift: Shift,
    pub records: Vec<Record>,
    pub roster: Vec<Participant>,
    pub closed_by_name: String,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report rendering failed: {0}")]
    Render(String),
}

/// Pure function from a bundle to document bytes.
pub trait ReportGenerator: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn render(&self, bundle: &ReportBundle) -> Result<Vec<u8>, ReportError>;
}

#[derive(Debug, Clone, Default)]
pub struct PdfReportGenerator;

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M UTC").to_string()
}

impl PdfReportGenerator {
    fn section(doc: &mut ReportDocument, title: &str) {
        doc.gap(8.0);
        doc.text(Font::Bold, 13.0, 0.0, title);
        doc.gap(2.0);
    }

    fn record_lines(record: &Record) -> Vec<String> {
        let mut lines = vec![format!(
            "Age: {} | Room: {} | Surgeon: {}",
            record.age, record.room, record.responsible_surgeon
        )];
        match &record.details {
            RecordDetails::Operated(d) => {
                lines.push(format!(
                    "Procedure: {} | Anesthesia: {}",
                    d.procedure_type, d.anesthesia_type
                ));
                lines.push(format!("Time: {} - {}", d.start_time, d.end_time));
                if let Some(c) = &d.complications {
                    lines.push(format!("Complications: {c}"));
                }
            }
            RecordDetails::Pending(d) => {
                lines.push(format!(
                    "Proposed procedure: {} | Anesthesia: {}",
                    d.proposed_procedure, d.anesthesia_type
                ));
                lines.push(format!("Priority: {:?} | Waiting because: {}", d.priority, d.wait_reason));
                lines.push("CARRIED FORWARD TO NEXT SHIFT".to_owned());
            }
            RecordDetails::NonSurgical(d) => {
                lines.push(format!(
                    "Admission reason: {} | Specialty: {}",
                    d.admission_reason, d.specialty
                ));
                lines.push(format!("Estimated stay: {}", d.estimated_stay));
            }
            RecordDetails::Note(d) => {
                lines.push(format!("Type: {} | Impact: {:?}", d.note_type, d.impact));
                lines.push(format!("Description: {}", d.description));
            }
        }
        if let Some(notes) = record.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(format!("Notes: {notes}"));
        }
        lines
    }
}

impl ReportGenerator for PdfReportGenerator {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, bundle: &ReportBundle) -> Result<Vec<u8>, ReportError> {
        let shift = &bundle.shift;
        if !shift.closed {
            return Err(ReportError::Render(format!("shift {} is not closed", shift.id)));
        }

        let mut doc = ReportDocument::new(format!("Shift report {}", shift.id));
        doc.text(Font::Bold, 20.0, 0.0, "Surgical Shift Logbook");
        doc.text(Font::Bold, 16.0, 0.0, "SHIFT REPORT");

        Self::section(&mut doc, "SHIFT");
        let ended = shift.ended_at.map(fmt_ts).unwrap_or_else(|| "not specified".into());
        for line in [
            format!("Shift: {}", shift.id),
            format!("Start: {}", fmt_ts(shift.started_at)),
            format!("End: {ended}"),
            format!("Closed by: {}", bundle.closed_by_name),
            format!("Closed at: {}", fmt_ts(bundle.closed_at)),
        ] {
            doc.text(Font::Regular, 11.0, 0.0, &line);
        }

        if !bundle.roster.is_empty() {
            Self::section(&mut doc, "PARTICIPANTS");
            for p in &bundle.roster {
                doc.text(
                    Font::Regular,
                    10.0,
                    0.0,
                    &format!("{} | {} | {}", p.name, p.clinical_role, p.hours),
                );
            }
        }

        if !shift.equipment.is_empty() {
            Self::section(&mut doc, "EQUIPMENT");
            for e in &shift.equipment {
                doc.text(Font::Regular, 10.0, 0.0, &format!("{} | {}", e.name, e.kind));
            }
        }

        Self::section(&mut doc, "SUMMARY");
        for category in Category::ALL {
            let count = bundle.records.iter().filter(|r| r.category() == category).count();
            doc.text(
                Font::Regular,
                11.0,
                0.0,
                &format!("{}: {count} records", category.display_name()),
            );
        }

        for category in Category::ALL {
            let records: Vec<&Record> =
                bundle.records.iter().filter(|r| r.category() == category).collect();
            if records.is_empty() {
                continue;
            }
            Self::section(&mut doc, &category.display_name().to_uppercase());
            for (i, record) in records.iter().enumerate() {
                doc.text(
                    Font::Bold,
                    11.0,
                    0.0,
                    &format!("{}. {} ({})", i + 1, record.name, record.national_id),
                );
                for line in Self::record_lines(record) {
                    doc.text(Font::Regular, 10.0, 12.0, &line);
                }
                doc.gap(4.0);
            }
        }

        doc.gap(16.0);
        doc.text(
            Font::Regular,
            9.0,
            0.0,
            "This document was generated automatically when the shift was closed.",
        );

        Ok(doc.finish())
    }
}
