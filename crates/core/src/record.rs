use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder shown to a person when a field was not recovered.
/// Never written to the labeled record file.
pub const NOT_FOUND: &str = "Not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    StudentNo,
    Name,
    Course,
    Year,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::StudentNo, Field::Name, Field::Course, Field::Year];

    /// Label used in the persisted text block.
    pub fn label(self) -> &'static str {
        match self {
            Field::StudentNo => "STUDENT NO",
            Field::Name => "NAME",
            Field::Course => "COURSE",
            Field::Year => "YEAR",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four fields recovered from an ID card.
///
/// An empty string means "not found"; fields are never optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub student_no: String,
    pub name: String,
    pub course: String,
    pub year: String,
}

impl ExtractedRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::StudentNo => &self.student_no,
            Field::Name => &self.name,
            Field::Course => &self.course,
            Field::Year => &self.year,
        }
    }

    /// The field value, or `fallback` when it was not found.
    pub fn display_or<'a>(&'a self, field: Field, fallback: &'a str) -> &'a str {
        let value = self.get(field);
        if value.is_empty() {
            fallback
        } else {
            value
        }
    }

    pub fn found_count(&self) -> usize {
        Field::ALL.iter().filter(|f| !self.get(**f).is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }

    /// `LABEL: value` lines in the fixed order, empty values kept empty.
    pub fn to_labeled_lines(&self) -> String {
        Field::ALL
            .iter()
            .map(|f| format!("{}: {}\n", f.label(), self.get(*f)))
            .collect()
    }
}

/// Human-facing rendering that substitutes [`NOT_FOUND`] for empty fields.
pub struct RecordReport<'a>(pub &'a ExtractedRecord);

impl fmt::Display for RecordReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in Field::ALL {
            writeln!(f, "{}: {}", field.label(), self.0.display_or(field, NOT_FOUND))?;
        }
        Ok(())
    }
}

/// One capture event: the extracted fields plus their provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub record: ExtractedRecord,
    /// Verbatim OCR output the record was extracted from.
    pub raw_text: String,
    pub captured_at: DateTime<Local>,
}

impl ScanRecord {
    pub fn new(record: ExtractedRecord, raw_text: impl Into<String>, captured_at: DateTime<Local>) -> Self {
        Self { record, raw_text: raw_text.into(), captured_at }
    }

    pub fn now(record: ExtractedRecord, raw_text: impl Into<String>) -> Self {
        Self::new(record, raw_text, Local::now())
    }

    /// Timestamp fragment used in file names, e.g. `20261015_142233`.
    pub fn file_stamp(&self) -> String {
        self.captured_at.format("%Y%m%d_%H%M%S").to_string()
    }

    /// The persisted text block: four labeled lines, a blank line, then the raw text.
    pub fn to_labeled_text(&self) -> String {
        format!("{}\nRaw OCR Text:\n{}\n", self.record.to_labeled_lines(), self.raw_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> ExtractedRecord {
        ExtractedRecord {
            student_no: "1234-56".into(),
            name: "John Smith".into(),
            course: String::new(),
            year: "SECOND YEAR".into(),
        }
    }

    #[test]
    fn labeled_text_keeps_empty_values_empty() {
        let at = Local.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let scan = ScanRecord::new(sample(), "1234-56\nJohn Smith", at);
        assert_eq!(
            scan.to_labeled_text(),
            "STUDENT NO: 1234-56\nNAME: John Smith\nCOURSE: \nYEAR: SECOND YEAR\n\nRaw OCR Text:\n1234-56\nJohn Smith\n"
        );
    }

    #[test]
    fn report_substitutes_not_found() {
        let out = RecordReport(&sample()).to_string();
        assert!(out.contains("COURSE: Not found"));
        assert!(out.contains("NAME: John Smith"));
    }

    #[test]
    fn found_count_and_empty() {
        assert_eq!(sample().found_count(), 3);
        assert!(ExtractedRecord::default().is_empty());
    }

    #[test]
    fn file_stamp_format() {
        let at = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let scan = ScanRecord::new(ExtractedRecord::default(), "", at);
        assert_eq!(scan.file_stamp(), "20260102_030405");
    }

    #[test]
    fn record_serializes_with_snake_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["student_no"], "1234-56");
        assert_eq!(json["course"], "");
    }
}
