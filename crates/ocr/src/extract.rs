use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::types::{Extraction, KeywordRule, NameMatch, NameSource};
use idscan_core::ExtractedRecord;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_student_no, r"\b\d{4}-\d{2}\b");
// Unanchored variant used to reject a name candidate that carries an ID.
re!(re_student_no_anywhere, r"\d{4}-\d{2}");
re!(re_course, r"\b(BS[A-Z]{2,4}|BA[A-Z]{2,4}|AB[A-Z]{2,4}|BSC[A-Z]{2,4})\b");
re!(re_year, r"\b(FIRST|SECOND|THIRD|FOURTH|1ST|2ND|3RD|4TH)\s*YEAR\b");
re!(re_punctuation, r"[^\w\s]");
re!(re_four_digits, r"\d{4}");
re!(re_digit, r"\d");

/// Labels that anchor the name, tried in this order.
pub const NAME_KEYWORDS: [&str; 4] = ["NAME", "STUDENT NAME", "FULL NAME", "NOMBRE"];

/// Shortest accepted name candidate is 3 characters.
const MIN_NAME_CHARS: usize = 3;

// ── Name strategies ───────────────────────────────────────────────────────────

/// The view of the OCR text a name strategy gets for one line.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub lines: &'a [&'a str],
    pub index: usize,
    /// Student number found so far in the scan, including this line.
    pub student_no: &'a str,
}

impl<'a> LineContext<'a> {
    pub fn line(&self) -> &'a str {
        self.lines[self.index]
    }

    pub fn next_line(&self) -> Option<&'a str> {
        self.lines.get(self.index + 1).copied()
    }

    pub fn previous_line(&self) -> Option<&'a str> {
        self.index.checked_sub(1).map(|i| self.lines[i])
    }
}

/// A name accepted by one of the strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCandidate {
    pub name: String,
    pub source: NameSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStrategy {
    /// A `NAME`-style label on the line.
    Keyword,
    /// The line itself looks like a person's name.
    Shape,
    /// The line directly follows the line holding the student number.
    Positional,
}

impl NameStrategy {
    pub const ORDER: [NameStrategy; 3] = [NameStrategy::Keyword, NameStrategy::Shape, NameStrategy::Positional];

    pub fn resolve(self, ctx: &LineContext<'_>) -> Option<NameCandidate> {
        match self {
            NameStrategy::Keyword => resolve_keyword(ctx),
            NameStrategy::Shape => looks_like_name(ctx.line()).then(|| NameCandidate {
                name: ctx.line().to_string(),
                source: NameSource::Shape,
            }),
            NameStrategy::Positional => resolve_positional(ctx).map(|name| NameCandidate {
                name,
                source: NameSource::Positional,
            }),
        }
    }
}

impl KeywordRule {
    pub const ORDER: [KeywordRule; 3] = [KeywordRule::AfterColon, KeywordRule::NextLine, KeywordRule::Remainder];

    fn apply(self, ctx: &LineContext<'_>, upper: &str, keyword: &str) -> Option<String> {
        let line = ctx.line();
        match self {
            KeywordRule::AfterColon => {
                let (_, rest) = line.split_once(':')?;
                let rest = rest.trim();
                long_enough(rest).then(|| rest.to_string())
            }
            KeywordRule::NextLine => {
                let next = ctx.next_line()?.trim();
                let acceptable = long_enough(next)
                    && !re_student_no_anywhere().is_match(next)
                    && next.chars().any(char::is_alphabetic);
                acceptable.then(|| next.to_string())
            }
            KeywordRule::Remainder => {
                let rest = upper.replace(keyword, "");
                let rest = rest.trim();
                long_enough(rest).then(|| title_case(rest))
            }
        }
    }
}

fn long_enough(s: &str) -> bool {
    s.chars().count() >= MIN_NAME_CHARS
}

fn resolve_keyword(ctx: &LineContext<'_>) -> Option<NameCandidate> {
    let upper = ctx.line().to_uppercase();
    for keyword in NAME_KEYWORDS {
        if !upper.contains(keyword) {
            continue;
        }
        for rule in KeywordRule::ORDER {
            if let Some(name) = rule.apply(ctx, &upper, keyword) {
                return Some(NameCandidate { name, source: NameSource::Keyword { keyword, rule } });
            }
        }
    }
    None
}

/// Shape test for a bare name line: several mostly-alphabetic words, no
/// digits runs, nothing that belongs to another field.
pub fn looks_like_name(line: &str) -> bool {
    let total = line.chars().count();
    if total <= 3 {
        return false;
    }

    let cleaned = re_punctuation().replace_all(line, " ");
    let cleaned = cleaned.trim();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let cleaned_len = cleaned.chars().count();
    let upper = line.to_uppercase();
    let alphabetic = line.chars().filter(|c| c.is_alphabetic()).count();

    let plausible = words.len() >= 2
        && (5..=50).contains(&cleaned_len)
        && !re_student_no().is_match(line)
        && !re_course().is_match(&upper)
        && !upper.contains("YEAR")
        && !re_four_digits().is_match(line)
        && alphabetic as f64 / total as f64 > 0.7;

    plausible
        && (words.iter().any(|w| w.chars().next().is_some_and(char::is_uppercase))
            || words.iter().any(|w| w.chars().count() > 2))
}

fn resolve_positional(ctx: &LineContext<'_>) -> Option<String> {
    if ctx.student_no.is_empty() {
        return None;
    }
    let previous = ctx.previous_line()?;
    let line = ctx.line();
    if !previous.contains(ctx.student_no) || line.chars().count() <= 3 || re_digit().is_match(line) {
        return None;
    }
    let mut letters = line.chars().filter(|c| !matches!(c, ' ' | '.' | ',')).peekable();
    let all_alphabetic = letters.peek().is_some() && letters.all(char::is_alphabetic);
    all_alphabetic.then(|| line.to_string())
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        in_word = c.is_alphabetic();
    }
    out
}

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract the four card fields from raw OCR text.
    pub fn extract(ocr_text: &str) -> ExtractedRecord {
        Self::extract_traced(ocr_text).record
    }

    /// Like [`Extractor::extract`], also reporting where the name came from.
    ///
    /// Student number, course and year keep the last match in the text; the
    /// name keeps the first line any strategy accepts.
    pub fn extract_traced(ocr_text: &str) -> Extraction {
        let lines: Vec<&str> = ocr_text
            .split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut record = ExtractedRecord::default();
        let mut name_match: Option<NameMatch> = None;

        for (index, line) in lines.iter().enumerate() {
            trace!(index, line, "Scanning OCR line");
            let upper = line.to_uppercase();

            if let Some(m) = re_student_no().find(line) {
                record.student_no = m.as_str().to_string();
                debug!(index, student_no = %record.student_no, "Found student number");
            }
            if let Some(m) = re_course().find(&upper) {
                record.course = m.as_str().to_string();
                debug!(index, course = %record.course, "Found course");
            }
            if let Some(m) = re_year().find(&upper) {
                record.year = m.as_str().to_string();
                debug!(index, year = %record.year, "Found year");
            }

            if name_match.is_some() {
                continue;
            }
            let ctx = LineContext { lines: &lines, index, student_no: &record.student_no };
            if let Some(candidate) = NameStrategy::ORDER.iter().find_map(|s| s.resolve(&ctx)) {
                debug!(index, name = %candidate.name, source = ?candidate.source, "Found name");
                record.name = candidate.name;
                name_match = Some(NameMatch { line: index, source: candidate.source });
            }
        }

        Extraction { record, name_match }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
