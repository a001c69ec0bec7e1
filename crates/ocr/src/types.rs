use serde::Serialize;

use idscan_core::ExtractedRecord;

/// Which sub-rule of the keyword strategy produced the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordRule {
    /// Text after the first `:` on the keyword line.
    AfterColon,
    /// The whole line after the keyword line.
    NextLine,
    /// The keyword line with the keyword removed, title-cased.
    Remainder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NameSource {
    Keyword { keyword: &'static str, rule: KeywordRule },
    Shape,
    Positional,
}

impl std::fmt::Display for NameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameSource::Keyword { keyword, rule } => write!(f, "keyword '{keyword}' ({rule:?})"),
            NameSource::Shape => write!(f, "name-shaped line"),
            NameSource::Positional => write!(f, "line after student number"),
        }
    }
}

/// Index (into the non-blank trimmed lines) and strategy of the accepted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NameMatch {
    pub line: usize,
    pub source: NameSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub record: ExtractedRecord,
    pub name_match: Option<NameMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_source_serializes_with_strategy_tag() {
        let src = NameSource::Keyword { keyword: "NAME", rule: KeywordRule::AfterColon };
        let json = serde_json::to_value(src).unwrap();
        assert_eq!(json["strategy"], "keyword");
        assert_eq!(json["keyword"], "NAME");
        assert_eq!(json["rule"], "after_colon");
        assert_eq!(serde_json::to_value(NameSource::Shape).unwrap()["strategy"], "shape");
    }
}
