use crate::models::{ChunkMetadata, Program, RuleType};
use crate::segmenter::normalize_whitespace;
use regex::Regex;
use roxmltree::Document;

// Keyword families checked in fixed priority order; the first family with
// a match wins, so classification is deterministic.
const HOSPICE_KEYWORDS: [&str; 1] = ["hospice"];
const SNF_KEYWORDS: [&str; 2] = ["snf", "skilled nursing"];
const MPFS_KEYWORDS: [&str; 3] = ["mpfs", "physician fee schedule", "pfs"];

pub fn classify_program(text: &str) -> Program {
    let lowered = text.to_lowercase();
    if HOSPICE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        Program::Hospice
    } else if SNF_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        Program::Snf
    } else if MPFS_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        Program::Mpfs
    } else {
        Program::Unknown
    }
}

pub fn classify_rule_type(text: &str) -> RuleType {
    let lowered = text.to_lowercase();
    if lowered.contains("proposed") {
        RuleType::Proposed
    } else if lowered.contains("final") {
        RuleType::Final
    } else {
        RuleType::Unknown
    }
}

/// First four-digit substring starting with "20". Best-effort: any failure
/// yields `None` rather than an error.
pub fn extract_year(text: &str) -> Option<u16> {
    let pattern = Regex::new(r"20\d{2}").ok()?;
    pattern.find(text)?.as_str().parse().ok()
}

/// Tags inferable from the filename alone; preamble fields stay unset.
pub fn infer_from_filename(filename: &str) -> ChunkMetadata {
    ChunkMetadata {
        source_file: filename.to_string(),
        program: classify_program(filename),
        rule_type: classify_rule_type(filename),
        year: extract_year(filename),
        ..ChunkMetadata::default()
    }
}

/// Filename-inferred defaults merged with the document's own preamble
/// fields. Missing preamble elements leave their slots unset, never error.
pub fn document_metadata(filename: &str, document: &Document<'_>) -> ChunkMetadata {
    let mut metadata = infer_from_filename(filename);
    metadata.title = find_text(document, "SUBJECT");
    metadata.document_id = find_text(document, "DEPDOC");
    metadata.cfr = find_text(document, "CFR");
    metadata.effective_date = effective_date(document);
    metadata
}

fn find_text(document: &Document<'_>, tag: &str) -> Option<String> {
    document
        .root()
        .descendants()
        .find(|node| node.has_tag_name(tag))
        .and_then(|node| node.text())
        .map(normalize_whitespace)
        .filter(|text| !text.is_empty())
}

// The effective date lives in the first P child of EFFDATE.
fn effective_date(document: &Document<'_>) -> Option<String> {
    document
        .root()
        .descendants()
        .find(|node| node.has_tag_name("EFFDATE"))
        .and_then(|node| node.children().find(|child| child.has_tag_name("P")))
        .and_then(|node| node.text())
        .map(normalize_whitespace)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_classification_checks_families_in_priority_order() {
        assert_eq!(classify_program("2023-hospice-final.xml"), Program::Hospice);
        assert_eq!(classify_program("FY24_SNF_proposed.xml"), Program::Snf);
        assert_eq!(
            classify_program("skilled nursing facility update"),
            Program::Snf
        );
        assert_eq!(classify_program("cy2024-mpfs-final.xml"), Program::Mpfs);
        assert_eq!(
            classify_program("physician fee schedule correction"),
            Program::Mpfs
        );
        assert_eq!(classify_program("unrelated-rule.xml"), Program::Unknown);
        // Hospice outranks the pfs substring when both appear.
        assert_eq!(classify_program("hospice-pfs-crosswalk"), Program::Hospice);
    }

    #[test]
    fn rule_type_prefers_proposed_over_final() {
        assert_eq!(classify_rule_type("2023-proposed.xml"), RuleType::Proposed);
        assert_eq!(classify_rule_type("2023-final.xml"), RuleType::Final);
        assert_eq!(
            classify_rule_type("proposed-then-final.xml"),
            RuleType::Proposed
        );
        assert_eq!(classify_rule_type("2023-rule.xml"), RuleType::Unknown);
    }

    #[test]
    fn year_extraction_takes_the_first_20xx_match() {
        assert_eq!(extract_year("cms-2023-final-2024.xml"), Some(2023));
        assert_eq!(extract_year("fy19-snf.xml"), None);
        assert_eq!(extract_year("rule-1999.xml"), None);
    }

    #[test]
    fn preamble_fields_override_nothing_when_absent() {
        let xml = "<RULE><PREAMB></PREAMB></RULE>";
        let document = Document::parse(xml).expect("test xml should parse");
        let metadata = document_metadata("2024-snf-proposed.xml", &document);

        assert_eq!(metadata.program, Program::Snf);
        assert_eq!(metadata.rule_type, RuleType::Proposed);
        assert_eq!(metadata.year, Some(2024));
        assert_eq!(metadata.title, None);
        assert_eq!(metadata.document_id, None);
        assert_eq!(metadata.cfr, None);
        assert_eq!(metadata.effective_date, None);
    }

    #[test]
    fn preamble_fields_are_extracted_and_cleaned() {
        let xml = r#"<RULE>
            <PREAMB>
                <SUBJECT>Medicare  Program;   Hospice Wage Index</SUBJECT>
                <DEPDOC>CMS-1787-F</DEPDOC>
                <CFR>42 CFR Part 418</CFR>
                <EFFDATE><HD SOURCE="HED">DATES:</HD><P>These regulations are effective on October 1, 2023.</P></EFFDATE>
            </PREAMB>
        </RULE>"#;
        let document = Document::parse(xml).expect("test xml should parse");
        let metadata = document_metadata("2023-hospice-final.xml", &document);

        assert_eq!(
            metadata.title.as_deref(),
            Some("Medicare Program; Hospice Wage Index")
        );
        assert_eq!(metadata.document_id.as_deref(), Some("CMS-1787-F"));
        assert_eq!(metadata.cfr.as_deref(), Some("42 CFR Part 418"));
        assert_eq!(
            metadata.effective_date.as_deref(),
            Some("These regulations are effective on October 1, 2023.")
        );
    }

    #[test]
    fn blank_preamble_elements_count_as_missing() {
        let xml = "<RULE><SUBJECT>   </SUBJECT></RULE>";
        let document = Document::parse(xml).expect("test xml should parse");
        let metadata = document_metadata("rule.xml", &document);
        assert_eq!(metadata.title, None);
    }
}
