//! Case document parsing
//!
//! Parses one `.dentalProject` XML document into a normalized summary of
//! patient, practice, work types, and the teeth involved. Recognizes full
//! arches and filters out antagonist-only entries.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Tooth-entry child elements that never describe a reconstruction type
const NON_DIAGNOSTIC_TAGS: &[&str] = &[
    "Number",
    "Parameters",
    "MaterialName",
    "Material",
    "ImplantType",
    "PreparationType",
    "Color",
    "MesialConnector",
    "ScanAbutmentScan",
    "SeparateGingivaScan",
    "SituScan",
];

/// Normalized summary of one case document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseSummary {
    /// Patient display name, with the case id appended when present
    pub patient: String,
    /// Practice name, empty if the document carries none
    pub practice: String,
    /// Deduplicated, alphabetized work-type list ("Crown, Veneer")
    pub work_type: String,
    /// Teeth involved, with full arches collapsed ("Full Arch Upper, 44, 45")
    pub teeth: String,
    /// Raw case id from the document
    pub case_id: String,
}

impl CaseSummary {
    /// Sentinel summary for a case document that failed to parse.
    /// The project record still exists; only the metadata is degraded.
    pub fn parse_error(base_name: &str) -> Self {
        Self {
            patient: base_name.to_string(),
            practice: "N/A".to_string(),
            work_type: "Parse Error".to_string(),
            teeth: "?".to_string(),
            case_id: String::new(),
        }
    }

    /// Sentinel summary for a folder with no case document at all
    pub fn unavailable(folder_name: &str) -> Self {
        Self {
            patient: folder_name.to_string(),
            practice: "N/A".to_string(),
            work_type: "N/A".to_string(),
            teeth: "?".to_string(),
            case_id: String::new(),
        }
    }
}

/// Parse a case document into a [`CaseSummary`].
///
/// Any failure (missing file, unreadable, malformed XML) is returned as an
/// error; callers substitute a sentinel summary and keep the record.
pub fn parse_case_file(path: &Path) -> Result<CaseSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read case document: {}", path.display()))?;

    let doc = roxmltree::Document::parse(&content)
        .with_context(|| format!("Malformed case document: {}", path.display()))?;

    let raw_name = nested_text(&doc, "Patient", "PatientName").unwrap_or("?");
    let patient_name = raw_name
        .split(',')
        .map(str::trim)
        .find(|p| !p.is_empty())
        .unwrap_or("Patient N/A")
        .to_string();
    let case_id = nested_text(&doc, "Patient", "PatientFirstName")
        .unwrap_or("")
        .trim()
        .to_string();
    let practice = nested_text(&doc, "Practice", "PracticeName")
        .unwrap_or("")
        .trim()
        .to_string();

    let mut work_types = BTreeSet::new();
    let mut teeth_numbers = BTreeSet::new();
    let mut saw_antagonist = false;

    for tooth in doc
        .descendants()
        .filter(|n| n.has_tag_name("Tooth") && n.parent().is_some_and(|p| p.has_tag_name("Teeth")))
    {
        let Some(recon_type) = reconstruction_type(&tooth) else {
            continue;
        };

        if recon_type.eq_ignore_ascii_case("antagonist") {
            saw_antagonist = true;
            continue;
        }

        if let Some(num_text) = element_text(&tooth, "Number") {
            if let Ok(num) = num_text.trim().parse::<i32>() {
                teeth_numbers.insert(num);
            }
        }
        work_types.insert(display_work_type(recon_type));
    }

    let teeth: Vec<i32> = teeth_numbers.into_iter().collect();
    let tooth_str = summarize_teeth(&teeth);

    let work_str = if !work_types.is_empty() {
        work_types.into_iter().collect::<Vec<_>>().join(", ")
    } else if saw_antagonist {
        "Antagonist?".to_string()
    } else {
        "Type N/A".to_string()
    };

    let patient = if case_id.is_empty() {
        patient_name
    } else {
        format!("{} ({})", patient_name, case_id)
    };

    Ok(CaseSummary {
        patient,
        practice,
        work_type: work_str,
        teeth: tooth_str,
        case_id,
    })
}

/// Parse with sentinel fallback: never fails, logs and degrades instead
pub fn parse_or_sentinel(path: &Path, base_name: &str) -> CaseSummary {
    match parse_case_file(path) {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Case document parse failed for {}: {:#}", path.display(), e);
            CaseSummary::parse_error(base_name)
        }
    }
}

/// Render a sorted tooth-number set, collapsing full arches.
///
/// Upper jaw is 11-28, lower is 31-48; a side with at least 8 distinct teeth
/// renders as "Full Arch Upper/Lower", otherwise as a comma list. Numbers
/// outside both ranges are appended verbatim. "?" when empty.
pub fn summarize_teeth(numbers: &[i32]) -> String {
    let upper: Vec<i32> = numbers
        .iter()
        .copied()
        .filter(|t| (11..=28).contains(t))
        .collect();
    let lower: Vec<i32> = numbers
        .iter()
        .copied()
        .filter(|t| (31..=48).contains(t))
        .collect();
    let other: Vec<i32> = numbers
        .iter()
        .copied()
        .filter(|t| !(11..=28).contains(t) && !(31..=48).contains(t))
        .collect();

    let mut parts = Vec::new();

    if upper.len() >= 8 {
        parts.push("Full Arch Upper".to_string());
    } else if !upper.is_empty() {
        parts.push(join_numbers(&upper));
    }

    if lower.len() >= 8 {
        parts.push("Full Arch Lower".to_string());
    } else if !lower.is_empty() {
        parts.push(join_numbers(&lower));
    }

    if !other.is_empty() {
        parts.push(join_numbers(&other));
    }

    if parts.is_empty() {
        "?".to_string()
    } else {
        parts.join(", ")
    }
}

fn join_numbers(numbers: &[i32]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a tooth entry's reconstruction type: the explicit field when
/// present, otherwise the tag name of the first diagnostic child element
fn reconstruction_type<'a>(tooth: &roxmltree::Node<'a, '_>) -> Option<&'a str> {
    if let Some(explicit) = element_text(tooth, "ReconstructionType") {
        let explicit = explicit.trim();
        if !explicit.is_empty() {
            return Some(explicit);
        }
    }

    tooth
        .children()
        .filter(|c| c.is_element())
        .map(|c| c.tag_name().name())
        .find(|tag| !NON_DIAGNOSTIC_TAGS.contains(tag))
}

/// "telescopic_crown" -> "Telescopic Crown"
fn display_work_type(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text<'a>(node: &roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
}

fn nested_text<'d>(doc: &'d roxmltree::Document<'_>, parent: &str, child: &str) -> Option<&'d str> {
    doc.descendants()
        .find(|n| n.has_tag_name(parent))
        .and_then(|n| element_text(&n, child))
}
