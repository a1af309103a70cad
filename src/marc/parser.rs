//! Raw record → canonical record (spec §4.1).
//!
//! Deterministic, no network. Fails only when `record_id` cannot be
//! extracted; every other gap becomes an empty sequence or a warning on the
//! record's debug channel.

use std::collections::HashSet;

use super::mnemonic::{RawField, RawRecord};
use crate::error::{FieldLocation, ParseError};
use crate::record::*;

const PERSONAL_TAGS: [&str; 2] = ["100", "700"];
const CORPORATE_TAGS: [&str; 2] = ["110", "710"];
const MEETING_TAGS: [&str; 2] = ["111", "711"];
const MAIN_ENTRY_TAGS: [&str; 3] = ["100", "110", "111"];

fn trim_trailing_punctuation(s: &str) -> String {
    s.trim()
        .trim_end_matches(|c: char| ".,;:/".contains(c))
        .trim()
        .to_string()
}

fn loc(tag: &str, occurrence: usize) -> FieldLocation {
    FieldLocation {
        tag: Some(tag.to_string()),
        occurrence: Some(occurrence),
    }
}

/// Parse one raw record into a canonical record.
pub fn parse(raw: &RawRecord) -> Result<CanonicalRecord, ParseError> {
    let record_id = extract_record_id(raw)?;

    let mut warnings = Vec::new();
    let titles = extract_titles(raw, &mut warnings);
    let imprints = extract_imprints(raw);
    let agents = extract_agents(raw, &mut warnings);
    let subjects = extract_subjects(raw);
    let languages = extract_languages(raw);
    let notes = extract_tagged_text(raw, |t| t.starts_with('5'));
    let physical_descriptions = extract_tagged_text(raw, |t| t == "300");

    Ok(CanonicalRecord {
        record_id,
        titles,
        imprints,
        agents,
        subjects,
        languages,
        notes,
        physical_descriptions,
        warnings,
    })
}

fn extract_record_id(raw: &RawRecord) -> Result<String, ParseError> {
    let field = raw.field("001").ok_or_else(|| ParseError::MissingRecordId {
        location: FieldLocation {
            tag: Some("001".to_string()),
            occurrence: None,
        },
    })?;
    let value = field
        .control_value
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if value.is_empty() {
        return Err(ParseError::MissingRecordId {
            location: loc("001", 0),
        });
    }
    Ok(value.to_string())
}

fn extract_titles(raw: &RawRecord, warnings: &mut Vec<RecordWarning>) -> Vec<Title> {
    let mut titles = Vec::new();

    let main_fields: Vec<&RawField> = raw.fields_tagged("245").collect();
    if let Some(first) = main_fields.first() {
        if main_fields.len() > 1 {
            warnings.push(RecordWarning {
                code: "multiple_main_titles".to_string(),
                message: format!(
                    "{} occurrences of tag 245; using the first",
                    main_fields.len()
                ),
            });
        }
        let parts: Vec<&str> = ['a', 'b', 'n', 'p']
            .iter()
            .filter_map(|code| first.subfield(*code))
            .collect();
        let value = trim_trailing_punctuation(&parts.join(" "));
        titles.push(Title {
            title_type: TitleType::Main,
            value,
            sources: vec![Source {
                tag: "245".to_string(),
                occurrence: first.occurrence,
                subfield: None,
            }],
        });
    }

    for field in raw.fields_any_tag(&["130", "240"]) {
        if let Some(a) = field.subfield('a') {
            titles.push(Title {
                title_type: TitleType::Uniform,
                value: trim_trailing_punctuation(a),
                sources: vec![Source {
                    tag: field.tag.clone(),
                    occurrence: field.occurrence,
                    subfield: Some('a'),
                }],
            });
        }
    }

    for field in raw.fields_tagged("246") {
        if let Some(a) = field.subfield('a') {
            titles.push(Title {
                title_type: TitleType::Variant,
                value: trim_trailing_punctuation(a),
                sources: vec![Source {
                    tag: field.tag.clone(),
                    occurrence: field.occurrence,
                    subfield: Some('a'),
                }],
            });
        }
    }

    titles
}

fn control_008_substr(raw: &RawRecord, start: usize, end: usize) -> Option<String> {
    let field = raw.field("008")?;
    let value = field.control_value.as_deref()?;
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < end {
        return None;
    }
    Some(chars[start..end].iter().collect())
}

/// Fallback raw date string rendered from control field 008 positions 7-14
/// when no tag 260/264 `$c` is present (spec §4.2 accepts "MARC date spans in
/// control field 008" as a recognized input form).
fn date_from_008(raw: &RawRecord) -> Option<String> {
    let date1 = control_008_substr(raw, 7, 11)?;
    let date2 = control_008_substr(raw, 11, 15)?;
    let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    match (is_digits(&date1), is_digits(&date2)) {
        (true, true) if date2 != "9999" && date1 != date2 => Some(format!("{date1}-{date2}")),
        (true, _) => Some(date1),
        _ => None,
    }
}

fn extract_imprints(raw: &RawRecord) -> Vec<Imprint> {
    let country_code = control_008_substr(raw, 15, 18).map(|s| s.trim().to_string());
    let fallback_date = date_from_008(raw);

    raw.fields_any_tag(&["260", "264"])
        .filter(|f| !f.is_control())
        .map(|field| {
            // Raw fields are kept verbatim (minus the subfield tokenizer's own
            // whitespace trim) — punctuation cleanup is a normalizer concern
            // (spec §4.2 base_clean), not a parser one.
            let place_raw = field.subfield('a').map(str::to_string);
            let publisher_raw = field.subfield('b').map(str::to_string);
            let date_raw = field
                .subfield('c')
                .map(str::to_string)
                .or_else(|| fallback_date.clone());
            let manufacturer_raw = field
                .subfield('e')
                .or_else(|| field.subfield('f'))
                .map(str::to_string);

            Imprint {
                occurrence: field.occurrence,
                date_raw,
                place_raw,
                publisher_raw,
                manufacturer_raw,
                country_code: country_code.clone().filter(|s| !s.is_empty()),
                source_tags: vec![Source {
                    tag: field.tag.clone(),
                    occurrence: field.occurrence,
                    subfield: None,
                }],
                date_start: None,
                date_end: None,
                date_label: None,
                date_confidence: 0.0,
                date_method: None,
                place_norm: None,
                place_display: None,
                place_confidence: 0.0,
                place_method: None,
                publisher_norm: None,
                publisher_display: None,
                publisher_confidence: 0.0,
                publisher_method: None,
                country_name: None,
            }
        })
        .filter(|imprint| imprint.has_raw_content())
        .collect()
}

fn assemble_agent_name(agent_type: AgentType, field: &RawField) -> String {
    let a = field.subfield('a').unwrap_or_default();
    match agent_type {
        AgentType::Personal => {
            let mut parts = vec![a.to_string()];
            for code in ['b', 'c'] {
                if let Some(v) = field.subfield(code) {
                    if !v.is_empty() {
                        parts.push(v.to_string());
                    }
                }
            }
            let mut name = parts.join(" ");
            if let Some(d) = field.subfield('d') {
                if !d.is_empty() {
                    name = format!("{name}, {d}");
                }
            }
            trim_trailing_punctuation(&name)
        }
        AgentType::Corporate => {
            let mut parts = vec![a.to_string()];
            if let Some(b) = field.subfield('b') {
                if !b.is_empty() {
                    parts.push(b.to_string());
                }
            }
            trim_trailing_punctuation(&parts.join(". "))
        }
        AgentType::Meeting => {
            let mut parts = vec![a.to_string()];
            for code in ['c', 'd'] {
                if let Some(v) = field.subfield(code) {
                    if !v.is_empty() {
                        parts.push(v.to_string());
                    }
                }
            }
            trim_trailing_punctuation(&parts.join(" "))
        }
    }
}

fn extract_agents(raw: &RawRecord, warnings: &mut Vec<RecordWarning>) -> Vec<Agent> {
    let mut agents = Vec::new();
    let mut index = 0usize;

    for field in &raw.fields {
        let agent_type = if PERSONAL_TAGS.contains(&field.tag.as_str()) {
            AgentType::Personal
        } else if CORPORATE_TAGS.contains(&field.tag.as_str()) {
            AgentType::Corporate
        } else if MEETING_TAGS.contains(&field.tag.as_str()) {
            AgentType::Meeting
        } else {
            continue;
        };

        let value = assemble_agent_name(agent_type, field);
        if value.is_empty() {
            continue;
        }

        let (role_raw, role_source) = if let Some(code) = field.subfield('4') {
            (Some(code.to_string()), RoleSource::RelatorCode)
        } else if let Some(term) = field.subfield('e') {
            (Some(term.to_string()), RoleSource::RelatorTerm)
        } else if MAIN_ENTRY_TAGS.contains(&field.tag.as_str()) {
            (None, RoleSource::InferredFromTag)
        } else {
            (None, RoleSource::Unknown)
        };

        let authority_occurrences: Vec<&str> = field.subfields_all('0').collect();
        if authority_occurrences.len() > 1 {
            warnings.push(RecordWarning {
                code: "multiple_authority_uris".to_string(),
                message: format!(
                    "tag {} occurrence {} has {} $0 subfields; using the first",
                    field.tag,
                    field.occurrence,
                    authority_occurrences.len()
                ),
            });
        }
        let authority_uri = authority_occurrences.first().map(|s| s.to_string());

        agents.push(Agent {
            agent_index: index,
            agent_type,
            value,
            role_raw,
            role_source,
            authority_uri,
            sources: vec![Source {
                tag: field.tag.clone(),
                occurrence: field.occurrence,
                subfield: None,
            }],
            agent_norm: None,
            agent_confidence: 0.0,
            agent_method: None,
            agent_notes: None,
            role_norm: None,
            role_confidence: 0.0,
            role_method: None,
        });
        index += 1;
    }

    agents
}

fn extract_subjects(raw: &RawRecord) -> Vec<Subject> {
    raw.fields
        .iter()
        .filter(|f| f.tag.len() == 3 && f.tag.starts_with('6') && !f.is_control())
        .map(|field| {
            let mut parts = SubjectParts::default();
            let mut display_parts = Vec::new();
            for (code, value) in &field.subfields {
                match code {
                    'a' => {
                        parts.a.push(value.clone());
                        display_parts.push(value.clone());
                    }
                    'v' => {
                        parts.v.push(value.clone());
                        display_parts.push(value.clone());
                    }
                    'x' => {
                        parts.x.push(value.clone());
                        display_parts.push(value.clone());
                    }
                    'y' => {
                        parts.y.push(value.clone());
                        display_parts.push(value.clone());
                    }
                    'z' => {
                        parts.z.push(value.clone());
                        display_parts.push(value.clone());
                    }
                    '6' | '8' => {}
                    _ => {}
                }
            }

            Subject {
                value: trim_trailing_punctuation(&display_parts.join(" -- ")),
                source_tag: field.tag.clone(),
                scheme: field.subfield('2').map(str::to_string),
                heading_lang: field.subfield('9').map(str::to_string),
                authority_uri: field.subfield('0').map(str::to_string),
                parts,
                sources: vec![Source {
                    tag: field.tag.clone(),
                    occurrence: field.occurrence,
                    subfield: None,
                }],
            }
        })
        .filter(|s| !s.value.is_empty())
        .collect()
}

fn extract_languages(raw: &RawRecord) -> Vec<LanguageEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for field in raw.fields_tagged("041") {
        for code in field.subfields_all('a') {
            let code = code.trim().to_lowercase();
            if !code.is_empty() && seen.insert(code.clone()) {
                out.push(LanguageEntry {
                    code,
                    source: Source {
                        tag: "041".to_string(),
                        occurrence: field.occurrence,
                        subfield: Some('a'),
                    },
                });
            }
        }
    }

    if let Some(code) = control_008_substr(raw, 35, 38) {
        let code = code.trim().to_lowercase();
        if !code.is_empty() && seen.insert(code.clone()) {
            out.push(LanguageEntry {
                code,
                source: Source {
                    tag: "008".to_string(),
                    occurrence: 0,
                    subfield: None,
                },
            });
        }
    }

    out
}

fn extract_tagged_text(raw: &RawRecord, mut select: impl FnMut(&str) -> bool) -> Vec<TaggedText> {
    raw.fields
        .iter()
        .filter(|f| !f.is_control() && select(&f.tag))
        .filter_map(|field| {
            let parts: Vec<&str> = ['a', 'b', 'c', 'e']
                .iter()
                .filter_map(|code| field.subfield(*code))
                .collect();
            if parts.is_empty() {
                return None;
            }
            Some(TaggedText {
                tag: field.tag.clone(),
                value: trim_trailing_punctuation(&parts.join(" ")),
                sources: vec![Source {
                    tag: field.tag.clone(),
                    occurrence: field.occurrence,
                    subfield: None,
                }],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::mnemonic::read_records_str;
    use super::*;

    fn sample() -> RawRecord {
        let text = "\
001 rb0001234
008 850101s1502    it 00000000000000000ita d
245 10$aDe revolutionibus orbium coelestium.$bliber sextus.
260 1 $aVenetiis :$bapud Aldum,$c1502.
700 1 $aManutius, Aldus,$4prt
600 10$aCopernicus, Nicolaus,$d1473-1543.$2naf
041   $aita
";
        read_records_str(text).remove(0).unwrap()
    }

    #[test]
    fn extracts_record_id() {
        let record = parse(&sample()).unwrap();
        assert_eq!(record.record_id, "rb0001234");
    }

    #[test]
    fn missing_record_id_is_fatal() {
        let raw = read_records_str("245 10$aNo id here.\n").remove(0).unwrap();
        let err = parse(&raw).unwrap_err();
        assert_eq!(err.kind(), "missing_record_id");
    }

    #[test]
    fn main_title_joins_subfields_and_trims_punctuation() {
        let record = parse(&sample()).unwrap();
        let title = record.main_title().unwrap();
        assert_eq!(
            title.value,
            "De revolutionibus orbium coelestium. liber sextus"
        );
    }

    #[test]
    fn imprint_has_place_publisher_date_and_country() {
        let record = parse(&sample()).unwrap();
        assert_eq!(record.imprints.len(), 1);
        let imprint = &record.imprints[0];
        assert_eq!(imprint.place_raw.as_deref(), Some("Venetiis :"));
        assert_eq!(imprint.publisher_raw.as_deref(), Some("apud Aldum,"));
        assert_eq!(imprint.date_raw.as_deref(), Some("1502."));
        assert_eq!(imprint.country_code.as_deref(), Some("it"));
    }

    #[test]
    fn agent_role_from_relator_code() {
        let record = parse(&sample()).unwrap();
        let agent = record
            .agents
            .iter()
            .find(|a| a.value.starts_with("Manutius"))
            .unwrap();
        assert_eq!(agent.role_raw.as_deref(), Some("prt"));
        assert_eq!(agent.role_source, RoleSource::RelatorCode);
    }

    #[test]
    fn subject_parts_and_scheme() {
        let record = parse(&sample()).unwrap();
        assert_eq!(record.subjects.len(), 1);
        assert_eq!(record.subjects[0].scheme.as_deref(), Some("naf"));
        assert!(record.subjects[0].value.contains("Copernicus"));
    }

    #[test]
    fn languages_dedup_across_041_and_008() {
        let record = parse(&sample()).unwrap();
        assert_eq!(record.languages.len(), 1);
        assert_eq!(record.languages[0].code, "ita");
    }
}
