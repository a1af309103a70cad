//! Normalizer: fills in the confidence-scored, method-tagged fields the
//! parser leaves empty, without ever touching a `*_raw` value (spec §3.2,
//! §4.2).

pub mod agents;
pub mod alias_builder;
pub mod alias_map;
pub mod country;
pub mod dates;
pub mod place;

use crate::record::CanonicalRecord;
use alias_map::AliasMap;

/// Alias tables for the three attributes that go through the alias-map
/// layer. Each is independently built and versioned offline.
#[derive(Debug, Clone, Default)]
pub struct AliasTables {
    pub places: AliasMap,
    pub publishers: AliasMap,
    pub agents: AliasMap,
}

/// Normalize every imprint, agent, and role on `record` in place. Titles,
/// subjects, and languages pass through untouched: the spec normalizes
/// only dates, places, publishers, and agent names/roles.
pub fn normalize_record(record: &mut CanonicalRecord, tables: &AliasTables) {
    for imprint in &mut record.imprints {
        if let Some(raw) = imprint.date_raw.as_deref() {
            let d = dates::normalize_date(raw);
            imprint.date_start = d.date_start;
            imprint.date_end = d.date_end;
            imprint.date_label = Some(d.label);
            imprint.date_confidence = d.confidence;
            imprint.date_method = Some(d.method);
        }

        if let Some(raw) = imprint.place_raw.as_deref() {
            let p = place::normalize_place_or_publisher(raw, &tables.places);
            imprint.place_norm = p.norm;
            imprint.place_display = p.display;
            imprint.place_confidence = p.confidence;
            imprint.place_method = p.method;
        }

        if let Some(raw) = imprint.publisher_raw.as_deref() {
            let p = place::normalize_place_or_publisher(raw, &tables.publishers);
            imprint.publisher_norm = p.norm;
            imprint.publisher_display = p.display;
            imprint.publisher_confidence = p.confidence;
            imprint.publisher_method = p.method;
        }

        imprint.country_name = country::country_name(imprint.country_code.as_deref());
    }

    for agent in &mut record.agents {
        let n = agents::normalize_agent_name(&agent.value, &tables.agents);
        agent.agent_norm = n.norm;
        agent.agent_confidence = n.confidence;
        agent.agent_method = n.method;
        if n.ambiguous {
            agent.agent_notes = Some("alias map resolved this name as ambiguous".to_string());
        }

        let r = agents::normalize_role(agent.role_raw.as_deref(), agent.role_source);
        agent.role_norm = r.role_norm;
        agent.role_confidence = r.confidence;
        agent.role_method = Some(r.method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::*;

    fn sample_record() -> CanonicalRecord {
        CanonicalRecord {
            record_id: "r1".to_string(),
            titles: vec![],
            imprints: vec![Imprint {
                occurrence: 0,
                date_raw: Some("1502.".to_string()),
                place_raw: Some("[Venetiis :]".to_string()),
                publisher_raw: Some("apud Aldum".to_string()),
                manufacturer_raw: None,
                country_code: Some("it".to_string()),
                source_tags: vec![],
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
            }],
            agents: vec![Agent {
                agent_index: 0,
                agent_type: AgentType::Personal,
                value: "Manutius, Aldus".to_string(),
                role_raw: Some("aut".to_string()),
                role_source: RoleSource::RelatorCode,
                authority_uri: None,
                sources: vec![],
                agent_norm: None,
                agent_confidence: 0.0,
                agent_method: None,
                agent_notes: None,
                role_norm: None,
                role_confidence: 0.0,
                role_method: None,
            }],
            subjects: vec![],
            languages: vec![],
            notes: vec![],
            physical_descriptions: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn normalizes_imprint_and_agent_fields() {
        let mut record = sample_record();
        normalize_record(&mut record, &AliasTables::default());

        let imprint = &record.imprints[0];
        assert_eq!(imprint.date_start, Some(1502));
        assert_eq!(imprint.place_display.as_deref(), Some("Venetiis"));
        assert_eq!(imprint.publisher_display.as_deref(), Some("apud Aldum"));
        assert_eq!(imprint.country_name.as_deref(), Some("Italy"));

        let agent = &record.agents[0];
        assert_eq!(agent.agent_norm.as_deref(), Some("manutius, aldus"));
        assert_eq!(agent.role_norm, Some(RoleNorm::Author));
        assert_eq!(agent.role_confidence, 0.99);
    }

    #[test]
    fn leaves_raw_fields_untouched() {
        let mut record = sample_record();
        normalize_record(&mut record, &AliasTables::default());
        assert_eq!(record.imprints[0].place_raw.as_deref(), Some("[Venetiis :]"));
    }
}
