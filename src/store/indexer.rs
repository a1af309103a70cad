//! Upsert a [`CanonicalRecord`] into the relational store (spec §3.3,
//! §5): re-indexing a known `record_id` replaces all of its child rows
//! rather than accumulating duplicates.

use sqlx::PgPool;

use crate::record::CanonicalRecord;

/// Index (insert or fully replace) one record. Runs inside a single
/// transaction: either every child table reflects the new record, or
/// none of them do.
pub async fn index_record(pool: &PgPool, record: &CanonicalRecord) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO records (record_id, indexed_at) VALUES ($1, now()) \
         ON CONFLICT (record_id) DO UPDATE SET indexed_at = now()",
    )
    .bind(&record.record_id)
    .execute(&mut *tx)
    .await?;

    for table in [
        "titles",
        "imprints",
        "agents",
        "subjects",
        "languages",
        "notes",
        "physical_descriptions",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE record_id = $1"))
            .bind(&record.record_id)
            .execute(&mut *tx)
            .await?;
    }

    for title in &record.titles {
        let sources = serde_json::to_value(&title.sources).unwrap_or_default();
        sqlx::query("INSERT INTO titles (record_id, title_type, value, sources) VALUES ($1, $2, $3, $4)")
            .bind(&record.record_id)
            .bind(title_type_str(title.title_type))
            .bind(&title.value)
            .bind(sources)
            .execute(&mut *tx)
            .await?;
    }

    for imprint in &record.imprints {
        let sources = serde_json::to_value(&imprint.source_tags).unwrap_or_default();
        sqlx::query(
            "INSERT INTO imprints (
                record_id, occurrence, date_raw, place_raw, publisher_raw, manufacturer_raw,
                country_code, date_start, date_end, date_label, date_confidence, date_method,
                place_norm, place_display, place_confidence, place_method,
                publisher_norm, publisher_display, publisher_confidence, publisher_method,
                country_name, sources
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)",
        )
        .bind(&record.record_id)
        .bind(imprint.occurrence as i32)
        .bind(&imprint.date_raw)
        .bind(&imprint.place_raw)
        .bind(&imprint.publisher_raw)
        .bind(&imprint.manufacturer_raw)
        .bind(&imprint.country_code)
        .bind(imprint.date_start)
        .bind(imprint.date_end)
        .bind(&imprint.date_label)
        .bind(imprint.date_confidence)
        .bind(imprint.date_method.map(|m| m.as_str()))
        .bind(&imprint.place_norm)
        .bind(&imprint.place_display)
        .bind(imprint.place_confidence)
        .bind(imprint.place_method.map(place_method_str))
        .bind(&imprint.publisher_norm)
        .bind(&imprint.publisher_display)
        .bind(imprint.publisher_confidence)
        .bind(imprint.publisher_method.map(place_method_str))
        .bind(&imprint.country_name)
        .bind(sources)
        .execute(&mut *tx)
        .await?;
    }

    for agent in &record.agents {
        let sources = serde_json::to_value(&agent.sources).unwrap_or_default();
        sqlx::query(
            "INSERT INTO agents (
                record_id, agent_index, agent_type, value, role_raw, role_source, authority_uri,
                agent_norm, agent_confidence, agent_method, agent_notes,
                role_norm, role_confidence, role_method, sources
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
        )
        .bind(&record.record_id)
        .bind(agent.agent_index as i32)
        .bind(agent_type_str(agent.agent_type))
        .bind(&agent.value)
        .bind(&agent.role_raw)
        .bind(role_source_str(agent.role_source))
        .bind(&agent.authority_uri)
        .bind(&agent.agent_norm)
        .bind(agent.agent_confidence)
        .bind(agent.agent_method.map(place_method_str))
        .bind(&agent.agent_notes)
        .bind(agent.role_norm.map(|r| r.as_str()))
        .bind(agent.role_confidence)
        .bind(agent.role_method.map(role_method_str))
        .bind(sources)
        .execute(&mut *tx)
        .await?;
    }

    for subject in &record.subjects {
        let sources = serde_json::to_value(&subject.sources).unwrap_or_default();
        sqlx::query(
            "INSERT INTO subjects (record_id, value, source_tag, scheme, heading_lang, authority_uri, sources) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(&record.record_id)
        .bind(&subject.value)
        .bind(&subject.source_tag)
        .bind(&subject.scheme)
        .bind(&subject.heading_lang)
        .bind(&subject.authority_uri)
        .bind(sources)
        .execute(&mut *tx)
        .await?;
    }

    for language in &record.languages {
        sqlx::query("INSERT INTO languages (record_id, code) VALUES ($1, $2)")
            .bind(&record.record_id)
            .bind(&language.code)
            .execute(&mut *tx)
            .await?;
    }

    for note in &record.notes {
        sqlx::query("INSERT INTO notes (record_id, tag, value) VALUES ($1, $2, $3)")
            .bind(&record.record_id)
            .bind(&note.tag)
            .bind(&note.value)
            .execute(&mut *tx)
            .await?;
    }

    for phys in &record.physical_descriptions {
        sqlx::query("INSERT INTO physical_descriptions (record_id, tag, value) VALUES ($1, $2, $3)")
            .bind(&record.record_id)
            .bind(&phys.tag)
            .bind(&phys.value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

fn title_type_str(t: crate::record::TitleType) -> &'static str {
    match t {
        crate::record::TitleType::Main => "main",
        crate::record::TitleType::Uniform => "uniform",
        crate::record::TitleType::Variant => "variant",
    }
}

fn agent_type_str(t: crate::record::AgentType) -> &'static str {
    match t {
        crate::record::AgentType::Personal => "personal",
        crate::record::AgentType::Corporate => "corporate",
        crate::record::AgentType::Meeting => "meeting",
    }
}

fn role_source_str(s: crate::record::RoleSource) -> &'static str {
    match s {
        crate::record::RoleSource::RelatorCode => "relator_code",
        crate::record::RoleSource::RelatorTerm => "relator_term",
        crate::record::RoleSource::InferredFromTag => "inferred_from_tag",
        crate::record::RoleSource::Unknown => "unknown",
    }
}

fn role_method_str(m: crate::record::RoleMethod) -> &'static str {
    match m {
        crate::record::RoleMethod::RelatorCode => "relator_code",
        crate::record::RoleMethod::RelatorTerm => "relator_term",
        crate::record::RoleMethod::Unmapped => "unmapped",
        crate::record::RoleMethod::MissingRole => "missing_role",
    }
}

fn place_method_str(m: crate::record::PlaceMethod) -> &'static str {
    match m {
        crate::record::PlaceMethod::BaseClean => "base_clean",
        crate::record::PlaceMethod::AliasMap => "alias_map",
    }
}
