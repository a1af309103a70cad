use serde::{Deserialize, Serialize};

/// A pointer back to the originating field in the raw record (spec §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub tag: String,
    pub occurrence: usize,
    pub subfield: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleType {
    Main,
    Uniform,
    Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    #[serde(rename = "type")]
    pub title_type: TitleType,
    pub value: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceMethod {
    BaseClean,
    AliasMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMethod {
    ExactYear,
    ExplicitRange,
    CenturyOrDecade,
    UncertainBracketed,
    Unparsed,
}

impl DateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateMethod::ExactYear => "exact_year",
            DateMethod::ExplicitRange => "explicit_range",
            DateMethod::CenturyOrDecade => "century_or_decade",
            DateMethod::UncertainBracketed => "uncertain_bracketed",
            DateMethod::Unparsed => "unparsed",
        }
    }
}

/// One publication/imprint occurrence (tag 260/264), with normalization
/// attachments added alongside the raw values (spec §3.1, §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imprint {
    pub occurrence: usize,
    pub date_raw: Option<String>,
    pub place_raw: Option<String>,
    pub publisher_raw: Option<String>,
    pub manufacturer_raw: Option<String>,
    pub country_code: Option<String>,
    pub source_tags: Vec<Source>,

    // Normalized attachments
    pub date_start: Option<i32>,
    pub date_end: Option<i32>,
    pub date_label: Option<String>,
    pub date_confidence: f32,
    pub date_method: Option<DateMethod>,

    pub place_norm: Option<String>,
    pub place_display: Option<String>,
    pub place_confidence: f32,
    pub place_method: Option<PlaceMethod>,

    pub publisher_norm: Option<String>,
    pub publisher_display: Option<String>,
    pub publisher_confidence: f32,
    pub publisher_method: Option<PlaceMethod>,

    pub country_name: Option<String>,
}

impl Imprint {
    /// Invariant (spec §3.1): at least one raw field is non-empty.
    pub fn has_raw_content(&self) -> bool {
        [
            &self.date_raw,
            &self.place_raw,
            &self.publisher_raw,
            &self.manufacturer_raw,
        ]
        .iter()
        .any(|v| v.as_ref().is_some_and(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Personal,
    Corporate,
    Meeting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    RelatorCode,
    RelatorTerm,
    InferredFromTag,
    Unknown,
}

/// Controlled role vocabulary (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleNorm {
    Author,
    Printer,
    Publisher,
    Translator,
    Editor,
    Illustrator,
    Commentator,
    Scribe,
    FormerOwner,
    Dedicatee,
    Bookseller,
    Engraver,
    Binder,
    Annotator,
    Other,
}

impl RoleNorm {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleNorm::Author => "author",
            RoleNorm::Printer => "printer",
            RoleNorm::Publisher => "publisher",
            RoleNorm::Translator => "translator",
            RoleNorm::Editor => "editor",
            RoleNorm::Illustrator => "illustrator",
            RoleNorm::Commentator => "commentator",
            RoleNorm::Scribe => "scribe",
            RoleNorm::FormerOwner => "former_owner",
            RoleNorm::Dedicatee => "dedicatee",
            RoleNorm::Bookseller => "bookseller",
            RoleNorm::Engraver => "engraver",
            RoleNorm::Binder => "binder",
            RoleNorm::Annotator => "annotator",
            RoleNorm::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "author" => RoleNorm::Author,
            "printer" => RoleNorm::Printer,
            "publisher" => RoleNorm::Publisher,
            "translator" => RoleNorm::Translator,
            "editor" => RoleNorm::Editor,
            "illustrator" => RoleNorm::Illustrator,
            "commentator" => RoleNorm::Commentator,
            "scribe" => RoleNorm::Scribe,
            "former_owner" => RoleNorm::FormerOwner,
            "dedicatee" => RoleNorm::Dedicatee,
            "bookseller" => RoleNorm::Bookseller,
            "engraver" => RoleNorm::Engraver,
            "binder" => RoleNorm::Binder,
            "annotator" => RoleNorm::Annotator,
            "other" => RoleNorm::Other,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMethod {
    RelatorCode,
    RelatorTerm,
    Unmapped,
    MissingRole,
}

/// An agent (person, corporate body, or meeting) associated with a record
/// (spec §3.1, §3.2). `agent_index` is stable across the record's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_index: usize,
    pub agent_type: AgentType,
    pub value: String,
    pub role_raw: Option<String>,
    pub role_source: RoleSource,
    pub authority_uri: Option<String>,
    pub sources: Vec<Source>,

    pub agent_norm: Option<String>,
    pub agent_confidence: f32,
    pub agent_method: Option<PlaceMethod>,
    pub agent_notes: Option<String>,

    pub role_norm: Option<RoleNorm>,
    pub role_confidence: f32,
    pub role_method: Option<RoleMethod>,
}

/// Structured decomposition of a subject heading (spec §3.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectParts {
    pub a: Vec<String>,
    pub v: Vec<String>,
    pub x: Vec<String>,
    pub y: Vec<String>,
    pub z: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub value: String,
    pub source_tag: String,
    pub scheme: Option<String>,
    pub heading_lang: Option<String>,
    pub authority_uri: Option<String>,
    pub parts: SubjectParts,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
    pub source: Source,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedText {
    pub tag: String,
    pub value: String,
    pub sources: Vec<Source>,
}

/// A warning attached to a record's debug channel (spec §4.1, §7): parse and
/// normalization problems never fail the job, they are recorded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordWarning {
    pub code: String,
    pub message: String,
}

/// The canonical record produced by the parser (spec §3.1), later enriched
/// in-place by the normalizer (spec §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub record_id: String,
    pub titles: Vec<Title>,
    pub imprints: Vec<Imprint>,
    pub agents: Vec<Agent>,
    pub subjects: Vec<Subject>,
    pub languages: Vec<LanguageEntry>,
    pub notes: Vec<TaggedText>,
    pub physical_descriptions: Vec<TaggedText>,
    pub warnings: Vec<RecordWarning>,
}

impl CanonicalRecord {
    pub fn main_title(&self) -> Option<&Title> {
        self.titles.iter().find(|t| t.title_type == TitleType::Main)
    }
}
