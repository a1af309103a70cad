//! Streaming reader for the mnemonic tag/subfield serialization consumed by
//! the parser (spec §6, "Ingestion input").
//!
//! One record per blank-line-separated block. Each line is either a control
//! field (`TAG<space>VALUE`, tags below `010`) carrying fixed-position data,
//! or a variable field (`TAG<space>IND1 IND2<subfields>`) where subfields are
//! introduced by `$<code>`. This mirrors the widely used MARC "mnemonic" (.mrk)
//! text view, which keeps the ingestion format UTF-8 and line-oriented without
//! requiring a binary ISO 2709 decoder.

use std::io::BufRead;

use crate::error::{FieldLocation, ParseError};

#[derive(Debug, Clone)]
pub struct RawField {
    pub tag: String,
    pub occurrence: usize,
    pub indicators: [char; 2],
    /// Control fields (tag < "010") carry their fixed-length value here and
    /// an empty subfield list.
    pub control_value: Option<String>,
    pub subfields: Vec<(char, String)>,
}

impl RawField {
    pub fn is_control(&self) -> bool {
        self.control_value.is_some()
    }

    /// First value of the given subfield code, if present.
    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// All values of the given subfield code, in order.
    pub fn subfields_all<'a>(&'a self, code: char) -> impl Iterator<Item = &'a str> {
        self.subfields
            .iter()
            .filter(move |(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub fields: Vec<RawField>,
}

impl RawRecord {
    pub fn field(&self, tag: &str) -> Option<&RawField> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn fields_tagged<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a RawField> {
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn fields_any_tag<'a>(&'a self, tags: &'a [&'a str]) -> impl Iterator<Item = &'a RawField> {
        self.fields.iter().filter(move |f| tags.contains(&f.tag.as_str()))
    }
}

fn parse_line(line: &str, occurrence_for_tag: &mut dyn FnMut(&str) -> usize) -> Option<RawField> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(2, ' ');
    let tag = parts.next()?.trim().to_string();
    // Exactly one separator space between the tag and the rest of the line;
    // indicator characters (which may themselves be blank) follow immediately
    // and must not be trimmed away.
    let rest = parts.next().unwrap_or("");

    let occurrence = occurrence_for_tag(&tag);

    // Control fields: tags "001".."009" carry raw fixed-length content, no subfields.
    if tag.len() == 3 && tag.chars().next() == Some('0') && tag.as_str() < "010" {
        return Some(RawField {
            tag,
            occurrence,
            indicators: [' ', ' '],
            control_value: Some(rest.to_string()),
            subfields: Vec::new(),
        });
    }

    // Variable field: first two non-'$' chars are indicators, rest is subfields.
    let mut chars = rest.chars().peekable();
    let ind1 = chars.next().unwrap_or(' ');
    let ind2 = chars.next().unwrap_or(' ');
    let subfield_text: String = chars.collect();

    let mut subfields = Vec::new();
    for chunk in subfield_text.split('$').filter(|c| !c.is_empty()) {
        let mut cc = chunk.chars();
        if let Some(code) = cc.next() {
            let value: String = cc.collect();
            subfields.push((code, value.trim().to_string()));
        }
    }

    Some(RawField {
        tag,
        occurrence,
        indicators: [ind1, ind2],
        control_value: None,
        subfields,
    })
}

/// Streaming iterator over mnemonic-format records. Consumes any `BufRead`;
/// never holds the whole corpus in memory (spec: "Data flow: raw records ...
/// (lazy sequence)").
pub struct RawRecordReader<R: BufRead> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> RawRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }
}

impl<R: BufRead> Iterator for RawRecordReader<R> {
    type Item = Result<RawRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = RawRecord::default();
        let mut saw_any_line = false;
        let mut occurrence_counts: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();

        loop {
            let mut buf = String::new();
            let read = match self.reader.read_line(&mut buf) {
                Ok(n) => n,
                Err(_) => {
                    return Some(Err(ParseError::MalformedStructure {
                        location: FieldLocation {
                            tag: None,
                            occurrence: None,
                        },
                        reason: "I/O error reading record stream".to_string(),
                    }))
                }
            };
            self.line_no += 1;

            if read == 0 {
                // EOF
                break;
            }

            if buf.trim().is_empty() {
                if saw_any_line {
                    break;
                } else {
                    continue;
                }
            }

            saw_any_line = true;
            if let Some(field) = parse_line(&buf, &mut |tag| {
                let counter = occurrence_counts.entry(tag.to_string()).or_insert(0);
                let occ = *counter;
                *counter += 1;
                occ
            }) {
                record.fields.push(field);
            }
        }

        if !saw_any_line {
            return None;
        }

        Some(Ok(record))
    }
}

/// Convenience entry point over an in-memory string (tests, small batches).
pub fn read_records_str(text: &str) -> Vec<Result<RawRecord, ParseError>> {
    RawRecordReader::new(std::io::Cursor::new(text.as_bytes())).collect()
}
