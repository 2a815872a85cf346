use super::{SUMMARY_END_MARKER, SUMMARY_START_MARKER};
use crate::models::Section;
use std::collections::BTreeMap;

/// Sections recovered from a raw LLM report
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedReport {
    pub sections: BTreeMap<Section, String>,
    pub summary: Option<String>,
    /// Required sections that were not found or were empty
    pub missing: Vec<Section>,
}

impl ParsedReport {
    pub fn is_structured(&self) -> bool {
        self.missing.is_empty()
    }
}

struct Heading {
    level: usize,
    text: String,
}

/// `# Title`, `### 2. Title`, or a whole-line `**Title**`
fn heading(line: &str) -> Option<Heading> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let rest = &trimmed[level..];
        if level <= 6 && (rest.is_empty() || rest.starts_with(' ')) {
            return Some(Heading {
                level,
                text: rest.trim().to_string(),
            });
        }
        return None;
    }

    let inner = trimmed.strip_prefix("**")?.strip_suffix("**")?;
    let inner = inner.trim_end_matches(':').trim();
    if inner.is_empty() || inner.contains("**") {
        return None;
    }
    // Bold lines only count when they name a section, see `parse_report`
    Some(Heading {
        level: 7,
        text: inner.to_string(),
    })
}

/// Lowercase, drop numbering and punctuation, collapse whitespace
pub(crate) fn normalize_heading(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !is_numbering(w))
        .unwrap_or(words.len());
    words[start..].join(" ")
}

fn is_numbering(word: &str) -> bool {
    word.chars().all(|c| c.is_ascii_digit())
        || matches!(word, "i" | "ii" | "iii" | "iv" | "v" | "vi" | "vii" | "viii" | "ix" | "x")
}

/// Best section for a normalized heading. Exact alias matches win, then the
/// longest alias contained as whole words.
pub(crate) fn match_section(normalized: &str) -> Option<Section> {
    if normalized.is_empty() {
        return None;
    }
    let padded = format!(" {} ", normalized);

    let mut best: Option<(Section, usize)> = None;
    for section in Section::ALL {
        let title = section.title().to_lowercase();
        let candidates = std::iter::once(title.as_str()).chain(section.aliases().iter().copied());
        for alias in candidates {
            let score = if normalized == alias {
                usize::MAX
            } else if padded.contains(&format!(" {} ", alias)) {
                alias.len()
            } else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((section, score));
            }
        }
    }
    best.map(|(section, _)| section)
}

fn extract_summary(raw: &str) -> (Option<String>, String) {
    let Some(start) = raw.find(SUMMARY_START_MARKER) else {
        return (None, raw.to_string());
    };
    let after = start + SUMMARY_START_MARKER.len();
    let Some(len) = raw[after..].find(SUMMARY_END_MARKER) else {
        return (None, raw.to_string());
    };

    let summary = raw[after..after + len].trim();
    let rest = format!("{}{}", &raw[..start], &raw[after + len + SUMMARY_END_MARKER.len()..]);
    let summary = (!summary.is_empty()).then(|| summary.to_string());
    (summary, rest)
}

/// Split a raw report into sections. Never fails: text that cannot be
/// mapped simply leaves sections missing.
pub fn parse_report(raw: &str, required: &[Section]) -> ParsedReport {
    let (summary, body) = extract_summary(raw);

    let mut sections: BTreeMap<Section, String> = BTreeMap::new();
    let mut current: Option<(Section, usize)> = None;
    let mut buffer: Vec<&str> = Vec::new();

    let mut flush = |current: Option<(Section, usize)>, buffer: &mut Vec<&str>| {
        if let Some((section, _)) = current {
            let text = buffer.join("\n").trim().to_string();
            if !text.is_empty() {
                sections
                    .entry(section)
                    .and_modify(|existing| {
                        existing.push_str("\n\n");
                        existing.push_str(&text);
                    })
                    .or_insert(text);
            }
        }
        buffer.clear();
    };

    for line in body.lines() {
        let Some(h) = heading(line) else {
            buffer.push(line);
            continue;
        };

        // Sub-headings stay inside the current section even when they
        // happen to name another one
        if matches!(current, Some((_, level)) if h.level > level) {
            buffer.push(line);
            continue;
        }

        match match_section(&normalize_heading(&h.text)) {
            Some(section) => {
                flush(current, &mut buffer);
                current = Some((section, h.level));
            }
            // Bold text that names no section is ordinary content
            None if h.level > 6 => buffer.push(line),
            None => {
                flush(current, &mut buffer);
                current = None;
            }
        }
    }
    flush(current, &mut buffer);

    let missing = required
        .iter()
        .filter(|s| !sections.contains_key(s))
        .copied()
        .collect();

    ParsedReport {
        sections,
        summary,
        missing,
    }
}
