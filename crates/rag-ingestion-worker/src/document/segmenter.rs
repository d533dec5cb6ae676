use pulldown_cmark::{Event, Options, Parser, Tag};

/// Ordered slice of a markdown document: prose or a table, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Table(String),
}

impl Segment {
    pub fn content(&self) -> &str {
        match self {
            Self::Text(content) | Self::Table(content) => content,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }
}

/// Splits markdown into an ordered TEXT/TABLE segment sequence.
///
/// Tables are located by their source byte ranges (CommonMark with tables
/// enabled); the gaps in between become text segments, dropped when they
/// are whitespace only. Joining all segment contents with `\n` reproduces
/// the document up to those empty gaps: each segment sheds exactly the one
/// trailing newline the join re-inserts.
pub fn extract_tables_and_text(text: &str) -> Vec<Segment> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);

    let mut table_ranges: Vec<std::ops::Range<usize>> = Parser::new_ext(text, options)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::Table(_)) => Some(range),
            _ => None,
        })
        .collect();
    table_ranges.sort_by_key(|r| r.start);

    let mut segments = Vec::new();
    let mut cursor = 0;

    for range in table_ranges {
        if range.start > cursor {
            push_text(&mut segments, &text[cursor..range.start]);
        }

        segments.push(Segment::Table(shed_join_newline(&text[range.start..range.end])));

        cursor = range.end;
    }

    if cursor < text.len() {
        push_text(&mut segments, &text[cursor..]);
    }

    segments
}

fn push_text(segments: &mut Vec<Segment>, gap: &str) {
    if !gap.trim().is_empty() {
        segments.push(Segment::Text(shed_join_newline(gap)));
    }
}

fn shed_join_newline(slice: &str) -> String {
    slice.strip_suffix('\n').unwrap_or(slice).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "A\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nB";

    #[test]
    fn splits_around_a_table() {
        let segments = extract_tables_and_text(DOC);
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].content().trim(), "A");
        assert!(segments[1].is_table());
        assert!(segments[1].content().contains("| a | b |"));
        assert!(segments[1].content().contains("| 1 | 2 |"));
        assert_eq!(segments[2].content().trim(), "B");
    }

    #[test]
    fn text_only_document_is_one_segment() {
        let segments = extract_tables_and_text("just prose\n\nand more prose");
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].is_table());
    }

    #[test]
    fn whitespace_only_gaps_are_dropped() {
        let doc = "| a |\n|---|\n| 1 |\n\n\n\n| b |\n|---|\n| 2 |";
        let segments = extract_tables_and_text(doc);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(Segment::is_table));
    }

    #[test]
    fn concatenation_reproduces_document_content() {
        let joined = extract_tables_and_text(DOC)
            .iter()
            .map(Segment::content)
            .collect::<Vec<_>>()
            .join("\n");

        // every content line survives in order; only blank gap lines may
        // collapse
        let original: Vec<&str> = DOC.lines().filter(|l| !l.trim().is_empty()).collect();
        let reassembled: Vec<&str> = joined.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(reassembled, original);
    }

    #[test]
    fn trailing_table_is_captured() {
        let doc = "intro\n\n| x |\n|---|\n| 9 |";
        let segments = extract_tables_and_text(doc);
        assert_eq!(segments.len(), 2);
        assert!(segments[1].is_table());
    }
}
