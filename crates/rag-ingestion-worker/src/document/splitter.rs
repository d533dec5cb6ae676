use anyhow::Result;
use regex::Regex;

/// Separator cascade for marker-bearing mixed content, checked in order.
/// The `<img…/>` entry keeps image tags whole; the `<<<` / `>>>` entries
/// force a boundary at marker edges so a split can never land inside a
/// `<<<n>>>` / `<<</n>>>` marker.
const MIXED_CONTENT_SEPARATORS: [&str; 7] = [
    "\n\n",
    "\n",
    r"<img[^>]*/>",
    "<<<",
    ">>>",
    " ",
    "",
];

/// Recursive, separator-ordered text splitter.
///
/// Separators are regex patterns tried in order; the first one that matches
/// the text is used, and oversized fragments recurse into the remaining
/// cascade. Matched separators stay attached to the following fragment.
/// Fragments are then greedily merged up to `chunk_size` chars, carrying at
/// most `chunk_overlap` chars of trailing fragments into the next chunk. A
/// fragment no separator can break is emitted as-is even when oversized.
/// Lengths are measured in chars.
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Regex>,
    /// empty-pattern entries mean "split into single chars"
    char_fallbacks: Vec<bool>,
}

impl RecursiveSplitter {
    /// Every separator is a regex pattern; an empty pattern means
    /// "split into single chars" (the last-resort cascade entry).
    pub fn new(chunk_size: usize, chunk_overlap: usize, separators: &[&str]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(separators.len());
        let mut char_fallbacks = Vec::with_capacity(separators.len());

        for pattern in separators {
            if pattern.is_empty() {
                // placeholder; never executed as a regex
                compiled.push(Regex::new("$^")?);
                char_fallbacks.push(true);
            } else {
                compiled.push(Regex::new(pattern)?);
                char_fallbacks.push(false);
            }
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: compiled,
            char_fallbacks,
        })
    }

    /// Splitter for marker-bearing mixed content (text + tables + img tags).
    pub fn mixed_content(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::new(chunk_size, chunk_overlap, &MIXED_CONTENT_SEPARATORS)
            .expect("static separator cascade compiles")
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        self.split_recursive(text, 0)
    }

    fn split_recursive(&self, text: &str, separator_index: usize) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator from `separator_index` on that matches;
        // fall back to the last one.
        let mut chosen = self.separators.len() - 1;
        let mut next_index = self.separators.len();

        for i in separator_index..self.separators.len() {
            if self.char_fallbacks[i] {
                chosen = i;
                next_index = self.separators.len();
                break;
            }
            if self.separators[i].is_match(text) {
                chosen = i;
                next_index = i + 1;
                break;
            }
        }

        let fragments = self.split_once(text, chosen);

        let mut pending: Vec<String> = Vec::new();
        for fragment in fragments {
            if char_len(&fragment) < self.chunk_size {
                pending.push(fragment);
                continue;
            }

            if !pending.is_empty() {
                final_chunks.extend(self.merge_fragments(std::mem::take(&mut pending)));
            }

            if next_index >= self.separators.len() {
                // atomic: no finer separator left
                final_chunks.push(fragment);
            } else {
                final_chunks.extend(self.split_recursive(&fragment, next_index));
            }
        }

        if !pending.is_empty() {
            final_chunks.extend(self.merge_fragments(pending));
        }

        final_chunks
    }

    /// Splits at every separator match, keeping the separator attached to
    /// the fragment that follows it.
    fn split_once(&self, text: &str, separator_index: usize) -> Vec<String> {
        if self.char_fallbacks[separator_index] {
            return text.chars().map(String::from).collect();
        }

        let re = &self.separators[separator_index];
        let mut fragments = Vec::new();

        // cut at every match start so the separator travels with the
        // fragment that follows it
        let mut start = 0;
        for boundary in re.find_iter(text).map(|m| m.start()) {
            if boundary > start {
                fragments.push(text[start..boundary].to_string());
                start = boundary;
            }
        }
        fragments.push(text[start..].to_string());

        fragments.into_iter().filter(|f| !f.is_empty()).collect()
    }

    /// Greedy merge of small fragments with fragment-granular overlap.
    fn merge_fragments(&self, fragments: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<String> = Vec::new();
        let mut total = 0usize;

        for fragment in fragments {
            let len = char_len(&fragment);

            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    chunks.push(chunk);
                }

                // drop leading fragments until the carried-over tail fits the
                // overlap budget and leaves room for the incoming fragment
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    total -= char_len(&window[0]);
                    window.remove(0);
                }
            }

            total += len;
            window.push(fragment);
        }

        if let Some(chunk) = join_window(&window) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_window(window: &[String]) -> Option<String> {
    let joined: String = window.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
