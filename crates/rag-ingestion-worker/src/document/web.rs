use crate::utils::error::WorkerError;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

const MAX_EXTRACTED_CHARS: usize = 100_000;

static CONTENT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p, h1, h2, h3, h4, h5, h6, li, td, th, pre, blockquote")
        .expect("static selector parses")
});

/// Fetches a web page and extracts its readable text.
pub async fn fetch_url_text(client: &reqwest::Client, url: &str) -> Result<String, WorkerError> {
    debug!("Fetching URL source: {}", url);

    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(WorkerError::InvalidInput(format!(
            "URL fetch failed with status {}: {}",
            response.status(),
            url
        )));
    }

    let html = response.text().await?;
    let text = extract_text(&html);

    if text.trim().is_empty() {
        return Err(WorkerError::InvalidInput(format!(
            "no text content extracted from URL: {url}"
        )));
    }

    Ok(text)
}

/// Pulls text out of content-bearing elements, capped at 100k chars.
fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut blocks: Vec<String> = Vec::new();
    for element in document.select(&CONTENT_SELECTOR) {
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if !text.is_empty() {
            blocks.push(text);
        }
    }

    let mut combined = blocks.join("\n\n");
    if combined.chars().count() > MAX_EXTRACTED_CHARS {
        combined = combined.chars().take(MAX_EXTRACTED_CHARS).collect();
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paragraphs_and_headings() {
        let html = r#"
            <html><head><title>t</title><script>var x = 1;</script></head>
            <body>
              <h1>Quarterly Report</h1>
              <p>Revenue grew by 12 percent.</p>
              <ul><li>Item one</li><li>Item two</li></ul>
            </body></html>
        "#;

        let text = extract_text(html);
        assert!(text.contains("Quarterly Report"));
        assert!(text.contains("Revenue grew by 12 percent."));
        assert!(text.contains("Item one"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn empty_page_extracts_nothing() {
        assert!(extract_text("<html><body></body></html>").trim().is_empty());
    }

    #[test]
    fn output_is_capped() {
        let huge = format!("<p>{}</p>", "word ".repeat(60_000));
        assert!(extract_text(&huge).chars().count() <= MAX_EXTRACTED_CHARS);
    }
}
