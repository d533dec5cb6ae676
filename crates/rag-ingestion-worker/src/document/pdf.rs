use crate::utils::error::WorkerError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lopdf::Document;
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Decodes a base64 PDF (with or without a data-URI prefix) and splits it
/// into balanced page-group sub-PDFs for parallel parsing.
///
/// Group size is `max(min_pages, ceil(pages / max_parallel))`, so a small
/// document stays in one piece and a large one never exceeds `max_parallel`
/// groups. Every emitted blob is itself a valid PDF.
pub fn split_base64_pdf(
    base64_input: &str,
    max_parallel: usize,
    min_pages: usize,
) -> Result<Vec<Vec<u8>>, WorkerError> {
    let payload = strip_data_uri_prefix(base64_input);

    let pdf_bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| WorkerError::InvalidInput(format!("invalid base64 payload: {e}")))?;

    if pdf_bytes.len() < PDF_MAGIC.len() || &pdf_bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        return Err(WorkerError::InvalidInput(
            "decoded data is not a PDF (missing %PDF header)".to_string(),
        ));
    }

    let document = Document::load_mem(&pdf_bytes)
        .map_err(|e| WorkerError::InvalidInput(format!("unreadable PDF structure: {e}")))?;

    let total_pages = document.get_pages().len() as u32;
    if total_pages == 0 {
        return Err(WorkerError::InvalidInput("PDF has no pages".to_string()));
    }

    let group_size = group_size(total_pages as usize, max_parallel, min_pages) as u32;

    debug!(
        "Splitting PDF: {} pages into groups of {} (max {} calls)",
        total_pages,
        group_size,
        total_pages.div_ceil(group_size)
    );

    let mut split_pdfs = Vec::new();
    let mut start = 1u32;

    while start <= total_pages {
        let end = (start + group_size - 1).min(total_pages);

        let excluded: Vec<u32> = (1..=total_pages)
            .filter(|page| *page < start || *page > end)
            .collect();

        let mut part = document.clone();
        if !excluded.is_empty() {
            part.delete_pages(&excluded);
        }
        part.prune_objects();

        let mut buffer = Vec::new();
        part.save_to(&mut buffer)
            .map_err(|e| WorkerError::InvalidInput(format!("failed to write page group: {e}")))?;

        split_pdfs.push(buffer);
        start = end + 1;
    }

    Ok(split_pdfs)
}

/// Pages per group: fit all pages into at most `max_parallel` groups, but
/// never bother with groups smaller than `min_pages`.
pub fn group_size(total_pages: usize, max_parallel: usize, min_pages: usize) -> usize {
    let required_for_limit = total_pages.div_ceil(max_parallel.max(1));
    min_pages.max(required_for_limit)
}

fn strip_data_uri_prefix(input: &str) -> &str {
    if input.contains("base64") {
        if let Some((_, rest)) = input.split_once(',') {
            return rest;
        }
    }
    input
}
