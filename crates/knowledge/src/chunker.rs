//! Text chunking with configurable size and overlap.
//!
//! Text is split on blank-line paragraph boundaries. Paragraphs accumulate
//! into a chunk until the next one would push it past `chunk_size` bytes;
//! each new chunk starts with up to `overlap` bytes carried over from the
//! end of the previous one.

/// Default maximum chunk size, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks, in bytes.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Largest char boundary `<= index`.
fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary `>= index`.
fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Trailing context carried into the next chunk.
///
/// Takes at most `overlap` bytes from the end of `chunk`, starting after a
/// paragraph break inside that window when there is one.
fn overlap_tail(chunk: &str, overlap: usize) -> &str {
    if overlap == 0 {
        return "";
    }

    let start = ceil_boundary(chunk, chunk.len().saturating_sub(overlap));
    let tail = &chunk[start..];
    match tail.find("\n\n") {
        Some(pos) => tail[pos + 2..].trim_start(),
        None => tail,
    }
}

/// Split one oversized paragraph into pieces of at most `chunk_size` bytes.
fn split_long(paragraph: &str, chunk_size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < paragraph.len() {
        let mut end = floor_boundary(paragraph, start + chunk_size);
        if end <= start {
            // A single char wider than chunk_size
            end = ceil_boundary(paragraph, start + 1);
        } else if end < paragraph.len() {
            // Prefer breaking at whitespace
            if let Some(ws) = paragraph[start..end].rfind(char::is_whitespace) {
                if ws > 0 {
                    end = start + ws;
                }
            }
        }

        let piece = paragraph[start..end].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        start = end;
    }

    pieces
}

/// Chunk text into overlapping segments.
///
/// Text no longer than `chunk_size` comes back as a single chunk. Empty or
/// whitespace-only text yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size / 2);

    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| split_long(p, chunk_size))
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        let separator = if current.is_empty() { 0 } else { 2 };
        if !current.is_empty() && current.len() + separator + paragraph.len() > chunk_size {
            let carried = overlap_tail(&current, overlap).to_string();
            chunks.push(std::mem::take(&mut current));

            if !carried.is_empty() && carried.len() + 2 + paragraph.len() <= chunk_size {
                current = carried;
            }
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}
