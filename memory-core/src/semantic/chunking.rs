//! Deterministic document chunking.
//!
//! Same `(text, chunk_size, overlap)` input always yields a byte-identical
//! chunk list, which keeps chunk ids stable across re-ingestion.

/// Split content into chunks of at most `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are greedily concatenated; a single
/// paragraph longer than `chunk_size` is split on sentence boundaries with
/// the same greedy rule. After chunking, every chunk except the first is
/// prefixed with the last `overlap` characters of its predecessor wrapped
/// as `…<overlap>…\n`. Lengths are measured in characters, not bytes.
#[must_use]
pub fn chunk_text(content: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for paragraph in content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if char_len(&buffer) + char_len(paragraph) + 2 > chunk_size {
            if !buffer.is_empty() {
                chunks.push(std::mem::take(&mut buffer));
            }

            if char_len(paragraph) > chunk_size {
                split_long_paragraph(paragraph, chunk_size, &mut chunks);
            } else {
                buffer = paragraph.to_string();
            }
        } else if buffer.is_empty() {
            buffer = paragraph.to_string();
        } else {
            buffer.push_str("\n\n");
            buffer.push_str(paragraph);
        }
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }

    apply_overlap(chunks, overlap)
}

/// Greedy sentence-boundary split for paragraphs longer than `chunk_size`.
fn split_long_paragraph(paragraph: &str, chunk_size: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();
    for sentence in paragraph.split(". ") {
        if char_len(&current) + char_len(sentence) + 1 > chunk_size {
            if !current.is_empty() {
                chunks.push(format!("{}.", current.trim()));
            }
            current = sentence.to_string();
        } else if current.is_empty() {
            current = sentence.to_string();
        } else {
            current.push_str(". ");
            current.push_str(sentence);
        }
    }
    if !current.is_empty() {
        chunks.push(format!("{}.", current.trim()));
    }
}

fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            overlapped.push(chunk.clone());
            continue;
        }
        let prev = &chunks[i - 1];
        let tail = last_chars(prev, overlap);
        overlapped.push(format!("...{tail}...\n{chunk}"));
    }
    overlapped
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s` (whole string when shorter).
fn last_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if len <= n {
        return s;
    }
    let skip = len - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
