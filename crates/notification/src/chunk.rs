/// Deterministic section-aware chunking with `1/N` page markers.
///
/// Splits on `## ` section boundaries first, then on line boundaries for
/// a section that alone exceeds the budget. The page marker's own bytes
/// are budgeted so no emitted chunk exceeds `max_bytes`.
pub fn chunk_report(body: &str, max_bytes: usize) -> Vec<String> {
    // Room for the "(NN/NN)\n" marker prefix.
    const MARKER_BUDGET: usize = 12;
    let budget = max_bytes.saturating_sub(MARKER_BUDGET).max(64);

    if body.len() <= max_bytes {
        return vec![body.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in split_pieces(body, budget) {
        if !current.is_empty() && current.len() + piece.len() > budget {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let total = chunks.len();
    if total == 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("({}/{})\n{}", i + 1, total, chunk))
        .collect()
}

/// Section-sized pieces, each no larger than `budget`.
fn split_pieces(body: &str, budget: usize) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in body.split_inclusive('\n') {
        if line.starts_with("## ") && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        sections.push(current);
    }

    // A single oversize section degrades to line-level splits.
    let mut pieces = Vec::new();
    for section in sections {
        if section.len() <= budget {
            pieces.push(section);
            continue;
        }
        let mut part = String::new();
        for line in section.split_inclusive('\n') {
            if !part.is_empty() && part.len() + line.len() > budget {
                pieces.push(std::mem::take(&mut part));
            }
            if line.len() > budget {
                // Pathological single line: hard split on char boundary.
                let mut rest = line;
                while rest.len() > budget {
                    let cut = (1..=budget).rev().find(|i| rest.is_char_boundary(*i)).unwrap_or(1);
                    pieces.push(rest[..cut].to_string());
                    rest = &rest[cut..];
                }
                part.push_str(rest);
            } else {
                part.push_str(line);
            }
        }
        if !part.is_empty() {
            pieces.push(part);
        }
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sectioned_body(sections: usize, lines_per_section: usize) -> String {
        let mut body = String::from("# Header\n\n");
        for s in 0..sections {
            body.push_str(&format!("## Section {s}\n"));
            for l in 0..lines_per_section {
                body.push_str(&format!("line {l} of section {s} with some padding text\n"));
            }
            body.push('\n');
        }
        body
    }

    #[test]
    fn small_body_is_one_unmarked_chunk() {
        let chunks = chunk_report("short report", 4096);
        assert_eq!(chunks, vec!["short report"]);
    }

    #[test]
    fn chunks_respect_byte_limit() {
        let body = sectioned_body(20, 10);
        let chunks = chunk_report(&body, 512);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 512, "chunk of {} bytes", chunk.len());
        }
    }

    #[test]
    fn markers_number_every_page() {
        let body = sectioned_body(20, 10);
        let chunks = chunk_report(&body, 512);
        let n = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.starts_with(&format!("({}/{})", i + 1, n)));
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let body = sectioned_body(12, 8);
        assert_eq!(chunk_report(&body, 700), chunk_report(&body, 700));
    }

    #[test]
    fn splits_prefer_section_boundaries() {
        let body = sectioned_body(4, 4);
        let chunks = chunk_report(&body, 300);
        // Every chunk after the first starts at a section heading.
        for chunk in chunks.iter().skip(1) {
            let content = chunk.splitn(2, '\n').nth(1).unwrap_or("");
            assert!(
                content.starts_with("## "),
                "chunk did not start on a section: {content:?}"
            );
        }
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_char() {
        let body = format!("## 中文\n{}\n", "茅台分析".repeat(500));
        let chunks = chunk_report(&body, 256);
        for chunk in chunks {
            // String construction already guarantees UTF-8; re-assert by
            // walking chars.
            assert!(chunk.chars().count() > 0);
        }
    }
}
