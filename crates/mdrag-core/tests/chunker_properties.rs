use mdrag_core::config::ChunkingConfig;
use mdrag_core::types::{char_len, estimate_tokens};
use mdrag_core::Chunker;
use proptest::prelude::*;

fn small_chunker() -> Chunker {
    Chunker::new(ChunkingConfig { max_chunk_size: 120, overlap: 20, max_tokens_per_chunk: 40, atomic_block_tolerance: 30 })
        .expect("valid config")
}

fn section() -> impl Strategy<Value = (usize, String, String)> {
    (1usize..=4, "[a-z]{1,10}", "[a-z][a-z ]{0,399}")
}

fn render(sections: &[(usize, String, String)]) -> String {
    sections.iter().map(|(level, title, body)| format!("{} {}\n{}\n\n", "#".repeat(*level), title, body)).collect()
}

proptest! {
    #[test]
    fn chunks_respect_budgets_for_any_input(s in ".{0,1500}") {
        let chunker = small_chunker();
        for chunk in chunker.chunk(&s, "any.md") {
            prop_assert!(char_len(&chunk.text) <= 150, "chunk of {} chars", char_len(&chunk.text));
            prop_assert!(estimate_tokens(&chunk.text) <= 40);
        }
    }

    #[test]
    fn positions_are_gapless(sections in prop::collection::vec(section(), 0..8)) {
        let chunks = small_chunker().chunk(&render(&sections), "doc.md");
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.position, i);
            prop_assert_eq!(chunk.id(), format!("doc.md_{i}"));
        }
    }

    #[test]
    fn prose_chunks_stay_under_max_size(sections in prop::collection::vec(section(), 1..8)) {
        for chunk in small_chunker().chunk(&render(&sections), "doc.md") {
            prop_assert!(char_len(&chunk.text) <= 120);
        }
    }

    #[test]
    fn header_paths_strictly_deepen(sections in prop::collection::vec(section(), 1..10)) {
        for chunk in small_chunker().chunk(&render(&sections), "doc.md") {
            prop_assert!(!chunk.headers.is_empty());
            for pair in chunk.headers.windows(2) {
                prop_assert!(pair[0].level < pair[1].level);
            }
        }
    }

    #[test]
    fn window_starts_advance_by_stride(len in 121usize..2000) {
        let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = small_chunker().chunk(&text, "plain.md");
        prop_assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            let start = i * 100;
            let end = (start + 120).min(len);
            prop_assert_eq!(&chunk.text, &text[start..end]);
        }
        prop_assert!(text.ends_with(&chunks[chunks.len() - 1].text));
    }
}
