use crate::chunker::{chunk_text, ChunkOptions};
use crate::embeddings::hashed_embedding;
use crate::index::{Chunk, ExactIndex, IndexedItem, SearchFilters, VectorIndex};
use crate::memory::{HistoryHints, HistoryPolicy, MemoryMessage};
use crate::tokens::{HeuristicCounter, TokenCounter, WordCounter};
use ark_llm::ChatRole;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn words() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,12}", 0..60)
}

fn conversation(contents: &[String]) -> Vec<MemoryMessage> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let role = if i % 2 == 0 {
                ChatRole::User
            } else {
                ChatRole::Assistant
            };
            MemoryMessage::new(role, content.clone())
        })
        .collect()
}

proptest! {
    #[test]
    fn chunks_stay_within_budget(words in words(), max in 1usize..40, overlap in 0usize..20) {
        let text = words.join(" ");
        let counter = HeuristicCounter;
        let chunks = chunk_text(&text, ChunkOptions::new(max, overlap), &counter);

        for chunk in &chunks {
            let pieces: Vec<&str> = chunk.split_whitespace().collect();
            let cost: usize = pieces.iter().map(|w| counter.count(w)).sum();
            prop_assert!(
                cost <= max || pieces.len() == 1,
                "chunk {:?} costs {} over budget {}",
                chunk, cost, max
            );
        }
    }

    #[test]
    fn chunk_tail_reappears_as_next_head(words in words(), max in 2usize..12, overlap in 0usize..12) {
        let overlap = overlap.min(max - 1);
        let text = words.join(" ");
        let chunks = chunk_text(&text, ChunkOptions::new(max, overlap), &WordCounter);

        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split_whitespace().collect();
            let next: Vec<&str> = pair[1].split_whitespace().collect();
            prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
    }

    #[test]
    fn chunks_without_overlap_cover_the_text(words in words(), max in 1usize..20) {
        let text = words.join(" ");
        let chunks = chunk_text(&text, ChunkOptions::new(max, 0), &WordCounter);
        prop_assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn hashed_embeddings_are_unit_norm(text in "[a-z]{1,8}( [a-z]{1,8}){0,10}", dim in 1usize..256) {
        let vector = hashed_embedding(&text, dim);
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        prop_assert_eq!(vector.len(), dim);
        prop_assert!((norm - 1.0).abs() < 1e-4, "norm was {}", norm);
    }

    #[test]
    fn hashed_embeddings_are_deterministic(text in ".{0,80}", dim in 1usize..256) {
        prop_assert_eq!(hashed_embedding(&text, dim), hashed_embedding(&text, dim));
    }

    #[test]
    fn search_is_sorted_and_bounded(
        vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..30),
        query in prop::collection::vec(-1.0f32..1.0, 4),
        top_k in 0usize..40,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let total = vectors.len();

        let hits = runtime.block_on(async {
            let index = ExactIndex::new(4);
            for (i, vector) in vectors.into_iter().enumerate() {
                let item = IndexedItem::from_chunk(Chunk {
                    owner_id: format!("owner-{}", i % 3),
                    content: format!("item {}", i),
                    sequence_index: i,
                    vector,
                    metadata: BTreeMap::new(),
                });
                index.insert(item).await.unwrap();
            }
            index.search(&query, top_k, &SearchFilters::default()).await.unwrap()
        });

        prop_assert!(hits.len() <= top_k);
        prop_assert!(hits.len() <= total);
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn larger_token_budget_never_selects_fewer(
        contents in prop::collection::vec("[a-z ]{1,40}", 0..30),
        small in 1i64..200,
        extra in 0i64..200,
    ) {
        let history = conversation(&contents);
        let policy = HistoryPolicy::default();
        let hints = |budget: i64| HistoryHints::default().with_session("s").with_max_tokens(budget);

        let narrow = policy.select(&history, &hints(small), &HeuristicCounter);
        let wide = policy.select(&history, &hints(small + extra), &HeuristicCounter);

        prop_assert!(narrow.messages.len() <= wide.messages.len());
        prop_assert!(wide.tokens_used <= (small + extra) as usize);
    }
}
