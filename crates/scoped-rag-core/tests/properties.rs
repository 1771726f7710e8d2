//! Property tests for the aggregation invariants: unique ids, descending
//! scores, bounded length, and the per-context budget floor.

use std::collections::HashSet;

use proptest::prelude::*;
use scoped_rag_core::store::memory::InMemoryStore;
use scoped_rag_core::{per_context_limit, ContextRef, MultiContextAggregator, ScopedChunkRetriever};

/// Per document: a list of 3-d chunk vectors.
fn corpus() -> impl Strategy<Value = Vec<Vec<[f32; 3]>>> {
    let component = -1.0f32..1.0f32;
    let vector = [component.clone(), component.clone(), component];
    prop::collection::vec(prop::collection::vec(vector, 0..6), 1..5)
}

/// Context picks: `None` is the shared knowledge base, `Some(i)` document `i`.
fn picks() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(prop::option::of(0usize..5), 1..6)
}

fn build(corpus: &[Vec<[f32; 3]>]) -> InMemoryStore {
    let store = InMemoryStore::new();
    for (d, chunks) in corpus.iter().enumerate() {
        let doc_id = format!("d{d}");
        store.add_document(&doc_id, &format!("Doc {d}"), Some("kb"));
        for (c, v) in chunks.iter().enumerate() {
            store.add_chunk(&format!("d{d}-c{c}"), &doc_id, "text", Some(v.to_vec()));
        }
    }
    store
}

fn contexts(picks: &[Option<usize>], docs: usize) -> Vec<ContextRef> {
    picks
        .iter()
        .map(|p| match p {
            Some(i) => ContextRef::document(format!("d{}", i % docs)),
            None => ContextRef::knowledge_base("kb"),
        })
        .collect()
}

proptest! {
    #[test]
    fn aggregated_ids_are_unique(corpus in corpus(), picks in picks(), query in [-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0], limit in 0i64..30) {
        let ctxs = contexts(&picks, corpus.len());
        let agg = MultiContextAggregator::new(ScopedChunkRetriever::new(build(&corpus)));
        let out = futures::executor::block_on(agg.retrieve_across(&ctxs, &query, limit));

        let unique: HashSet<&str> = out.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(unique.len(), out.len());
    }

    #[test]
    fn aggregated_scores_are_descending(corpus in corpus(), picks in picks(), query in [-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0], limit in 0i64..30) {
        let ctxs = contexts(&picks, corpus.len());
        let agg = MultiContextAggregator::new(ScopedChunkRetriever::new(build(&corpus)));
        let out = futures::executor::block_on(agg.retrieve_across(&ctxs, &query, limit));

        for pair in out.windows(2) {
            prop_assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }

    #[test]
    fn aggregated_length_never_exceeds_limit(corpus in corpus(), picks in picks(), query in [-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0], limit in 0i64..30) {
        let ctxs = contexts(&picks, corpus.len());
        let store = build(&corpus);
        store.drop_procedures();
        let agg = MultiContextAggregator::new(ScopedChunkRetriever::new(store));
        let out = futures::executor::block_on(agg.retrieve_across(&ctxs, &query, limit));

        prop_assert!(out.len() as i64 <= limit);
    }

    #[test]
    fn per_context_budget_never_below_floor(
        total in prop_oneof![-50i64..1000, (i64::MAX - 1000)..=i64::MAX, Just(i64::MAX)],
        contexts in 1usize..200,
    ) {
        prop_assert!(per_context_limit(total, contexts, 5) >= 5);
    }

    #[test]
    fn per_context_budget_is_the_ceiling_share(
        total in prop_oneof![1i64..1000, (i64::MAX - 1000)..=i64::MAX],
        contexts in 1usize..200,
    ) {
        let share = per_context_limit(total, contexts, 1) as i128;
        let n = contexts as i128;
        prop_assert!(share * n >= total as i128);
        prop_assert!((share - 1) * n < total as i128);
    }

    #[test]
    fn huge_limits_are_bounded(corpus in corpus(), picks in picks(), query in [-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0]) {
        let ctxs = contexts(&picks, corpus.len());
        let agg = MultiContextAggregator::new(ScopedChunkRetriever::new(build(&corpus)));
        let out = futures::executor::block_on(agg.retrieve_across(&ctxs, &query, i64::MAX));

        let total_chunks: usize = corpus.iter().map(Vec::len).sum();
        prop_assert!(out.len() <= total_chunks);
    }
}
