//! End-to-end retrieval scenarios over the in-memory store.

use scoped_rag_core::store::memory::InMemoryStore;
use scoped_rag_core::{
    ChunkResult, ContextRef, MultiContextAggregator, Privilege, RagError, ScopedChunkRetriever,
};

fn aggregator(store: InMemoryStore) -> MultiContextAggregator<InMemoryStore> {
    MultiContextAggregator::new(ScopedChunkRetriever::new(store))
}

/// A small marketing knowledge base:
/// - `kb-hvac` holds `pricing` (3 chunks) and `faq` (2 chunks)
/// - `reviews` is a standalone document (2 chunks)
/// - project `site` links `reviews` and is backed by `kb-hvac`
fn marketing_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.add_document("pricing", "HVAC Pricing", Some("kb-hvac"));
    store.add_document("faq", "FAQ", Some("kb-hvac"));
    store.add_document("reviews", "Customer Reviews", None);

    store.add_chunk("p1", "pricing", "Furnace installs start at $3,500.", Some(vec![1.0, 0.0, 0.0]));
    store.add_chunk("p2", "pricing", "AC tune-ups are $129.", Some(vec![0.9, 0.3, 0.0]));
    store.add_chunk("p3", "pricing", "Financing available.", Some(vec![0.7, 0.0, 0.7]));
    store.add_chunk("f1", "faq", "Do you offer emergency service?", Some(vec![0.6, 0.8, 0.0]));
    store.add_chunk("f2", "faq", "What areas do you serve?", Some(vec![0.0, 1.0, 0.0]));
    store.add_chunk("r1", "reviews", "Fast, fair pricing.", Some(vec![0.8, 0.0, 0.6]));
    store.add_chunk("r2", "reviews", "Friendly technicians.", Some(vec![0.0, 0.0, 1.0]));

    store.add_project("site", Some("kb-hvac"), &["reviews"]);
    store
}

const QUERY: [f32; 3] = [1.0, 0.0, 0.0];

fn ids(results: &[ChunkResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn empty_contexts_return_nothing_without_store_calls() {
    let agg = aggregator(marketing_store());
    let out = agg.retrieve_across(&[], &QUERY, 10).await;
    assert!(out.is_empty());
    assert!(agg.retriever().store().calls().is_empty());
}

#[tokio::test]
async fn same_document_twice_collapses_to_unique_chunks() {
    let agg = aggregator(marketing_store());
    let contexts = vec![ContextRef::document("pricing"), ContextRef::document("pricing")];

    let out = agg.retrieve_across(&contexts, &QUERY, 10).await;

    assert_eq!(out.len(), 3);
    let mut got = ids(&out);
    got.sort();
    assert_eq!(got, vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn overlapping_project_and_knowledge_base_are_deduplicated() {
    let agg = aggregator(marketing_store());
    let contexts = vec![ContextRef::project("site"), ContextRef::knowledge_base("kb-hvac")];

    let out = agg.retrieve_across(&contexts, &QUERY, 20).await;

    let got = ids(&out);
    let unique: std::collections::HashSet<&str> = got.iter().copied().collect();
    assert_eq!(unique.len(), got.len(), "duplicate ids in {got:?}");
    assert!(got.contains(&"r1"));
    assert!(got.contains(&"p1"));
    for pair in out.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }
}

#[tokio::test]
async fn results_are_ranked_and_truncated() {
    let agg = aggregator(marketing_store());
    let contexts = vec![ContextRef::knowledge_base("kb-hvac"), ContextRef::document("reviews")];

    let out = agg.retrieve_across(&contexts, &QUERY, 2).await;

    assert_eq!(ids(&out), vec!["p1", "p2"]);
}

#[tokio::test]
async fn maximum_limit_returns_every_unique_chunk() {
    let agg = aggregator(marketing_store());
    let contexts = vec![ContextRef::document("pricing"), ContextRef::document("pricing")];

    let out = agg.retrieve_across(&contexts, &QUERY, i64::MAX).await;

    let limits: Vec<Option<i64>> = agg.retriever().store().calls().iter().map(|c| c.limit).collect();
    assert_eq!(limits, vec![Some(i64::MAX / 2 + 1), Some(i64::MAX / 2 + 1)]);
    assert_eq!(ids(&out), vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn per_context_budget_is_floored_at_five() {
    let agg = aggregator(marketing_store());
    let contexts = vec![
        ContextRef::document("pricing"),
        ContextRef::document("faq"),
        ContextRef::document("reviews"),
    ];

    agg.retrieve_across(&contexts, &QUERY, 3).await;

    let limits: Vec<Option<i64>> = agg
        .retriever()
        .store()
        .calls()
        .iter()
        .map(|c| c.limit)
        .collect();
    assert_eq!(limits, vec![Some(5), Some(5), Some(5)]);
}

#[tokio::test]
async fn tier_three_scores_every_chunk_with_placeholder() {
    let store = marketing_store();
    store.reject_privilege(Privilege::Caller);
    store.drop_procedures();
    let retriever = ScopedChunkRetriever::new(store);

    let out = retriever
        .retrieve(&ContextRef::knowledge_base("kb-hvac"), &QUERY, 10)
        .await
        .unwrap();

    assert_eq!(out.len(), 5);
    assert!(out.iter().all(|c| c.similarity_score == 0.8));
    assert_eq!(out[0].document_title.as_deref(), Some("HVAC Pricing"));
}

#[tokio::test]
async fn tier_three_project_reads_linked_and_backing_documents() {
    let store = marketing_store();
    store.drop_procedures();
    let retriever = ScopedChunkRetriever::new(store);

    let out = retriever
        .retrieve(&ContextRef::project("site"), &QUERY, 50)
        .await
        .unwrap();

    let mut docs: Vec<&str> = out.iter().map(|c| c.document_id.as_str()).collect();
    docs.sort();
    docs.dedup();
    assert_eq!(docs, vec!["faq", "pricing", "reviews"]);
}

#[tokio::test]
async fn unknown_knowledge_base_is_empty_not_an_error() {
    let store = marketing_store();
    store.drop_procedures();
    let retriever = ScopedChunkRetriever::new(store);

    let out = retriever
        .retrieve(&ContextRef::knowledge_base("missing"), &QUERY, 10)
        .await
        .unwrap();

    assert!(out.is_empty());
    let ops: Vec<String> = retriever.store().calls().into_iter().map(|c| c.operation).collect();
    assert!(!ops.contains(&"embedded_chunks".to_string()));
}

#[tokio::test]
async fn one_exhausted_context_does_not_sink_the_others() {
    let store = marketing_store();
    store.poison("faq");
    let agg = aggregator(store);
    let contexts = vec![
        ContextRef::document("pricing"),
        ContextRef::document("faq"),
        ContextRef::document("reviews"),
    ];

    let (out, report) = agg.retrieve_across_with_report(&contexts, &QUERY, 20).await;

    let mut docs: Vec<&str> = out.iter().map(|c| c.document_id.as_str()).collect();
    docs.sort();
    docs.dedup();
    assert_eq!(docs, vec!["pricing", "reviews"]);

    assert_eq!(report.len(), 3);
    assert!(report[0].error.is_none());
    assert!(matches!(report[1].error, Some(RagError::Retrieval { .. })));
    assert_eq!(report[1].chunks, 0);
    assert!(report[2].error.is_none());
}

#[tokio::test]
async fn zero_total_limit_returns_empty() {
    let agg = aggregator(marketing_store());
    let out = agg
        .retrieve_across(&[ContextRef::document("pricing")], &QUERY, 0)
        .await;
    assert!(out.is_empty());
    assert!(agg.retriever().store().calls().is_empty());
}
