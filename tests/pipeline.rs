mod common;

use std::sync::Arc;
use std::time::Duration;

use std::sync::atomic::Ordering;

use common::{rejecting_ingestor, support_corpus, GeneratorMode, Harness, HashingEmbedder};
use docqa::query::NO_INFORMATION_ANSWER;
use docqa::{
    AnswerOutcome, Document, DocumentStore, IngestControls, MemoryIndex, QueryControls, RagError,
    Stage,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn ingest_then_answer_cites_matching_document() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);

    let report = harness.ingestor.ingest().await.expect("ingest");
    assert_eq!(report.indexed_count, 3);
    assert_eq!(report.total_count, 3);
    assert_eq!(report.document_count, 3);
    assert!(report.failures.is_empty());

    let stored = harness.index.get("doc-x-chunk-0").await.expect("stored record");
    assert_eq!(stored.metadata.title, "Trading Hours");
    assert!(stored.metadata.text.starts_with("Trading Hours\n\n"));

    let result = harness
        .query
        .answer_query("When are the stock market trading hours?")
        .await
        .expect("answer");
    assert_eq!(result.outcome, AnswerOutcome::Generated);
    assert_eq!(result.answer, "Generated answer citing the context.");
    assert_eq!(result.sources[0].title, "Trading Hours");
    assert_eq!(result.sources[0].category, "Trading");

    let prompt = harness.generator.last_prompt().expect("prompt sent");
    assert!(prompt.starts_with("Context:\n[Source: Trading Hours]\n"));
    assert!(prompt.contains("Question: When are the stock market trading hours?"));
    assert!(prompt.ends_with("Answer:"));
}

#[tokio::test]
async fn single_document_answers_trading_hours_question() {
    let store = DocumentStore::new(vec![Document::new(
        "doc-x",
        "Trading Hours",
        "Stocks trade nine to four.",
        "General",
    )])
    .unwrap();
    let harness = Harness::new(store, HashingEmbedder::default(), GeneratorMode::Answer);

    let report = harness.ingestor.ingest().await.expect("ingest");
    assert_eq!(report.indexed_count, 1);
    assert!(harness.index.get("doc-x-chunk-0").await.is_some());

    let result = harness
        .query
        .answer_query("What are the trading hours?")
        .await
        .expect("answer");
    assert_eq!(result.outcome, AnswerOutcome::Generated);
    assert!(!result.answer.trim().is_empty());
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].title, "Trading Hours");
    let score = result.sources[0].score;
    assert!((0.0..=1.0).contains(&score), "score {score} out of range");
    assert!(score > 0.0);
}

#[tokio::test]
async fn documents_and_questions_use_their_own_intent() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);

    let report = harness.ingestor.ingest().await.unwrap();
    assert_eq!(harness.embedder.document_calls(), report.total_count);
    assert_eq!(harness.embedder.query_calls(), 0);

    harness
        .query
        .answer_query("When are the stock market trading hours?")
        .await
        .unwrap();
    assert_eq!(harness.embedder.document_calls(), report.total_count);
    assert_eq!(harness.embedder.query_calls(), 1);
}

#[tokio::test]
async fn failed_upsert_fails_the_run_as_index_error() {
    let (_store, ingestor, index) = rejecting_ingestor();

    let err = ingestor.ingest().await.unwrap_err();
    assert!(
        matches!(
            err,
            RagError::Provider {
                stage: Stage::Index,
                ..
            }
        ),
        "unexpected error {err:?}"
    );
    assert!(!err.is_retryable());
    assert_eq!(index.upsert_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn builtin_corpus_ingests_every_chunk() {
    let store = DocumentStore::builtin();
    let expected = store.chunks(500).len();
    let harness = Harness::new(store, HashingEmbedder::default(), GeneratorMode::Answer);

    let report = harness.ingestor.ingest().await.expect("ingest");
    assert_eq!(report.total_count, expected);
    assert_eq!(report.indexed_count, expected);
    assert_eq!(report.document_count, 10);
    assert_eq!(harness.index.len().await, expected);
}

#[tokio::test]
async fn all_failed_embeddings_is_an_empty_result_without_upserts() {
    let harness = Harness::new(
        support_corpus(),
        HashingEmbedder::always_failing(),
        GeneratorMode::Answer,
    );

    let err = harness.ingestor.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::EmptyResult { attempted: 3 }));
    assert!(harness.index.is_empty().await);
}

#[tokio::test]
async fn one_failing_chunk_is_skipped() {
    let mut docs = support_corpus().documents().to_vec();
    docs.push(Document::new(
        "doc-bad",
        "Broken",
        "this body contains POISON and cannot embed",
        "General",
    ));
    let store = DocumentStore::new(docs).unwrap();
    let harness = Harness::new(
        store,
        HashingEmbedder::failing_on("POISON"),
        GeneratorMode::Answer,
    );

    let report = harness.ingestor.ingest().await.expect("partial success");
    assert_eq!(report.total_count, 4);
    assert_eq!(report.indexed_count, 3);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failures[0].chunk_id, "doc-bad-chunk-0");
    assert!(harness.index.get("doc-bad-chunk-0").await.is_none());
    assert_eq!(
        report.message(),
        "Successfully indexed 3 out of 4 chunks from 4 documents"
    );
}

#[tokio::test]
async fn reingesting_is_idempotent() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);
    harness.ingestor.ingest().await.unwrap();
    let first = harness.index.len().await;
    harness.ingestor.ingest().await.unwrap();
    assert_eq!(harness.index.len().await, first);
}

#[tokio::test]
async fn upserts_are_split_to_the_index_batch_limit() {
    let body = (0..10).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
    let store = DocumentStore::new(vec![Document::new("doc-b", "Batched", &body, "General")]).unwrap();
    let controls = IngestControls {
        chunk_size: 2,
        ..IngestControls::default()
    };
    let harness = Harness::on_index(
        store,
        HashingEmbedder::default(),
        GeneratorMode::Answer,
        Arc::new(MemoryIndex::with_max_batch(2)),
        controls,
        QueryControls::default(),
    );

    let report = harness.ingestor.ingest().await.expect("batched ingest");
    assert_eq!(report.indexed_count, 5);
    assert_eq!(harness.index.len().await, 5);
}

#[tokio::test]
async fn shrinking_documents_prunes_stale_chunks() {
    let body = "alpha beta gamma delta epsilon zeta";
    let store = || DocumentStore::new(vec![Document::new("p", "Pruned", body, "General")]).unwrap();
    let index = Arc::new(MemoryIndex::new());

    let small = Harness::on_index(
        store(),
        HashingEmbedder::default(),
        GeneratorMode::Answer,
        index.clone(),
        IngestControls {
            chunk_size: 2,
            ..IngestControls::default()
        },
        QueryControls::default(),
    );
    small.ingestor.ingest().await.unwrap();
    assert_eq!(index.len().await, 3);

    let large = Harness::on_index(
        store(),
        HashingEmbedder::default(),
        GeneratorMode::Answer,
        index.clone(),
        IngestControls {
            chunk_size: 6,
            prune_window: 4,
            ..IngestControls::default()
        },
        QueryControls::default(),
    );
    let report = large.ingestor.ingest().await.unwrap();
    assert_eq!(report.pruned_count, 4);
    assert_eq!(index.len().await, 1);
    assert!(index.get("p-chunk-0").await.is_some());
    assert!(index.get("p-chunk-2").await.is_none());
}

#[tokio::test]
async fn blank_question_makes_no_external_calls() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);
    for question in ["", "   \n\t"] {
        let err = harness.query.answer_query(question).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
    assert_eq!(harness.embedder.calls(), 0);
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn empty_index_returns_canned_answer_without_generation() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);

    let result = harness
        .query
        .answer_query("What are the trading hours?")
        .await
        .expect("answer");
    assert_eq!(result.answer, NO_INFORMATION_ANSWER);
    assert!(result.sources.is_empty());
    assert_eq!(result.outcome, AnswerOutcome::NoMatches);
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test]
async fn generator_failure_falls_back_to_top_passage() {
    for mode in [GeneratorMode::Fail, GeneratorMode::Blank] {
        let harness = Harness::new(support_corpus(), HashingEmbedder::default(), mode);
        harness.ingestor.ingest().await.unwrap();

        let result = harness
            .query
            .answer_query("When are the stock market trading hours?")
            .await
            .expect("fallback answer");
        assert_eq!(result.outcome, AnswerOutcome::Fallback);
        assert!(result.answer.contains("Trading Hours"));
        assert!(result.answer.contains("9:30 AM"));
        assert_eq!(result.sources[0].title, "Trading Hours");
        assert_eq!(harness.generator.calls(), 1);
    }
}

#[tokio::test]
async fn repeated_questions_reuse_cached_embedding() {
    let harness = Harness::new(support_corpus(), HashingEmbedder::default(), GeneratorMode::Answer);
    harness.ingestor.ingest().await.unwrap();
    let before = harness.embedder.calls();

    harness.query.answer_query("password reset link").await.unwrap();
    harness.query.answer_query("  password reset link ").await.unwrap();
    assert_eq!(harness.embedder.calls(), before + 1);
    assert_eq!(harness.generator.calls(), 2);
}

#[tokio::test]
async fn sources_keep_every_match_but_display_three() {
    let harness = Harness::new(DocumentStore::builtin(), HashingEmbedder::default(), GeneratorMode::Answer);
    harness.ingestor.ingest().await.unwrap();

    let result = harness
        .query
        .answer_query("How do I deposit money into my account?")
        .await
        .unwrap();
    assert_eq!(result.sources.len(), 5);
    assert_eq!(result.display_sources().len(), 3);
    let scores: Vec<f32> = result.sources.iter().map(|source| source.score).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test(start_paused = true)]
async fn slow_embedding_times_out_as_retryable() {
    let controls = QueryControls {
        call_timeout: Duration::from_secs(1),
        ..QueryControls::default()
    };
    let harness = Harness::with_controls(
        support_corpus(),
        HashingEmbedder::slow(Duration::from_secs(5)),
        GeneratorMode::Answer,
        IngestControls::default(),
        controls,
    );

    let err = harness
        .query
        .answer_query("When are trading hours?")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.stage(), Some(Stage::Embedding));
    assert_eq!(harness.generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_chunk_is_recorded_as_failure() {
    let controls = IngestControls {
        call_timeout: Duration::from_secs(1),
        ..IngestControls::default()
    };
    let harness = Harness::with_controls(
        support_corpus(),
        HashingEmbedder::slow(Duration::from_secs(5)),
        GeneratorMode::Answer,
        controls,
        QueryControls::default(),
    );

    let err = harness.ingestor.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::EmptyResult { attempted: 3 }));
}
