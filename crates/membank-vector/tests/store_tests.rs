use membank_core::error::Error;
use membank_core::types::{chunk_id, Chunk, SizeCategory};
use membank_embed::{HashedEmbedder, EMBED_DIM};
use membank_vector::store::ChunkStore;
use membank_vector::table::{open_db, set_meta, ACTIVE_CHUNKS_KEY};
use membank_vector::vectorize::Vectorizer;

use membank_core::traits::Embedder;

fn make_chunk(doc_path: &str, index: usize, content: &str, domain: &str) -> Chunk {
    Chunk {
        id: chunk_id(doc_path, index),
        doc_path: doc_path.to_string(),
        section_header: "## Notes".to_string(),
        content: content.to_string(),
        domain: domain.to_string(),
        size_category: SizeCategory::Small,
        chunk_index: index,
        modified_at_ms: 1_700_000_000_000,
    }
}

fn embed_all(chunks: &[Chunk]) -> Vec<Vec<f32>> {
    let embedder = HashedEmbedder::new(EMBED_DIM);
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    embedder.embed_batch(&texts).expect("embed")
}

#[tokio::test]
async fn build_then_entries_round_trips_all_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    let chunks = vec![
        make_chunk("recipes/bread.md", 0, "## Notes\nknead the dough well", "recipes"),
        make_chunk("recipes/bread.md", 1, "## Notes\nbake at 230 degrees", "recipes"),
        make_chunk("garden/beds.md", 0, "## Notes\nraised beds drain fast", "garden"),
    ];
    let embeddings = embed_all(&chunks);
    store.build(&chunks, &embeddings).await.expect("build");

    let mut entries = store.entries().await.expect("entries");
    entries.sort_by(|a, b| {
        (&a.chunk.doc_path, a.chunk.chunk_index).cmp(&(&b.chunk.doc_path, b.chunk.chunk_index))
    });
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].chunk.doc_path, "garden/beds.md");
    assert_eq!(entries[1].chunk.id, chunk_id("recipes/bread.md", 0));
    assert_eq!(entries[1].chunk.section_header, "## Notes");
    assert_eq!(entries[1].chunk.domain, "recipes");
    assert_eq!(entries[1].chunk.size_category, SizeCategory::Small);
    assert_eq!(entries[2].chunk.chunk_index, 1);
    assert_eq!(entries[2].chunk.modified_at_ms, 1_700_000_000_000);
}

#[tokio::test]
async fn reopened_snapshot_returns_bit_identical_vectors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let uri = dir.path().to_str().expect("utf8 path").to_string();
    let chunks = vec![
        make_chunk("a.md", 0, "goat fencing layout", "misc"),
        make_chunk("b.md", 0, "root cellar humidity", "misc"),
    ];
    let embeddings = embed_all(&chunks);
    {
        let store = ChunkStore::open(&uri).await.expect("open");
        store.build(&chunks, &embeddings).await.expect("build");
    }

    // Fresh connection, as a later process would see it.
    let store = ChunkStore::open(&uri).await.expect("reopen");
    let entries = store.entries().await.expect("entries");
    assert_eq!(entries.len(), chunks.len());
    for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
        let row = entries
            .iter()
            .find(|e| e.chunk.id == chunk.id)
            .expect("chunk survives reopen");
        assert_eq!(row.chunk, *chunk);
        assert_eq!(&row.vector, embedding, "stored vector must match the input exactly");
    }
}

#[tokio::test]
async fn rebuild_flips_to_a_fresh_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    let first = vec![make_chunk("a.md", 0, "old content", "misc")];
    let t1 = store.build(&first, &embed_all(&first)).await.expect("first build");
    assert_eq!(store.active_table().await.expect("meta"), Some(t1.clone()));

    let second = vec![
        make_chunk("b.md", 0, "new content one", "misc"),
        make_chunk("b.md", 1, "new content two", "misc"),
    ];
    let t2 = store.build(&second, &embed_all(&second)).await.expect("second build");
    assert_ne!(t1, t2);
    assert_eq!(store.active_table().await.expect("meta"), Some(t2));

    let entries = store.entries().await.expect("entries");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.chunk.doc_path == "b.md"));
}

#[tokio::test]
async fn upsert_replaces_and_inserts_by_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    let initial = vec![
        make_chunk("doc.md", 0, "original first section", "misc"),
        make_chunk("doc.md", 1, "original second section", "misc"),
    ];
    store.build(&initial, &embed_all(&initial)).await.expect("build");

    let patch = vec![
        make_chunk("doc.md", 1, "rewritten second section", "misc"),
        make_chunk("doc.md", 2, "brand new third section", "misc"),
    ];
    store.upsert(&patch, &embed_all(&patch)).await.expect("upsert");

    let mut entries = store.entries().await.expect("entries");
    entries.sort_by_key(|e| e.chunk.chunk_index);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].chunk.content, "original first section");
    assert_eq!(entries[1].chunk.content, "rewritten second section");
    assert_eq!(entries[2].chunk.content, "brand new third section");
}

#[tokio::test]
async fn upsert_without_a_build_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    let patch = vec![make_chunk("doc.md", 0, "content", "misc")];
    let err = store.upsert(&patch, &embed_all(&patch)).await.expect_err("should fail");
    match err.downcast_ref::<Error>() {
        Some(Error::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn candidates_on_empty_corpus_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");
    let query = vec![0.1f32; EMBED_DIM];
    let hits = store.candidates(&query, 5, None).await.expect("candidates");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn candidates_rank_matching_content_closest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    let chunks = vec![
        make_chunk("a.md", 0, "sourdough starter feeding schedule", "recipes"),
        make_chunk("b.md", 0, "solar panel wiring diagram", "power"),
        make_chunk("c.md", 0, "compost pile turning frequency", "garden"),
    ];
    store.build(&chunks, &embed_all(&chunks)).await.expect("build");

    let embedder = HashedEmbedder::new(EMBED_DIM);
    let query = embedder
        .embed_batch(&["sourdough starter feeding schedule".to_string()])
        .expect("embed")
        .remove(0);
    let hits = store.candidates(&query, 3, None).await.expect("candidates");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.doc_path, "a.md");
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[0].distance < 1e-4, "identical text should have ~zero cosine distance");
}

#[tokio::test]
async fn domain_filter_is_applied_at_retrieval_time() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChunkStore::open(dir.path().to_str().expect("utf8 path")).await.expect("open");

    // Many near-duplicates in one domain crowd the vector neighbourhood;
    // the lone chunk in the requested domain must still surface when the
    // candidate budget is smaller than the crowd.
    let mut chunks: Vec<Chunk> = (0..8)
        .map(|i| {
            make_chunk(
                &format!("power/solar-{}.md", i),
                0,
                &format!("solar panel wiring notes part {}", i),
                "power",
            )
        })
        .collect();
    chunks.push(make_chunk("garden/solar.md", 0, "solar heat for the greenhouse", "garden"));
    store.build(&chunks, &embed_all(&chunks)).await.expect("build");

    let embedder = HashedEmbedder::new(EMBED_DIM);
    let query = embedder.embed_batch(&["solar panel wiring".to_string()]).expect("embed").remove(0);

    let hits = store.candidates(&query, 3, Some("garden")).await.expect("candidates");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.doc_path, "garden/solar.md");

    let hits = store.candidates(&query, 3, None).await.expect("candidates");
    assert!(hits.iter().all(|h| h.chunk.domain == "power"));
}

#[tokio::test]
async fn dangling_active_pointer_is_index_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let uri = dir.path().to_str().expect("utf8 path");
    let conn = open_db(uri).await.expect("open db");
    set_meta(&conn, ACTIVE_CHUNKS_KEY, "chunks_v0_never_written").await.expect("set meta");

    let store = ChunkStore::open(uri).await.expect("open");
    let err = store.entries().await.expect_err("should fail");
    match err.downcast_ref::<Error>() {
        Some(Error::IndexCorrupt(_)) => {}
        other => panic!("expected IndexCorrupt, got {:?}", other),
    }
}

#[tokio::test]
async fn warm_cache_returns_bit_identical_vectors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = open_db(dir.path().to_str().expect("utf8 path")).await.expect("open db");
    let vectorizer = Vectorizer::new(Box::new(HashedEmbedder::new(EMBED_DIM)), 2);

    let texts = vec![
        "first passage about goats".to_string(),
        "second passage about fences".to_string(),
        "third passage about winter feed".to_string(),
    ];
    let cold = vectorizer.embed_many(&conn, &texts).await.expect("cold embed");
    let warm = vectorizer.embed_many(&conn, &texts).await.expect("warm embed");
    assert_eq!(cold, warm);

    // Partial overlap: cached texts plus one new one, order preserved.
    let mixed = vec![
        "third passage about winter feed".to_string(),
        "a completely new passage".to_string(),
        "first passage about goats".to_string(),
    ];
    let mixed_vecs = vectorizer.embed_many(&conn, &mixed).await.expect("mixed embed");
    assert_eq!(mixed_vecs[0], cold[2]);
    assert_eq!(mixed_vecs[2], cold[0]);
    assert_eq!(mixed_vecs[1].len(), EMBED_DIM);
}
