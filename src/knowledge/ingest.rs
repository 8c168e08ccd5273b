//! 수집 파이프라인 - 문서 로드 → 임베딩 → 인덱스 구축 → 저장
//!
//! 일회성 배치 작업입니다. 어느 단계든 실패하면 아무것도 기록하지 않습니다.

use crate::collector::DocumentLoader;
use crate::embedding::{check_embeddings, EmbeddingProvider};
use crate::error::{Result, RetrievalError};

use super::corpus::Corpus;
use super::flat::FlatIndex;
use super::store::{IndexStore, KnowledgeBase};
use super::vector::VectorIndex;

// ============================================================================
// Ingestor
// ============================================================================

/// 인덱스 구축기
pub struct Ingestor<'a> {
    embedder: &'a dyn EmbeddingProvider,
    batch_size: usize,
}

impl<'a> Ingestor<'a> {
    /// 임베딩 프로바이더와 배치 크기로 생성
    pub fn new(embedder: &'a dyn EmbeddingProvider, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Corpus를 임베딩하여 인덱스/문서 쌍 구축
    pub async fn build(&self, corpus: Corpus) -> Result<KnowledgeBase> {
        let texts = corpus.texts();
        let total_batches = texts.len().div_ceil(self.batch_size);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, total_batches);
            let embedded = self.embedder.embed_batch(batch).await?;
            vectors.extend(check_embeddings(
                batch.len(),
                self.embedder.dimension(),
                embedded,
            )?);
        }

        let index = FlatIndex::build(vectors)?;
        if !index.is_empty() && index.dimension() != self.embedder.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.embedder.dimension(),
                got: index.dimension(),
            });
        }

        tracing::info!(
            "Embedded {} documents with {} ({} batches)",
            corpus.len(),
            self.embedder.name(),
            total_batches
        );

        KnowledgeBase::new(index, corpus, self.embedder.name())
    }

    /// 소스 로드부터 저장까지 전체 수집 실행
    pub async fn ingest(&self, loader: &DocumentLoader, store: &IndexStore) -> Result<KnowledgeBase> {
        let corpus = loader.load()?;
        let kb = self.build(corpus).await?;
        store.save(&kb)?;
        Ok(kb)
    }
}

// ============================================================================
// Tests
// ============================================================================
