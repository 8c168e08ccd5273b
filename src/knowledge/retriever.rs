//! 검색 서비스 - 질의 임베딩 → 최근접 검색 → 문서 텍스트
//!
//! `RetrievalContext`는 임베딩 프로바이더와 현재 활성 인덱스/문서 쌍을 보관합니다.
//! 쌍은 처음 사용할 때 한 번만 로드되며, 이후 읽기 전용으로 공유됩니다.
//! 새로 구축한 쌍은 `Arc` 교체로 게시하므로, 질의는 반쯤 바뀐 쌍을 볼 수 없습니다.

use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};

use super::corpus::Document;
use super::store::{IndexStore, KnowledgeBase};

/// 기본 검색 결과 개수
pub const DEFAULT_TOP_K: usize = 3;

// ============================================================================
// RetrievalContext
// ============================================================================

/// 프로세스 단위 검색 컨텍스트
pub struct RetrievalContext {
    embedder: Arc<dyn EmbeddingProvider>,
    store: IndexStore,
    active: RwLock<Option<Arc<KnowledgeBase>>>,
    load_lock: Mutex<()>,
}

impl RetrievalContext {
    /// 저장소에서 지연 로드하는 컨텍스트 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: IndexStore) -> Self {
        Self {
            embedder,
            store,
            active: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// 이미 구축된 쌍으로 컨텍스트 생성
    pub fn with_knowledge_base(
        embedder: Arc<dyn EmbeddingProvider>,
        store: IndexStore,
        kb: KnowledgeBase,
    ) -> Self {
        let context = Self::new(embedder, store);
        context.publish(kb);
        context
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// 현재 활성 쌍 (아직 로드 전이면 None)
    pub fn current(&self) -> Option<Arc<KnowledgeBase>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 활성 쌍 반환 (처음 호출 시 저장소에서 로드)
    ///
    /// 동시에 여러 번 호출되어도 로드는 한 번만 일어납니다.
    pub async fn knowledge_base(&self) -> Result<Arc<KnowledgeBase>> {
        if let Some(kb) = self.current() {
            return Ok(kb);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(kb) = self.current() {
            return Ok(kb);
        }

        let kb = self.store.load()?;
        Ok(self.publish(kb))
    }

    /// 저장소에서 다시 로드하여 교체
    pub async fn reload(&self) -> Result<Arc<KnowledgeBase>> {
        let _guard = self.load_lock.lock().await;
        let kb = self.store.load()?;
        Ok(self.publish(kb))
    }

    /// 완성된 쌍을 활성 쌍으로 게시
    pub fn publish(&self, kb: KnowledgeBase) -> Arc<KnowledgeBase> {
        if kb.model() != self.embedder.name() {
            tracing::warn!(
                "Index was built with {} but queries use {}",
                kb.model(),
                self.embedder.name()
            );
        }

        let kb = Arc::new(kb);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(kb.clone());
        kb
    }
}

// ============================================================================
// QueryService
// ============================================================================

/// 검색된 문서와 거리
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub document: Document,
    /// 제곱 L2 거리
    pub distance: f32,
}

/// 질의 서비스
///
/// 복제 비용이 작으며, 복제본끼리 같은 컨텍스트를 공유합니다.
#[derive(Clone)]
pub struct QueryService {
    context: Arc<RetrievalContext>,
}

impl QueryService {
    pub fn new(context: Arc<RetrievalContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RetrievalContext {
        &self.context
    }

    /// 질의와 가장 유사한 문서 k개 (거리 포함)
    ///
    /// 하위 단계의 에러는 재시도 없이 그대로 전달됩니다.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let kb = self.context.knowledge_base().await?;
        let query_embedding = self.context.embedder().embed(query).await?;
        let results = kb.search(&query_embedding, k)?;

        results
            .into_iter()
            .map(|result| {
                let document = kb.document(result.document_id).ok_or_else(|| {
                    RetrievalError::corrupt(format!(
                        "search returned unknown document {}",
                        result.document_id
                    ))
                })?;

                Ok(RetrievedPassage {
                    document: document.clone(),
                    distance: result.distance,
                })
            })
            .collect()
    }

    /// 질의와 가장 유사한 문서 텍스트 k개 (가까운 순)
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let passages = self.retrieve_scored(query, k).await?;
        Ok(passages.into_iter().map(|p| p.document.text).collect())
    }

    /// 검색된 텍스트를 줄바꿈으로 연결 (대화 레이어용 컨텍스트)
    pub async fn retrieve_context(&self, query: &str, k: usize) -> Result<String> {
        Ok(self.retrieve(query, k).await?.join("\n"))
    }

    /// 여러 질의를 동시에 처리 (입력 순서대로 결과 반환)
    ///
    /// 동시 실행 수는 사용 가능한 코어 수로 제한됩니다.
    pub async fn retrieve_many(&self, queries: &[String], k: usize) -> Vec<Result<Vec<String>>> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        stream::iter(queries.iter().map(|query| self.retrieve(query, k)))
            .buffered(workers)
            .collect()
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{FailingEmbedding, KeywordEmbedding};
    use crate::knowledge::{Corpus, FlatIndex, Ingestor, VectorIndex};
    use tempfile::TempDir;

    const SCENARIO: [&str; 3] = [
        "Book a session with an artist.",
        "View artist portfolio and pricing.",
        "Refund requests must be made within 14 days.",
    ];

    const VOCABULARY: [&str; 8] = [
        "book", "session", "artist", "portfolio", "pricing", "refund", "requests", "days",
    ];

    async fn scenario_service(dir: &TempDir) -> QueryService {
        let embedder = Arc::new(KeywordEmbedding::new(&VOCABULARY));
        let kb = Ingestor::new(embedder.as_ref(), 32)
            .build(Corpus::from_texts(SCENARIO))
            .await
            .unwrap();

        let store = IndexStore::new(dir.path().join("index"));
        let context = RetrievalContext::with_knowledge_base(embedder, store, kb);
        QueryService::new(Arc::new(context))
    }

    #[tokio::test]
    async fn test_refund_scenario() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        let results = service.retrieve("How do I get a refund?", 1).await.unwrap();
        assert_eq!(results, vec![SCENARIO[2].to_string()]);
    }

    #[tokio::test]
    async fn test_default_top_k_and_order() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        let passages = service
            .retrieve_scored("artist portfolio", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].document.id, 1);
        assert!(passages.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_k_overflow_returns_whole_corpus() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        let results = service.retrieve("refund", 10).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_context_joins_with_newline() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        let context = service.retrieve_context("refund requests", 2).await.unwrap();
        assert_eq!(context, format!("{}\n{}", SCENARIO[2], SCENARIO[0]));
    }

    #[tokio::test]
    async fn test_retrieve_many_preserves_order() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        let queries = vec![
            "refund please".to_string(),
            "book a session".to_string(),
            "portfolio pricing".to_string(),
        ];
        let results = service.retrieve_many(&queries, 1).await;

        let top: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().remove(0))
            .collect();
        assert_eq!(top, vec![SCENARIO[2], SCENARIO[0], SCENARIO[1]]);
    }

    #[tokio::test]
    async fn test_lazy_load_from_store() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(KeywordEmbedding::new(&VOCABULARY));
        let store = IndexStore::new(dir.path().join("index"));

        let kb = Ingestor::new(embedder.as_ref(), 32)
            .build(Corpus::from_texts(SCENARIO))
            .await
            .unwrap();
        store.save(&kb).unwrap();

        let context = Arc::new(RetrievalContext::new(embedder, store));
        assert!(context.current().is_none());

        let service = QueryService::new(context.clone());
        let results = service.retrieve("refund", 1).await.unwrap();
        assert_eq!(results, vec![SCENARIO[2].to_string()]);

        let first = context.knowledge_base().await.unwrap();
        let second = context.knowledge_base().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_index_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(KeywordEmbedding::new(&VOCABULARY));
        let context = RetrievalContext::new(embedder, IndexStore::new(dir.path().join("none")));
        let service = QueryService::new(Arc::new(context));

        let result = service.retrieve("refund", 1).await;
        assert!(matches!(result, Err(RetrievalError::IndexCorrupt(_))));
    }

    #[tokio::test]
    async fn test_publish_swaps_whole_pair() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;
        let before = service.context().current().unwrap();

        let embedder = KeywordEmbedding::new(&VOCABULARY);
        let replacement = Ingestor::new(&embedder, 32)
            .build(Corpus::from_texts(["Refund policy updated."]))
            .await
            .unwrap();
        service.context().publish(replacement);

        assert_eq!(before.len(), 3);
        let results = service.retrieve("refund", 5).await.unwrap();
        assert_eq!(results, vec!["Refund policy updated.".to_string()]);
    }

    #[tokio::test]
    async fn test_embedder_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let kb = KnowledgeBase::new(
            FlatIndex::build(vec![vec![0.0, 0.0, 1.0]]).unwrap(),
            Corpus::from_texts(["doc"]),
            "failing-test",
        )
        .unwrap();
        let context = RetrievalContext::with_knowledge_base(
            Arc::new(FailingEmbedding),
            IndexStore::new(dir.path().join("index")),
            kb,
        );
        let service = QueryService::new(Arc::new(context));

        let result = service.retrieve("anything", 1).await;
        assert!(matches!(result, Err(RetrievalError::EmbedderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_model_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;

        // 어휘가 다른 임베딩 = 차원이 다른 모델
        let other = Arc::new(KeywordEmbedding::new(&["refund"]));
        let kb = service.context().current().unwrap();
        let vectors = (0..kb.len())
            .map(|i| kb.index().vector(i).unwrap().to_vec())
            .collect();
        let rebuilt = KnowledgeBase::new(
            FlatIndex::build(vectors).unwrap(),
            kb.corpus().clone(),
            "keyword-test",
        )
        .unwrap();
        let context = RetrievalContext::with_knowledge_base(
            other,
            IndexStore::new(dir.path().join("index")),
            rebuilt,
        );

        let result = QueryService::new(Arc::new(context)).retrieve("refund", 1).await;
        assert!(matches!(
            result,
            Err(RetrievalError::DimensionMismatch {
                expected: 8,
                got: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_empty() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(KeywordEmbedding::new(&VOCABULARY));
        let kb = Ingestor::new(embedder.as_ref(), 32)
            .build(Corpus::default())
            .await
            .unwrap();
        let context = RetrievalContext::with_knowledge_base(
            embedder,
            IndexStore::new(dir.path().join("index")),
            kb,
        );

        let results = QueryService::new(Arc::new(context))
            .retrieve("refund", 3)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_probe_results_identical() {
        let dir = TempDir::new().unwrap();
        let service = scenario_service(&dir).await;
        let kb = service.context().current().unwrap();
        service.context().store().save(&kb).unwrap();

        let reloaded = service.context().reload().await.unwrap();
        assert!(!Arc::ptr_eq(&kb, &reloaded));

        let embedder = KeywordEmbedding::new(&VOCABULARY);
        for probe in ["refund", "artist session", "pricing days", "nothing"] {
            let q = embedder.embed(probe).await.unwrap();
            assert_eq!(kb.search(&q, 3).unwrap(), reloaded.search(&q, 3).unwrap());
        }
    }
}
