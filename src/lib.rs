//! muse-rag - 로컬 시맨틱 검색 저장소
//!
//! 지식베이스 텍스트를 줄 단위 문서로 나누어 임베딩하고,
//! 질의와 제곱 L2 거리가 가장 가까운 문서를 찾아
//! 대화 레이어에 근거 텍스트로 제공합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use collector::{DocumentLoader, LoadStats};
pub use config::{get_data_dir, RetrievalConfig};
pub use embedding::{create_embedder, EmbeddingProvider, OllamaEmbedding};
pub use error::{Result, RetrievalError};
pub use knowledge::{
    Corpus, Document, FlatIndex, IndexStore, Ingestor, KnowledgeBase, QueryService,
    RetrievalContext, RetrievedPassage, SearchResult, StoreStats, VectorIndex, DEFAULT_TOP_K,
};
