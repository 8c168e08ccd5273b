//! Knowledge 모듈 - 시맨틱 검색 저장소
//!
//! - Corpus: 줄 단위 문서 목록 (ID = 위치)
//! - Vector: 검색 백엔드 트레이트 + 전수 비교 L2 인덱스
//! - Store: 인덱스/문서 아티팩트 저장 및 로드
//! - Ingest: 로드 → 임베딩 → 구축 → 저장
//! - Retriever: 질의 임베딩 → 최근접 검색 → 문서 텍스트

mod corpus;
mod flat;
mod ingest;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use corpus::{Corpus, Document};
pub use flat::FlatIndex;
pub use ingest::Ingestor;
pub use retriever::{QueryService, RetrievalContext, RetrievedPassage, DEFAULT_TOP_K};
pub use store::{
    decode_documents, decode_index, encode_documents, encode_index, IndexStore, KnowledgeBase,
    StoreStats, DOCUMENTS_FILE, INDEX_FILE,
};
pub use vector::{l2_squared, top_k, SearchResult, VectorIndex};
