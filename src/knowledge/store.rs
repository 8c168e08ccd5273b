//! Index Store - 인덱스/문서 아티팩트 저장소
//!
//! 두 아티팩트를 하나의 디렉토리에 저장합니다.
//! - `index.bin`: 벡터 (little-endian 바이너리 + SHA-256 체크섬)
//! - `documents.json`: 문서 목록 (순서 유지, 임의 UTF-8 무손실)
//!
//! 같은 쌍을 두 번 저장하면 바이트 단위로 같은 파일이 만들어집니다.
//! 저장은 임시 디렉토리에 쓴 뒤 교체하므로, 실패해도 기존 위치는 그대로입니다.
//!
//! 저장 위치: <로컬 데이터 디렉토리>/.muse-rag/index/

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::get_data_dir;
use crate::error::{Result, RetrievalError};

use super::corpus::{Corpus, Document};
use super::flat::FlatIndex;
use super::vector::{SearchResult, VectorIndex};

/// 벡터 아티팩트 파일 이름
pub const INDEX_FILE: &str = "index.bin";
/// 문서 아티팩트 파일 이름
pub const DOCUMENTS_FILE: &str = "documents.json";

const MAGIC: &[u8; 4] = b"MRAG";
const FORMAT_VERSION: u32 = 1;
/// magic(4) + version(4) + dimension(4) + count(8)
const HEADER_LEN: usize = 20;
const CHECKSUM_LEN: usize = 32;

// ============================================================================
// KnowledgeBase
// ============================================================================

/// 인덱스/문서 쌍
///
/// 벡터 개수와 문서 개수가 같아야 하며, 생성 후에는 변경되지 않습니다.
pub struct KnowledgeBase {
    index: Box<dyn VectorIndex>,
    corpus: Corpus,
    model: String,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("documents", &self.corpus.len())
            .field("dimension", &self.index.dimension())
            .field("model", &self.model)
            .finish()
    }
}

impl KnowledgeBase {
    /// 인덱스와 문서 목록을 묶음
    ///
    /// 개수가 다르면 `IndexCorrupt`를 반환합니다.
    pub fn new(
        index: impl VectorIndex + 'static,
        corpus: Corpus,
        model: impl Into<String>,
    ) -> Result<Self> {
        if index.len() != corpus.len() {
            return Err(RetrievalError::corrupt(format!(
                "index has {} vectors but corpus has {} documents",
                index.len(),
                corpus.len()
            )));
        }

        Ok(Self {
            index: Box::new(index),
            corpus,
            model: model.into(),
        })
    }

    /// 최근접 k개 검색
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.index.search(query, k)
    }

    /// ID로 문서 조회
    pub fn document(&self, id: usize) -> Option<&Document> {
        self.corpus.get(id)
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// 인덱스를 만든 임베딩 모델 이름
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

// ============================================================================
// Types
// ============================================================================

/// 문서 아티팩트 스키마
#[derive(Debug, Serialize, Deserialize)]
struct DocumentsFile {
    format_version: u32,
    model: String,
    count: usize,
    documents: Vec<Document>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub blank_documents: usize,
    pub dimension: usize,
    pub model: String,
    pub index_bytes: u64,
    pub location: PathBuf,
}

// ============================================================================
// IndexStore
// ============================================================================

/// 인덱스 저장소
#[derive(Debug, Clone)]
pub struct IndexStore {
    location: PathBuf,
}

impl IndexStore {
    /// 저장 위치 지정
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// 기본 위치 (로컬 데이터 디렉토리/.muse-rag/index)
    pub fn open_default() -> Self {
        Self::new(get_data_dir())
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn index_path(&self) -> PathBuf {
        self.location.join(INDEX_FILE)
    }

    pub fn documents_path(&self) -> PathBuf {
        self.location.join(DOCUMENTS_FILE)
    }

    /// 두 아티팩트가 모두 존재하는지 확인
    pub fn exists(&self) -> bool {
        self.index_path().is_file() && self.documents_path().is_file()
    }

    /// 인덱스/문서 쌍 저장 (전부 아니면 전무)
    pub fn save(&self, kb: &KnowledgeBase) -> Result<()> {
        let index_bytes = encode_index(kb.index())?;
        let documents_bytes = encode_documents(kb.corpus(), kb.model())?;

        let parent = match self.location.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        // 같은 파일시스템의 임시 디렉토리에 먼저 기록
        let staging = tempfile::Builder::new()
            .prefix(".muse-rag-staging")
            .tempdir_in(&parent)?;

        write_synced(&staging.path().join(INDEX_FILE), &index_bytes)?;
        write_synced(&staging.path().join(DOCUMENTS_FILE), &documents_bytes)?;

        swap_into_place(staging.path(), &self.location)?;

        tracing::info!(
            "Saved index to {:?} ({} documents, dimension {})",
            self.location,
            kb.len(),
            kb.dimension()
        );
        Ok(())
    }

    /// 인덱스/문서 쌍 로드
    ///
    /// 아티팩트가 없거나 잘렸거나 개수가 다르면 `IndexCorrupt`를 반환합니다.
    pub fn load(&self) -> Result<KnowledgeBase> {
        let index_bytes = read_artifact(&self.index_path())?;
        let documents_bytes = read_artifact(&self.documents_path())?;

        let index = decode_index(&index_bytes)?;
        let (corpus, model) = decode_documents(&documents_bytes)?;

        let kb = KnowledgeBase::new(index, corpus, model)?;
        tracing::info!(
            "Loaded index from {:?} ({} documents, dimension {}, model {})",
            self.location,
            kb.len(),
            kb.dimension(),
            kb.model()
        );
        Ok(kb)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let kb = self.load()?;
        let index_bytes = fs::metadata(self.index_path())?.len();

        Ok(StoreStats {
            document_count: kb.len(),
            blank_documents: kb
                .corpus()
                .iter()
                .filter(|d| d.text.trim().is_empty())
                .count(),
            dimension: kb.dimension(),
            model: kb.model().to_string(),
            index_bytes,
            location: self.location.clone(),
        })
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// 벡터 아티팩트 인코딩
pub fn encode_index(index: &dyn VectorIndex) -> Result<Vec<u8>> {
    let dimension = index.dimension();
    let count = index.len();

    let dimension_u32 = u32::try_from(dimension).map_err(|_| {
        RetrievalError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("dimension {} does not fit the index format", dimension),
        ))
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + count * dimension * 4 + CHECKSUM_LEN);
    buf.write_all(MAGIC)?;
    buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    buf.write_u32::<LittleEndian>(dimension_u32)?;
    buf.write_u64::<LittleEndian>(count as u64)?;

    for position in 0..count {
        let vector = index.vector(position).ok_or_else(|| {
            RetrievalError::corrupt(format!("index has no vector at position {}", position))
        })?;
        for value in vector {
            buf.write_f32::<LittleEndian>(*value)?;
        }
    }

    let checksum = Sha256::digest(&buf);
    buf.extend_from_slice(&checksum);
    Ok(buf)
}

/// 벡터 아티팩트 디코딩
pub fn decode_index(bytes: &[u8]) -> Result<FlatIndex> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(RetrievalError::corrupt(format!(
            "{} is truncated ({} bytes)",
            INDEX_FILE,
            bytes.len()
        )));
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(RetrievalError::corrupt(format!(
            "{} checksum mismatch",
            INDEX_FILE
        )));
    }

    let mut cursor = Cursor::new(payload);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MAGIC {
        return Err(RetrievalError::corrupt(format!("{} has bad magic", INDEX_FILE)));
    }

    let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    if version != FORMAT_VERSION {
        return Err(RetrievalError::corrupt(format!(
            "unsupported index format version {}",
            version
        )));
    }

    let dimension = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let count = usize::try_from(cursor.read_u64::<LittleEndian>().map_err(truncated)?)
        .map_err(|_| RetrievalError::corrupt("vector count overflows"))?;

    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| RetrievalError::corrupt("vector payload size overflows"))?;
    if payload.len() != expected_len {
        return Err(RetrievalError::corrupt(format!(
            "{} holds {} bytes, expected {} for {} vectors of dimension {}",
            INDEX_FILE,
            payload.len(),
            expected_len,
            count,
            dimension
        )));
    }
    if count > 0 && dimension == 0 {
        return Err(RetrievalError::corrupt("non-empty index with zero dimension"));
    }

    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        let mut vector = vec![0.0f32; dimension];
        cursor
            .read_f32_into::<LittleEndian>(&mut vector)
            .map_err(truncated)?;
        vectors.push(vector);
    }

    FlatIndex::build(vectors)
}

/// 문서 아티팩트 인코딩
pub fn encode_documents(corpus: &Corpus, model: &str) -> Result<Vec<u8>> {
    let file = DocumentsFile {
        format_version: FORMAT_VERSION,
        model: model.to_string(),
        count: corpus.len(),
        documents: corpus.documents().to_vec(),
    };

    serde_json::to_vec_pretty(&file).map_err(|e| RetrievalError::Io(e.into()))
}

/// 문서 아티팩트 디코딩
pub fn decode_documents(bytes: &[u8]) -> Result<(Corpus, String)> {
    let file: DocumentsFile = serde_json::from_slice(bytes).map_err(|e| {
        RetrievalError::corrupt(format!("{} is malformed: {}", DOCUMENTS_FILE, e))
    })?;

    if file.format_version != FORMAT_VERSION {
        return Err(RetrievalError::corrupt(format!(
            "unsupported documents format version {}",
            file.format_version
        )));
    }

    if file.count != file.documents.len() {
        return Err(RetrievalError::corrupt(format!(
            "{} declares {} documents but holds {}",
            DOCUMENTS_FILE,
            file.count,
            file.documents.len()
        )));
    }

    let corpus = Corpus::from_documents(file.documents)?;
    Ok((corpus, file.model))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn truncated(e: std::io::Error) -> RetrievalError {
    RetrievalError::corrupt(format!("{} is truncated: {}", INDEX_FILE, e))
}

/// 아티팩트 읽기 (없거나 읽을 수 없으면 IndexCorrupt)
fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RetrievalError::corrupt(format!("missing artifact {:?}", path))
        } else {
            RetrievalError::corrupt(format!("cannot read artifact {:?}: {}", path, e))
        }
    })
}

/// 파일 기록 후 디스크 동기화
fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// 임시 디렉토리를 목표 위치로 교체
///
/// 기존 위치는 `.previous`로 옮겨 두었다가, 교체 실패 시 복원합니다.
fn swap_into_place(staging: &Path, location: &Path) -> Result<()> {
    let name = location.file_name().ok_or_else(|| {
        RetrievalError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("index location {:?} has no directory name", location),
        ))
    })?;

    let mut backup_name = name.to_os_string();
    backup_name.push(".previous");
    let backup = location.with_file_name(backup_name);

    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }

    let had_previous = location.exists();
    if had_previous {
        fs::rename(location, &backup)?;
    }

    if let Err(e) = fs::rename(staging, location) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, location) {
                tracing::warn!("Failed to restore previous index {:?}: {}", backup, restore);
            }
        }
        return Err(e.into());
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&backup) {
            tracing::warn!("Failed to remove previous index {:?}: {}", backup, e);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
