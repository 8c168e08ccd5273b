//! CLI 모듈
//!
//! muse-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{DocumentLoader, LoadStats};
use crate::config::RetrievalConfig;
use crate::embedding::create_embedder;
use crate::knowledge::{IndexStore, Ingestor, QueryService, RetrievalContext, DEFAULT_TOP_K};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "muse-rag")]
#[command(version, about = "로컬 시맨틱 검색 저장소", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 지식베이스 소스를 임베딩하여 인덱스 구축 (기존 인덱스 교체)
    Ingest {
        /// 소스 파일 (반복 지정, 순서 유지). 생략 시 기본 소스 사용
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// 인덱스 저장 위치
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// 임베딩 배치 크기
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// 결과 텍스트만 줄바꿈으로 연결해서 출력
        #[arg(long)]
        context: bool,

        /// 인덱스 위치
        #[arg(short, long)]
        index: Option<PathBuf>,
    },

    /// 상태 확인
    Status {
        /// 인덱스 위치
        #[arg(short, long)]
        index: Option<PathBuf>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RetrievalConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            sources,
            out,
            batch_size,
        } => cmd_ingest(config, sources, out, batch_size).await,
        Commands::Query {
            query,
            top_k,
            context,
            index,
        } => cmd_query(config, &query, top_k, context, index).await,
        Commands::Status { index } => cmd_status(config, index),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 구축 명령어 (ingest)
///
/// 소스 로드, 임베딩, 인덱스 저장 중 하나라도 실패하면 아무것도 기록하지 않습니다.
async fn cmd_ingest(
    mut config: RetrievalConfig,
    sources: Vec<PathBuf>,
    out: Option<PathBuf>,
    batch_size: Option<usize>,
) -> Result<()> {
    if !sources.is_empty() {
        config.sources = sources;
    }
    if let Some(out) = out {
        config.data_dir = out;
    }
    if let Some(size) = batch_size {
        config.batch_size = size;
    }
    config.validate()?;

    println!("[*] 소스 {} 개 수집 중...", config.sources.len());
    for source in &config.sources {
        println!("    {}", source.display());
    }

    let embedder = create_embedder(&config).context("임베딩 프로바이더 생성 실패")?;
    let loader = DocumentLoader::new(config.sources.clone());
    let store = IndexStore::new(&config.data_dir);

    let kb = Ingestor::new(&embedder, config.batch_size)
        .ingest(&loader, &store)
        .await
        .context("지식베이스 수집 실패")?;

    let stats = LoadStats::from_corpus(kb.corpus());
    println!();
    println!("[OK] Knowledge base ingested successfully");
    println!("     문서: {} 건 (차원 {})", stats.total_documents, kb.dimension());
    println!("     크기: {}", format_bytes(stats.total_bytes));
    println!("     위치: {}", store.location().display());

    if stats.blank_documents > 0 {
        println!(
            "[!] 빈 줄 {} 개도 문서로 포함되었습니다 (문서 ID 유지)",
            stats.blank_documents
        );
    }

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(
    mut config: RetrievalConfig,
    query: &str,
    top_k: usize,
    context_only: bool,
    index: Option<PathBuf>,
) -> Result<()> {
    if let Some(index) = index {
        config.data_dir = index;
    }

    let embedder = create_embedder(&config).context("임베딩 프로바이더 생성 실패")?;
    let context = RetrievalContext::new(Arc::new(embedder), IndexStore::new(&config.data_dir));
    let service = QueryService::new(Arc::new(context));

    if context_only {
        let text = service
            .retrieve_context(query, top_k)
            .await
            .context("검색 실패")?;
        println!("{}", text);
        return Ok(());
    }

    println!("[*] 검색 중: \"{}\"", query);

    let passages = service
        .retrieve_scored(query, top_k)
        .await
        .context("검색 실패")?;

    if passages.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", passages.len());

    for (i, passage) in passages.iter().enumerate() {
        println!(
            "{}. [거리: {:.4}] Doc #{}",
            i + 1,
            passage.distance,
            passage.document.id
        );
        println!("   내용: {}", truncate_text(&passage.document.text, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(mut config: RetrievalConfig, index: Option<PathBuf>) -> Result<()> {
    if let Some(index) = index {
        config.data_dir = index;
    }

    println!("muse-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let store = IndexStore::new(&config.data_dir);
    println!("[*] 인덱스 위치: {}", store.location().display());
    println!(
        "[*] 임베딩: {} @ {} (차원 {})",
        config.embed_model, config.ollama_host, config.embed_dimension
    );

    if !store.exists() {
        println!("[!] 인덱스 없음");
        println!("    구축: muse-rag ingest");
        return Ok(());
    }

    match store.stats() {
        Ok(stats) => {
            println!("[OK] 문서: {} 건 (빈 줄 {})", stats.document_count, stats.blank_documents);
            println!("     차원: {}, 모델: {}", stats.dimension, stats.model);
            println!("     인덱스 크기: {}", format_bytes(stats.index_bytes as usize));

            if stats.model != config.embed_model {
                println!(
                    "[!] 인덱스 모델({})과 설정 모델({})이 다릅니다. 다시 수집하세요.",
                    stats.model, config.embed_model
                );
            }
        }
        Err(e) => {
            println!("[!] 인덱스 손상: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
