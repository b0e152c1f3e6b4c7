
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::{CatalogIndex, ContentIndex, connect};
use crate::document::{ParsedCourse, load_course_file, parse_course_document};
use crate::embeddings::{Embedder, chunk_course};
use crate::generator::{AiGenerator, ChatModel};
use crate::ollama::OllamaClient;
use crate::session::SessionManager;
use crate::tools::ToolRegistry;
use crate::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStats {
    pub course_count: usize,
    pub course_titles: Vec<String>,
}

/// What happened to one course document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Added { title: String, chunks: usize },
    /// Title already catalogued and replacement was not requested
    Skipped { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Totals for a multi-document ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub courses_added: usize,
    pub chunks_added: usize,
    pub skipped: Vec<String>,
    pub failures: Vec<IngestFailure>,
}

impl IngestionReport {
    fn record(&mut self, path: &Path, result: Result<IngestOutcome>) {
        match result {
            Ok(IngestOutcome::Added { chunks, .. }) => {
                self.courses_added += 1;
                self.chunks_added += chunks;
            }
            Ok(IngestOutcome::Skipped { title }) => self.skipped.push(title),
            Err(e) => {
                warn!("Failed to ingest {}: {}", path.display(), e);
                self.failures.push(IngestFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Course ingestion and question answering over the two indexes
pub struct RagSystem {
    config: Config,
    catalog: Arc<CatalogIndex>,
    content: Arc<ContentIndex>,
    tools: ToolRegistry,
    generator: AiGenerator,
    sessions: SessionManager,
}

impl RagSystem {
    /// Wire the system to the Ollama server named in `config`
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        let client = Arc::new(
            OllamaClient::new(&config.ollama).map_err(|e| RagError::Config(format!("{:#}", e)))?,
        );
        let embedder: Arc<dyn Embedder> = client.clone();
        Self::new(config, embedder, client).await
    }

    #[inline]
    pub async fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let connection = connect(&config.vector_database_path()).await?;

        let catalog = Arc::new(CatalogIndex::new(
            connection.clone(),
            Arc::clone(&embedder),
        ));
        let content = Arc::new(ContentIndex::new(connection, embedder));
        let tools = ToolRegistry::for_courses(
            Arc::clone(&catalog),
            Arc::clone(&content),
            config.search.max_results,
        );

        info!(
            "RAG system ready (store: {})",
            config.vector_database_path().display()
        );

        Ok(Self {
            generator: AiGenerator::new(chat_model),
            sessions: SessionManager::new(config.session.max_history),
            config,
            catalog,
            content,
            tools,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    #[inline]
    pub fn content(&self) -> &ContentIndex {
        &self.content
    }

    #[inline]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Ingest one course file
    #[inline]
    pub async fn add_course_document(&self, path: &Path, replace: bool) -> Result<IngestOutcome> {
        let parsed = load_course_file(path).await?;
        self.ingest(parsed, replace).await
    }

    /// Ingest a course document already in memory
    #[inline]
    pub async fn add_course_text(&self, text: &str, replace: bool) -> Result<IngestOutcome> {
        let parsed = parse_course_document(text)?;
        self.ingest(parsed, replace).await
    }

    async fn ingest(&self, parsed: ParsedCourse, replace: bool) -> Result<IngestOutcome> {
        let title = parsed.course.title.clone();

        if !replace && self.catalog.contains(&title).await? {
            info!("Course '{}' already indexed, skipping", title);
            return Ok(IngestOutcome::Skipped { title });
        }

        let chunks = chunk_course(&parsed, &self.config.chunking);
        let written = self.content.replace_course(&title, &chunks).await?;
        // The catalog row is written last; its presence marks the course complete
        self.catalog.add_course(&parsed.course).await?;

        info!("Added course '{}' with {} chunks", title, written);
        Ok(IngestOutcome::Added {
            title,
            chunks: written,
        })
    }

    /// Course files (`*.txt`) directly inside `dir`, in name order
    #[inline]
    pub fn course_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_text = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if path.is_file() && is_text {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Ingest each file in turn; failures are recorded, never fatal
    #[inline]
    pub async fn add_course_files<F>(
        &self,
        files: &[PathBuf],
        replace: bool,
        mut on_file_done: F,
    ) -> IngestionReport
    where
        F: FnMut(&Path, &Result<IngestOutcome>),
    {
        let mut report = IngestionReport::default();
        for path in files {
            let result = self.add_course_document(path, replace).await;
            on_file_done(path, &result);
            report.record(path, result);
        }
        report
    }

    /// Ingest every course file in a folder
    #[inline]
    pub async fn add_course_folder(&self, dir: &Path, replace: bool) -> Result<IngestionReport> {
        let files = Self::course_files(dir)?;
        debug!("Found {} course files in {}", files.len(), dir.display());
        Ok(self.add_course_files(&files, replace, |_, _| {}).await)
    }

    /// Drop both indexes for a full rebuild
    #[inline]
    pub async fn clear_indexes(&self) -> Result<()> {
        self.content.clear().await?;
        self.catalog.clear().await?;
        info!("Cleared course indexes");
        Ok(())
    }

    /// Answer a question, using and extending the session's history when given
    #[inline]
    pub async fn query(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<(String, Vec<String>)> {
        let history = session_id
            .map(|id| self.sessions.history(id))
            .unwrap_or_default();

        let generated = self.generator.generate(query, &history, &self.tools).await?;

        if let Some(id) = session_id {
            self.sessions.add_exchange(id, query, &generated.answer);
        }

        Ok((generated.answer, generated.sources))
    }

    #[inline]
    pub async fn handle_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        // A blank id gets a fresh session rather than a shared "" bucket
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.sessions.create_session());

        let (answer, sources) = self.query(&request.query, Some(&session_id)).await?;

        Ok(QueryResponse {
            answer,
            sources,
            session_id,
        })
    }

    #[inline]
    pub async fn course_stats(&self) -> Result<CourseStats> {
        let course_titles = self.catalog.course_titles().await?;
        Ok(CourseStats {
            course_count: course_titles.len(),
            course_titles,
        })
    }
}
