//! Corpus publisher: uploads knowledge documents into the retrieval index.
//!
//! Each publish creates new backend file objects, even for unchanged content. Repeated
//! publishes without `clear_first` therefore accumulate duplicates in the index.

use crate::backend::RagBackend;
use crate::config::RagSettings;
use crate::corpus::KnowledgeDocument;
use crate::error::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStats {
    pub total_files: usize,
    pub files_uploaded: usize,
    pub vector_store_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub success: bool,
    pub stats: PublishStats,
    /// Filenames whose upload failed.
    pub failed: Vec<String>,
    /// Files removed from the index before uploading.
    pub cleared: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotConfigured,
    NotIndexed,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    pub status: IndexStatus,
    pub count: usize,
}

pub struct CorpusPublisher {
    backend: Option<Arc<dyn RagBackend>>,
}

impl CorpusPublisher {
    pub fn new(backend: Option<Arc<dyn RagBackend>>, settings: &RagSettings) -> Self {
        Self {
            backend: backend.filter(|_| settings.can_publish()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Upload `docs` (optionally clearing the index first) and report counts.
    ///
    /// A single failed upload is skipped; if none succeed the report is unsuccessful and
    /// nothing is attached.
    pub async fn publish(&self, docs: &[KnowledgeDocument], clear_first: bool) -> RagResult<PublishReport> {
        let backend = self.backend.as_ref().ok_or(RagError::BackendUnconfigured)?;

        let cleared = if clear_first { clear_index(backend.as_ref()).await? } else { 0 };

        let mut file_ids = Vec::with_capacity(docs.len());
        let mut failed = Vec::new();
        for doc in docs {
            match backend.upload_file(doc).await {
                Ok(id) => {
                    tracing::info!(target: "folio::publish", file = %doc.filename, file_id = %id, "Uploaded");
                    file_ids.push(id);
                }
                Err(e) => {
                    tracing::warn!(target: "folio::publish", file = %doc.filename, "Upload failed: {}", e);
                    failed.push(doc.filename.clone());
                }
            }
        }

        if file_ids.is_empty() {
            return Ok(PublishReport {
                success: false,
                stats: PublishStats {
                    total_files: docs.len(),
                    ..Default::default()
                },
                failed,
                cleared,
                error: Some("No files were successfully uploaded".to_string()),
            });
        }

        let attached = backend.attach_files(&file_ids).await?;
        let vector_store_count = match backend.index_file_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(target: "folio::publish", "Index count unavailable: {}", e);
                attached
            }
        };
        tracing::info!(
            target: "folio::publish",
            uploaded = file_ids.len(),
            attached,
            vector_store_count,
            "Corpus published"
        );

        Ok(PublishReport {
            success: true,
            stats: PublishStats {
                total_files: docs.len(),
                files_uploaded: file_ids.len(),
                vector_store_count,
            },
            failed,
            cleared,
            error: None,
        })
    }

    /// Current index size. Count failures read as an empty index.
    pub async fn status(&self) -> IndexState {
        let Some(backend) = &self.backend else {
            return IndexState {
                status: IndexStatus::NotConfigured,
                count: 0,
            };
        };
        let count = backend.index_file_count().await.unwrap_or_else(|e| {
            tracing::warn!(target: "folio::publish", "Index count unavailable: {}", e);
            0
        });
        IndexState {
            status: if count > 0 {
                IndexStatus::Indexed
            } else {
                IndexStatus::NotIndexed
            },
            count,
        }
    }
}

async fn clear_index(backend: &dyn RagBackend) -> RagResult<usize> {
    let files = backend.list_index_files().await?;
    for file in &files {
        backend.remove_index_file(&file.id).await?;
        tracing::debug!(target: "folio::publish", file_id = %file.id, "Removed from index");
    }
    tracing::info!(target: "folio::publish", cleared = files.len(), "Index cleared");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalRagBackend;

    fn docs(n: usize) -> Vec<KnowledgeDocument> {
        (0..n)
            .map(|i| KnowledgeDocument {
                filename: format!("doc_{}.txt", i),
                content: format!("document number {}", i),
            })
            .collect()
    }

    fn publisher() -> CorpusPublisher {
        CorpusPublisher::new(Some(Arc::new(LocalRagBackend::new())), &RagSettings::local())
    }

    #[tokio::test]
    async fn not_indexed_then_indexed() {
        let publisher = publisher();
        assert_eq!(
            publisher.status().await,
            IndexState { status: IndexStatus::NotIndexed, count: 0 }
        );
        let report = publisher.publish(&docs(7), false).await.unwrap();
        assert!(report.success);
        assert_eq!(
            report.stats,
            PublishStats { total_files: 7, files_uploaded: 7, vector_store_count: 7 }
        );
        assert_eq!(
            publisher.status().await,
            IndexState { status: IndexStatus::Indexed, count: 7 }
        );
    }

    #[tokio::test]
    async fn republish_accumulates_unless_cleared() {
        let publisher = publisher();
        publisher.publish(&docs(3), false).await.unwrap();
        let again = publisher.publish(&docs(3), false).await.unwrap();
        assert_eq!(again.stats.vector_store_count, 6);

        let cleared = publisher.publish(&docs(3), true).await.unwrap();
        assert_eq!(cleared.cleared, 6);
        assert_eq!(cleared.stats.vector_store_count, 3);
    }

    #[tokio::test]
    async fn unconfigured_publisher() {
        let publisher = CorpusPublisher::new(None, &RagSettings::default());
        assert_eq!(publisher.status().await.status, IndexStatus::NotConfigured);
        assert!(matches!(
            publisher.publish(&docs(1), false).await,
            Err(RagError::BackendUnconfigured)
        ));
    }

    #[test]
    fn stats_wire_names() {
        let json = serde_json::to_value(PublishStats {
            total_files: 12,
            files_uploaded: 12,
            vector_store_count: 12,
        })
        .unwrap();
        assert_eq!(json["totalFiles"], 12);
        assert_eq!(json["filesUploaded"], 12);
        assert_eq!(json["vectorStoreCount"], 12);
    }
}
