//! Object stager
//!
//! Lists the raw parts of one upload, puts them in page order, and fetches their bytes.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use heirloom_core::models::{SubmissionBatch, SubmissionPart};
use heirloom_core::AppError;
use heirloom_storage::keys::{is_merged_output, staging_prefix};
use heirloom_storage::{ObjectInfo, Storage};

use crate::mime::detect_mime_kind;

/// Fetches and orders the staged parts of an upload.
#[derive(Clone)]
pub struct ObjectStager {
    storage: Arc<dyn Storage>,
    fetch_concurrency: usize,
    max_part_size_bytes: usize,
}

impl ObjectStager {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetch_concurrency: usize,
        max_part_size_bytes: usize,
    ) -> Self {
        Self {
            storage,
            fetch_concurrency: fetch_concurrency.max(1),
            max_part_size_bytes,
        }
    }

    /// Collect the parts of `upload_id` in merge order.
    ///
    /// Downloads run concurrently but the returned parts keep the order from
    /// [`order_parts`]. Fails with [`AppError::NotFound`] when nothing eligible is staged.
    #[tracing::instrument(skip(self))]
    pub async fn stage(
        &self,
        upload_id: &str,
        requester_id: &str,
    ) -> Result<SubmissionBatch, AppError> {
        let start = Instant::now();
        let prefix = staging_prefix(upload_id)?;
        let listed = self.storage.list(&prefix).await?;

        let max_size = self.max_part_size_bytes as u64;
        let (eligible, oversized): (Vec<ObjectInfo>, Vec<ObjectInfo>) = order_parts(listed)
            .into_iter()
            .partition(|info| info.size <= max_size);

        for info in &oversized {
            tracing::warn!(
                key = %info.key,
                size = info.size,
                max_size = max_size,
                "Skipping staged part larger than the size limit"
            );
        }

        if eligible.is_empty() {
            return Err(AppError::NotFound(format!(
                "No eligible parts under {}",
                prefix
            )));
        }

        let storage = self.storage.clone();
        let parts: Vec<SubmissionPart> = stream::iter(eligible.into_iter().enumerate())
            .map(|(sequence_index, info)| {
                let storage = storage.clone();
                async move {
                    let bytes = storage.download(&info.key).await?;
                    let mime_kind = detect_mime_kind(&info.key, &bytes);
                    Ok::<_, AppError>(SubmissionPart {
                        sequence_index,
                        key: info.key,
                        bytes,
                        mime_kind,
                    })
                }
            })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        let batch = SubmissionBatch {
            upload_id: upload_id.to_string(),
            requester_id: requester_id.to_string(),
            parts,
        };

        tracing::info!(
            parts = batch.parts.len(),
            skipped = oversized.len(),
            total_bytes = batch.total_bytes(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Staged upload parts"
        );

        Ok(batch)
    }
}

/// Drop directory markers and prior merged output, then sort by numeric filename stem.
///
/// Numeric stems come first in ascending order; everything else follows. The sort is
/// stable, so equal stems and non-numeric names keep their listing order.
pub fn order_parts(listed: Vec<ObjectInfo>) -> Vec<ObjectInfo> {
    let mut parts: Vec<ObjectInfo> = listed
        .into_iter()
        .filter(|info| !info.key.ends_with('/') && !is_merged_output(&info.key))
        .collect();

    parts.sort_by(|a, b| match (numeric_stem(&a.key), numeric_stem(&b.key)) {
        (Some(x), Some(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    parts
}

/// Digits of an all-digit filename stem without leading zeros:
/// `staging/u1/007.jpg` -> `Some("7")`; `staging/u1/cover.jpg` -> `None`.
///
/// Stems of any length compare as numbers by length, then digit by digit.
fn numeric_stem(key: &str) -> Option<&str> {
    let filename = key.rsplit('/').next().unwrap_or(key);
    let stem = match filename.rfind('.') {
        Some(pos) => &filename[..pos],
        None => filename,
    };
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match stem.trim_start_matches('0') {
        "" => Some("0"),
        digits => Some(digits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heirloom_core::models::MimeKind;
    use heirloom_storage::LocalStorage;
    use tempfile::TempDir;

    fn info(key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: 1,
            last_modified: None,
        }
    }

    fn keys(parts: &[ObjectInfo]) -> Vec<&str> {
        parts.iter().map(|p| p.key.as_str()).collect()
    }

    async fn storage_with(files: &[(&str, &[u8])]) -> (TempDir, Arc<dyn Storage>) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost/files".to_string())
            .await
            .unwrap();
        for (key, bytes) in files {
            storage
                .upload_with_key(key, bytes.to_vec(), "application/octet-stream")
                .await
                .unwrap();
        }
        (dir, Arc::new(storage))
    }

    #[test]
    fn test_numeric_stem() {
        assert_eq!(numeric_stem("staging/u1/007.jpg"), Some("7"));
        assert_eq!(numeric_stem("staging/u1/12"), Some("12"));
        assert_eq!(numeric_stem("staging/u1/000.png"), Some("0"));
        assert_eq!(numeric_stem("staging/u1/cover.jpg"), None);
        assert_eq!(numeric_stem("staging/u1/1.2.jpg"), None);
        assert_eq!(numeric_stem("staging/u1/-3.jpg"), None);
        assert_eq!(numeric_stem("staging/u1/.jpg"), None);
    }

    #[test]
    fn test_long_numeric_stems_stay_in_numeric_block() {
        let listed = vec![
            info("s/u/cover.jpg"),
            info("s/u/100000000000000000000.jpg"),
            info("s/u/99999999999999999999.jpg"),
            info("s/u/2.jpg"),
            info("s/u/0000000000000000000000003.jpg"),
        ];
        assert_eq!(
            keys(&order_parts(listed)),
            vec![
                "s/u/2.jpg",
                "s/u/0000000000000000000000003.jpg",
                "s/u/99999999999999999999.jpg",
                "s/u/100000000000000000000.jpg",
                "s/u/cover.jpg",
            ]
        );
    }

    #[test]
    fn test_order_is_numeric_not_lexicographic() {
        let listed = vec![info("s/u/10.jpg"), info("s/u/2.jpg"), info("s/u/01.pdf")];
        assert_eq!(
            keys(&order_parts(listed)),
            vec!["s/u/01.pdf", "s/u/2.jpg", "s/u/10.jpg"]
        );
    }

    #[test]
    fn test_non_numeric_last_in_listing_order() {
        let listed = vec![
            info("s/u/zeta.png"),
            info("s/u/3.jpg"),
            info("s/u/alpha.png"),
            info("s/u/1.jpg"),
        ];
        assert_eq!(
            keys(&order_parts(listed)),
            vec!["s/u/1.jpg", "s/u/3.jpg", "s/u/zeta.png", "s/u/alpha.png"]
        );
    }

    #[test]
    fn test_equal_stems_keep_listing_order() {
        let listed = vec![info("s/u/2.png"), info("s/u/02.jpg"), info("s/u/1.pdf")];
        assert_eq!(
            keys(&order_parts(listed)),
            vec!["s/u/1.pdf", "s/u/2.png", "s/u/02.jpg"]
        );
    }

    #[test]
    fn test_every_listing_order_sorts_the_same() {
        let names = ["s/u/1.jpg", "s/u/2.jpg", "s/u/3.pdf", "s/u/10.png"];
        let permutations = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [2, 0, 3, 1],
            [1, 3, 0, 2],
            [3, 0, 2, 1],
        ];
        for perm in permutations {
            let listed = perm.iter().map(|i| info(names[*i])).collect();
            assert_eq!(keys(&order_parts(listed)), names.to_vec());
        }
    }

    #[test]
    fn test_merged_output_and_markers_excluded() {
        let listed = vec![
            info("s/u/merged.pdf"),
            info("s/u/"),
            info("s/u/1.jpg"),
        ];
        assert_eq!(keys(&order_parts(listed)), vec!["s/u/1.jpg"]);
    }

    #[tokio::test]
    async fn test_stage_fetches_in_order_with_kinds() {
        let (_dir, storage) = storage_with(&[
            ("staging/u1/2.png", b"\x89PNG\r\n\x1a\n....".as_slice()),
            ("staging/u1/10.pdf", b"%PDF-1.4 ...".as_slice()),
            ("staging/u1/1.jpg", b"\xFF\xD8\xFF\xE0....".as_slice()),
            ("staging/u1/merged.pdf", b"%PDF-1.4 old".as_slice()),
            ("staging/u10/1.jpg", b"\xFF\xD8\xFF".as_slice()),
        ])
        .await;

        let stager = ObjectStager::new(storage, 2, 1024);
        let batch = stager.stage("u1", "requester-1").await.unwrap();

        assert_eq!(batch.upload_id, "u1");
        assert_eq!(batch.requester_id, "requester-1");
        let summary: Vec<(usize, &str, MimeKind)> = batch
            .parts
            .iter()
            .map(|p| (p.sequence_index, p.key.as_str(), p.mime_kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "staging/u1/1.jpg", MimeKind::Jpeg),
                (1, "staging/u1/2.png", MimeKind::Png),
                (2, "staging/u1/10.pdf", MimeKind::Pdf),
            ]
        );
    }

    #[tokio::test]
    async fn test_stage_without_parts_is_not_found() {
        let (_dir, storage) =
            storage_with(&[("staging/u1/merged.pdf", b"%PDF-1.4".as_slice())]).await;
        let stager = ObjectStager::new(storage, 4, 1024);

        let err = stager.stage("u1", "r").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = stager.stage("missing", "r").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_oversized_parts_are_skipped() {
        let big = vec![0u8; 64];
        let (_dir, storage) = storage_with(&[
            ("staging/u1/1.jpg", big.as_slice()),
            ("staging/u1/2.jpg", b"\xFF\xD8\xFF".as_slice()),
        ])
        .await;
        let stager = ObjectStager::new(storage, 4, 16);

        let batch = stager.stage("u1", "r").await.unwrap();
        assert_eq!(batch.parts.len(), 1);
        assert_eq!(batch.parts[0].key, "staging/u1/2.jpg");
        assert_eq!(batch.parts[0].sequence_index, 0);
    }

    #[tokio::test]
    async fn test_stage_rejects_traversal_upload_id() {
        let (_dir, storage) = storage_with(&[]).await;
        let stager = ObjectStager::new(storage, 4, 1024);
        let err = stager.stage("../etc", "r").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
