//! Publish/version coordinator
//!
//! Promotes a REVIEW draft into the letter store and manages later edits. Each accepted
//! change appends an immutable version at `(date, timestamp)` and then moves the letter's
//! current pointer with a conditional write, so two concurrent publishers at one date can
//! never both win. A published PDF is copied to its version's own key before the pointer
//! moves and removed again if the change loses.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use heirloom_core::keys::{self, Address};
use heirloom_core::models::{DraftStatus, Letter, LetterContent, LetterVersion};
use heirloom_core::AppError;
use heirloom_db::{DraftRepository, LetterRepository, SortOrder, VersionPage, Versioned};
use heirloom_storage::keys::{letter_pdf_key, letter_prefix};
use heirloom_storage::Storage;
use serde::Serialize;

/// Operator approval of a draft.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub draft_id: String,
    pub date: String,
    pub title: String,
    pub author: String,
    pub content: String,
    /// Allow publishing over an existing letter as a new version
    pub edit: bool,
    pub editor: Option<String>,
}

impl PublishRequest {
    fn body(&self) -> LetterContent {
        LetterContent {
            title: self.title.clone(),
            author: self.author.clone(),
            content: self.content.clone(),
        }
    }
}

/// Result of a successful publish, edit, or restore.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedLetter {
    /// Address of the letter's current pointer
    pub address: Address,
    pub letter: Letter,
    pub version: LetterVersion,
}

/// What the pointer must look like before a change is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precondition {
    /// First publish of a date
    Absent,
    /// Edit of an existing letter
    Present,
    /// Publish that may create or extend the letter
    Any,
}

/// Content of a version about to be appended.
struct PendingVersion {
    date: String,
    body: LetterContent,
    /// Merged document to copy to the new version's PDF key, with its upload id
    pdf_source: Option<(String, String)>,
    /// Existing PDF to reference when nothing is copied
    pdf_key: Option<String>,
    editor: Option<String>,
    source_upload_id: Option<String>,
    restored_from: Option<String>,
}

#[derive(Clone)]
pub struct PublishCoordinator {
    letters: LetterRepository,
    drafts: DraftRepository,
    storage: Arc<dyn Storage>,
}

impl PublishCoordinator {
    pub fn new(
        letters: LetterRepository,
        drafts: DraftRepository,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            letters,
            drafts,
            storage,
        }
    }

    /// Publish a REVIEW draft at `request.date`.
    ///
    /// The draft is consumed with a conditional delete before anything is written, so one
    /// draft publishes at most once. Fails with `Conflict` when a letter already exists at
    /// that date and `edit` is not set, when a concurrent publish moved the pointer first,
    /// or when the draft was consumed or replaced concurrently. A failed publish puts the
    /// draft back and leaves no letter state behind.
    #[tracing::instrument(skip(self, request), fields(draft_id = %request.draft_id, date = %request.date, edit = request.edit))]
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishedLetter, AppError> {
        let start = Instant::now();
        letter_prefix(&request.date)?;

        let Versioned {
            value: draft,
            revision,
        } = self
            .drafts
            .get_versioned(&request.draft_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Draft {} not found", request.draft_id)))?;

        if draft.status != DraftStatus::Review {
            return Err(AppError::InvalidInput(format!(
                "Draft {} is in {} status, only REVIEW drafts can be published",
                request.draft_id, draft.status
            )));
        }

        if !self.drafts.take(&draft.upload_id, revision).await? {
            return Err(AppError::Conflict(format!(
                "Draft {} was published or replaced concurrently",
                request.draft_id
            )));
        }

        let precondition = if request.edit {
            Precondition::Any
        } else {
            Precondition::Absent
        };

        let result = self
            .commit(
                PendingVersion {
                    date: request.date.clone(),
                    body: request.body(),
                    pdf_source: draft
                        .s3_key
                        .clone()
                        .map(|key| (key, draft.upload_id.clone())),
                    pdf_key: None,
                    editor: request.editor.clone(),
                    source_upload_id: Some(draft.upload_id.clone()),
                    restored_from: None,
                },
                precondition,
            )
            .await;

        let published = match result {
            Ok(published) => published,
            Err(e) => {
                match self.drafts.restore(&draft).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!("Draft was rewritten during a failed publish"),
                    Err(restore_err) => tracing::error!(
                        error = %restore_err,
                        "Failed to put back draft after a failed publish"
                    ),
                }
                return Err(e);
            }
        };

        tracing::info!(
            timestamp = %published.version.timestamp,
            pdf_key = published.version.pdf_key.as_deref().unwrap_or_default(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Letter published"
        );

        Ok(published)
    }

    /// Append a corrected version to an existing letter without a draft.
    #[tracing::instrument(skip(self, body))]
    pub async fn edit_letter(
        &self,
        date: &str,
        body: LetterContent,
        editor: Option<String>,
    ) -> Result<PublishedLetter, AppError> {
        self.commit(
            PendingVersion {
                date: date.to_string(),
                body,
                pdf_source: None,
                pdf_key: None,
                editor,
                source_upload_id: None,
                restored_from: None,
            },
            Precondition::Present,
        )
        .await
    }

    /// Make an older version current again by appending a copy of it.
    #[tracing::instrument(skip(self))]
    pub async fn restore_version(
        &self,
        date: &str,
        timestamp: &str,
        editor: Option<String>,
    ) -> Result<PublishedLetter, AppError> {
        let old = self.get_version(date, timestamp).await?;
        self.commit(
            PendingVersion {
                date: date.to_string(),
                body: old.body,
                pdf_source: None,
                pdf_key: old.pdf_key,
                editor,
                source_upload_id: old.source_upload_id,
                restored_from: Some(old.timestamp),
            },
            Precondition::Present,
        )
        .await
    }

    pub async fn get_letter(&self, date: &str) -> Result<Letter, AppError> {
        self.letters
            .get_current(date)
            .await?
            .map(|current| current.value)
            .ok_or_else(|| AppError::NotFound(format!("Letter {} not found", date)))
    }

    pub async fn get_version(&self, date: &str, timestamp: &str) -> Result<LetterVersion, AppError> {
        self.letters
            .get_version(date, timestamp)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Version {} of letter {} not found", timestamp, date))
            })
    }

    pub async fn list_versions(
        &self,
        date: &str,
        order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<VersionPage, AppError> {
        self.letters.list_versions(date, order, limit, cursor).await
    }

    /// Append `pending` as a new version and point the letter at it.
    async fn commit(
        &self,
        pending: PendingVersion,
        precondition: Precondition,
    ) -> Result<PublishedLetter, AppError> {
        let date = pending.date.clone();
        let current = self.letters.get_current(&date).await?;

        match (precondition, &current) {
            (Precondition::Absent, Some(_)) => {
                return Err(AppError::Conflict(format!(
                    "Letter {} already exists; publish as an edit to add a version",
                    date
                )))
            }
            (Precondition::Present, None) => {
                return Err(AppError::NotFound(format!("Letter {} not found", date)))
            }
            _ => {}
        }

        let latest = self.letters.latest_version(&date).await?;
        let now = Utc::now();
        let timestamp = keys::sortable_timestamp(next_version_time(
            latest.as_ref().map(|v| v.timestamp.as_str()),
            now,
        ));

        let copied_pdf = match &pending.pdf_source {
            Some((source, upload_id)) => {
                let key = letter_pdf_key(&date, &timestamp, upload_id)?;
                self.storage.copy(source, &key).await?;
                Some(key)
            }
            None => None,
        };

        let previous = current.as_ref().map(|c| &c.value);
        let version = LetterVersion {
            date: date.clone(),
            timestamp: timestamp.clone(),
            body: pending.body,
            pdf_key: copied_pdf
                .clone()
                .or(pending.pdf_key)
                .or_else(|| previous.and_then(|p| p.pdf_key.clone())),
            editor: pending.editor,
            source_upload_id: pending.source_upload_id,
            restored_from: pending.restored_from,
            created_at: now,
        };

        let letter = match self.append_and_point(&version, current.as_ref()).await {
            Ok(letter) => letter,
            Err(e) => {
                if let Some(key) = copied_pdf.as_deref() {
                    self.discard_pdf(key).await;
                }
                return Err(e);
            }
        };

        Ok(PublishedLetter {
            address: keys::letter_current(&date)?,
            letter,
            version,
        })
    }

    /// Write `version` and move the pointer from `current` to it. A version whose
    /// pointer write loses is deleted again.
    async fn append_and_point(
        &self,
        version: &LetterVersion,
        current: Option<&Versioned<Letter>>,
    ) -> Result<Letter, AppError> {
        let date = &version.date;
        let timestamp = &version.timestamp;

        if !self.letters.create_version(version).await? {
            return Err(AppError::Conflict(format!(
                "Letter {} was changed concurrently (version {} exists)",
                date, timestamp
            )));
        }

        let letter = Letter::pointing_at(version, current.map(|c| &c.value));
        if !self
            .letters
            .put_current(&letter, current.map(|c| c.revision))
            .await?
        {
            tracing::warn!(
                date = %date,
                timestamp = %timestamp,
                "Current pointer moved concurrently, removing unreferenced version"
            );
            if let Err(e) = self
                .letters
                .delete_unreferenced_version(date, timestamp)
                .await
            {
                tracing::error!(error = %e, "Failed to remove unreferenced version");
            }
            return Err(AppError::Conflict(format!(
                "Letter {} was changed concurrently",
                date
            )));
        }

        Ok(letter)
    }

    async fn discard_pdf(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::error!(key = %key, error = %e, "Failed to remove PDF of a rejected version");
        }
    }
}

/// Time for a new version: now, or 1ms after the latest version when the clock has not
/// moved past it, so rendered timestamps strictly increase per letter.
fn next_version_time(latest: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = latest
        .and_then(keys::parse_sortable_timestamp)
        .map(|t| t + Duration::milliseconds(1));
    match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    }
}
