//! src/services/ingest.rs
//!
//! IngestService: the upload path shared by `/api/files/upload` and
//! `/api/files/upload-image`:
//!
//! 1. reject payloads above [`MAX_UPLOAD_BYTES`]
//! 2. fingerprint the buffer (MD5 + SHA-256)
//! 3. classify files by extension into a Feishu `file_type`
//! 4. hand the same buffer to the [`RemoteUploader`]
//! 5. record one `file_metadata` row; a failed insert is logged, not returned

use crate::{
    models::{
        feishu::{FileCategory, UploadReceipt},
        resource::{NewResource, ResourceType},
    },
    services::{
        metadata_store::MetadataStore,
        remote::{RemoteError, RemoteUploader},
    },
};
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upload ceiling, 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const AUDIO_NEEDS_OPUS: [&str; 5] = ["mp3", "wav", "flac", "aac", "ogg"];
const VIDEO_NEEDS_MP4: [&str; 5] = ["avi", "mov", "wmv", "flv", "mkv"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing multipart field `{0}`")]
    MissingField(&'static str),
    #[error("invalid multipart request: {0}")]
    BadRequest(String),
    #[error("file too large, please choose a file smaller than {} MB", .limit / (1024 * 1024))]
    TooLarge { limit: usize },
    #[error(
        "audio files must be OPUS (got .{ext}); convert with: ffmpeg -i {filename} -acodec libopus -ac 1 -ar 16000 output.opus"
    )]
    AudioNeedsOpus { ext: String, filename: String },
    #[error("video files must be MP4 (got .{ext}); please convert the file to MP4 first")]
    VideoNeedsMp4 { ext: String },
    #[error("failed to read upload: {0}")]
    Read(String),
    #[error("upload to feishu failed: {0}")]
    Upload(#[from] RemoteError),
    #[error("upload to feishu failed: server returned no {0}")]
    InvalidRemoteResponse(&'static str),
}

impl IngestError {
    /// Caller faults are 400, everything after the input was accepted is 500.
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingField(_)
            | IngestError::BadRequest(_)
            | IngestError::TooLarge { .. }
            | IngestError::AudioNeedsOpus { .. }
            | IngestError::VideoNeedsMp4 { .. } => StatusCode::BAD_REQUEST,
            IngestError::Read(_)
            | IngestError::Upload(_)
            | IngestError::InvalidRemoteResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Lowercase hex digests of one buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub md5: String,
    pub sha256: String,
}

impl Fingerprint {
    pub fn of(payload: &[u8]) -> Self {
        Self {
            md5: format!("{:x}", md5::compute(payload)),
            sha256: hex::encode(Sha256::digest(payload)),
        }
    }
}

/// Map a filename to the `file_type` Feishu expects.
///
/// Total over all inputs: a missing or unknown extension is `stream`, and
/// only non-OPUS audio and non-MP4 video are refused.
pub fn classify_file(filename: &str) -> IngestResult<FileCategory> {
    let ext = file_extension(filename);

    let category = match ext.as_str() {
        "opus" => FileCategory::Opus,
        "mp4" | "m4v" | "m4a" => FileCategory::Mp4,
        "pdf" => FileCategory::Pdf,
        "doc" | "docx" => FileCategory::Doc,
        "xls" | "xlsx" => FileCategory::Xls,
        "ppt" | "pptx" => FileCategory::Ppt,
        e if AUDIO_NEEDS_OPUS.contains(&e) => {
            return Err(IngestError::AudioNeedsOpus {
                ext: e.to_string(),
                filename: filename.to_string(),
            });
        }
        e if VIDEO_NEEDS_MP4.contains(&e) => {
            return Err(IngestError::VideoNeedsMp4 { ext: e.to_string() });
        }
        _ => FileCategory::Stream,
    };
    Ok(category)
}

/// Lowercased text after the last `.` of the final path component.
/// A bare `.mp3` has extension `mp3`.
fn file_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// An upload as received from the client.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    pub resource_type: ResourceType,
    pub filename: String,
    pub payload: Bytes,
    /// Playback length in milliseconds, forwarded for `opus`/`mp4`.
    pub duration_ms: Option<u32>,
    pub upload_user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestOutcome {
    pub resource_type: ResourceType,
    pub resource_key: String,
    pub fingerprint: Fingerprint,
    /// `None` for images.
    pub category: Option<FileCategory>,
}

#[derive(Clone)]
pub struct IngestService {
    uploader: Arc<dyn RemoteUploader>,
    store: MetadataStore,
}

impl IngestService {
    pub fn new(uploader: Arc<dyn RemoteUploader>, store: MetadataStore) -> Self {
        Self { uploader, store }
    }

    pub async fn ingest(&self, req: IngestRequest) -> IngestResult<IngestOutcome> {
        let size = req.payload.len();
        if size > MAX_UPLOAD_BYTES {
            warn!(
                filename = %req.filename,
                size,
                "rejecting upload above {} bytes",
                MAX_UPLOAD_BYTES
            );
            return Err(IngestError::TooLarge {
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let fingerprint = Fingerprint::of(&req.payload);
        debug!(
            filename = %req.filename,
            size,
            md5 = %fingerprint.md5,
            sha256 = %fingerprint.sha256,
            "fingerprinted upload"
        );

        let (category, receipt) = match req.resource_type {
            ResourceType::File => {
                let category = classify_file(&req.filename).inspect_err(|err| {
                    warn!(filename = %req.filename, "rejecting upload: {}", err);
                })?;
                debug!(filename = %req.filename, %category, "classified upload");
                let receipt = self
                    .uploader
                    .upload_file(category, &req.filename, req.payload.clone(), req.duration_ms)
                    .await;
                (Some(category), receipt)
            }
            ResourceType::Image => (None, self.uploader.upload_image(req.payload.clone()).await),
        };

        let receipt = receipt.inspect_err(|err| {
            error!(filename = %req.filename, "upload to feishu failed: {}", err);
        })?;
        let resource_key = accepted_key(&receipt, req.resource_type)?;

        info!(
            resource_type = %req.resource_type,
            resource_key = %resource_key,
            size,
            "uploaded to feishu"
        );

        let record = NewResource {
            resource_type: req.resource_type,
            resource_key: resource_key.clone(),
            original_name: req.filename,
            file_size: size as i64,
            md5_hash: fingerprint.md5.clone(),
            sha256_hash: fingerprint.sha256.clone(),
            upload_time: Utc::now(),
            upload_user_id: req.upload_user_id,
            feishu_api_response: receipt.raw.to_string(),
        };
        // Best effort: a lost row does not fail the request.
        if let Err(err) = self.store.insert(&record).await {
            error!(
                resource_key = %resource_key,
                "failed to save {} metadata: {}",
                req.resource_type,
                err
            );
        }

        Ok(IngestOutcome {
            resource_type: req.resource_type,
            resource_key,
            fingerprint,
            category,
        })
    }
}

fn accepted_key(receipt: &UploadReceipt, resource_type: ResourceType) -> IngestResult<String> {
    match receipt.resource_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(key.to_string()),
        _ => {
            error!(
                "feishu accepted the {} but returned no {}",
                resource_type,
                resource_type.key_field()
            );
            Err(IngestError::InvalidRemoteResponse(resource_type.key_field()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        metadata_store::tests::memory_store,
        remote::stub::{StubOutcome, StubUploader},
    };

    fn file_request(filename: &str, payload: &[u8]) -> IngestRequest {
        IngestRequest {
            resource_type: ResourceType::File,
            filename: filename.to_string(),
            payload: Bytes::copy_from_slice(payload),
            duration_ms: None,
            upload_user_id: None,
        }
    }

    async fn service(outcome: StubOutcome) -> (IngestService, Arc<StubUploader>, MetadataStore) {
        let uploader = Arc::new(StubUploader::new(outcome));
        let store = memory_store().await;
        let svc = IngestService::new(uploader.clone(), store.clone());
        (svc, uploader, store)
    }

    #[test]
    fn fingerprint_matches_known_digests() {
        let fp = Fingerprint::of(b"abc");
        assert_eq!(fp.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            fp.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let empty = Fingerprint::of(b"");
        assert_eq!(empty.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            empty.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify_file("clip.opus").unwrap(), FileCategory::Opus);
        assert_eq!(classify_file("report.pdf").unwrap(), FileCategory::Pdf);
        assert_eq!(classify_file("REPORT.PDF").unwrap(), FileCategory::Pdf);
        assert_eq!(classify_file("notes.docx").unwrap(), FileCategory::Doc);
        assert_eq!(classify_file("q3.xlsx").unwrap(), FileCategory::Xls);
        assert_eq!(classify_file("deck.ppt").unwrap(), FileCategory::Ppt);
        assert_eq!(classify_file("voice.m4a").unwrap(), FileCategory::Mp4);
        assert_eq!(classify_file("archive.zip").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("photo.png").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("server.log").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("noext").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("trailing.").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file(".opus").unwrap(), FileCategory::Opus);
        assert_eq!(classify_file(".pdf").unwrap(), FileCategory::Pdf);
        assert_eq!(classify_file("backup.d/noext").unwrap(), FileCategory::Stream);
        assert_eq!(classify_file("docs/report.v2.PDF").unwrap(), FileCategory::Pdf);
    }

    #[test]
    fn bare_extension_names_are_still_rejected() {
        let err = classify_file(".mp3").unwrap_err();
        assert!(matches!(err, IngestError::AudioNeedsOpus { ref ext, .. } if ext == "mp3"));
        assert!(err.to_string().contains("ffmpeg -i .mp3"));

        let err = classify_file(".MKV").unwrap_err();
        assert!(matches!(err, IngestError::VideoNeedsMp4 { ref ext } if ext == "mkv"));
    }

    #[test]
    fn non_opus_audio_is_rejected_with_transcode_hint() {
        let err = classify_file("clip.mp3").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let msg = err.to_string();
        assert!(msg.contains("OPUS"), "{msg}");
        assert!(msg.contains("ffmpeg -i clip.mp3"), "{msg}");
    }

    #[test]
    fn non_mp4_video_is_rejected() {
        let err = classify_file("movie.MKV").unwrap_err();
        assert!(matches!(err, IngestError::VideoNeedsMp4 { ref ext } if ext == "mkv"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn successful_upload_returns_digests_and_persists_row() {
        let (svc, uploader, store) = service(StubOutcome::Keys("file_v3")).await;
        let payload = b"%PDF-1.7 quarterly numbers";

        let out = svc.ingest(file_request("report.pdf", payload)).await.unwrap();

        assert_eq!(out.resource_key, "file_v3-1");
        assert_eq!(out.fingerprint, Fingerprint::of(payload));
        assert_eq!(out.category, Some(FileCategory::Pdf));

        let uploads = uploader.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].category, Some(FileCategory::Pdf));
        assert_eq!(uploads[0].filename.as_deref(), Some("report.pdf"));
        assert_eq!(&uploads[0].payload[..], payload);

        let row = store.find_by_key("file_v3-1").await.unwrap();
        assert_eq!(row.file_size, Some(payload.len() as i64));
        assert_eq!(row.md5_hash.as_deref(), Some(out.fingerprint.md5.as_str()));
        assert_eq!(
            row.sha256_hash.as_deref(),
            Some(out.fingerprint.sha256.as_str())
        );
        assert_eq!(
            row.feishu_api_response.as_deref(),
            Some(r#"{"file_key":"file_v3-1"}"#)
        );
    }

    #[tokio::test]
    async fn oversize_payload_never_reaches_uploader() {
        let (svc, uploader, store) = service(StubOutcome::Keys("file_v3")).await;
        let payload = vec![0u8; MAX_UPLOAD_BYTES + 1];

        let err = svc.ingest(file_request("big.bin", &payload)).await.unwrap_err();

        assert!(matches!(err, IngestError::TooLarge { .. }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(uploader.calls(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn payload_at_ceiling_is_accepted() {
        let (svc, uploader, _store) = service(StubOutcome::Keys("file_v3")).await;
        let payload = vec![7u8; MAX_UPLOAD_BYTES];

        svc.ingest(file_request("exact.bin", &payload)).await.unwrap();
        assert_eq!(uploader.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_format_never_reaches_uploader() {
        let (svc, uploader, _store) = service(StubOutcome::Keys("file_v3")).await;
        let err = svc.ingest(file_request("song.flac", b"fLaC")).await.unwrap_err();
        assert!(matches!(err, IngestError::AudioNeedsOpus { .. }));
        assert_eq!(uploader.calls(), 0);
    }

    #[tokio::test]
    async fn remote_failure_writes_no_row() {
        let (svc, uploader, store) = service(StubOutcome::Fail).await;
        let before = store.count().await.unwrap();

        let err = svc.ingest(file_request("report.pdf", b"pdf")).await.unwrap_err();

        assert!(matches!(err, IngestError::Upload(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(uploader.calls(), 1);
        assert_eq!(store.count().await.unwrap(), before);
    }

    #[tokio::test]
    async fn empty_remote_key_is_an_error_and_writes_no_row() {
        let (svc, _uploader, store) = service(StubOutcome::EmptyKey).await;

        let err = svc
            .ingest(IngestRequest {
                resource_type: ResourceType::Image,
                filename: "cat.png".into(),
                payload: Bytes::from_static(b"\x89PNG"),
                duration_ms: None,
                upload_user_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::InvalidRemoteResponse("image_key")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_still_reports_success() {
        let (svc, _uploader, store) = service(StubOutcome::Keys("file_v3")).await;
        sqlx::query("DROP TABLE file_metadata")
            .execute(&*store.db)
            .await
            .unwrap();
        let payload = b"audit row will be lost";

        let out = svc.ingest(file_request("notes.txt", payload)).await.unwrap();

        assert_eq!(out.resource_key, "file_v3-1");
        assert_eq!(out.fingerprint, Fingerprint::of(payload));
        assert_eq!(out.category, Some(FileCategory::Stream));
    }

    #[tokio::test]
    async fn identical_content_is_stored_twice_with_distinct_keys() {
        let (svc, _uploader, store) = service(StubOutcome::Keys("img_v3")).await;
        let image = |name: &str| IngestRequest {
            resource_type: ResourceType::Image,
            filename: name.to_string(),
            payload: Bytes::from_static(b"same pixels"),
            duration_ms: None,
            upload_user_id: Some("ou_123".into()),
        };

        let first = svc.ingest(image("a.png")).await.unwrap();
        let second = svc.ingest(image("b.png")).await.unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
        assert_ne!(first.resource_key, second.resource_key);
        assert_eq!(first.category, None);
        assert_eq!(store.count().await.unwrap(), 2);

        let row = store.find_by_key(&second.resource_key).await.unwrap();
        assert_eq!(row.resource_type, ResourceType::Image);
        assert_eq!(row.upload_user_id.as_deref(), Some("ou_123"));
    }
}
