//! File-based artifacts
//!
//! Category evidence and condensed profiles are JSON documents under the
//! research directory; rendered reports are markdown under the reports
//! directory. Every write returns the SHA-256 of the bytes on disk.

use crate::error::PipelineError;
use crate::models::{CategoryEvidence, CondensedProfile};
use crate::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub path: PathBuf,
    pub sha256: String,
}

pub struct ArtifactStore {
    research_dir: PathBuf,
    reports_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(research_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            research_dir: research_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn research_dir(&self) -> &Path {
        &self.research_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// `<category>_<safe_subject>_<date>_<job>.json`
    pub async fn save_category_evidence(
        &self,
        job_id: Uuid,
        subject: &str,
        evidence: &CategoryEvidence,
    ) -> Result<PersistedArtifact> {
        let filename = format!(
            "{}_{}_{}_{}.json",
            evidence.category,
            safe_subject(subject)?,
            date_stamp(),
            job_id.simple()
        );
        write_json(&self.research_dir, &filename, evidence).await
    }

    pub async fn load_category_evidence(path: &Path) -> Result<CategoryEvidence> {
        read_json(path).await
    }

    /// `condensed_<safe_subject>_<date>_<job>.json`
    pub async fn save_profile(
        &self,
        job_id: Uuid,
        profile: &CondensedProfile,
    ) -> Result<PersistedArtifact> {
        let filename = format!(
            "condensed_{}_{}_{}.json",
            safe_subject(&profile.subject)?,
            date_stamp(),
            job_id.simple()
        );
        write_json(&self.research_dir, &filename, profile).await
    }

    pub async fn load_profile(path: &Path) -> Result<CondensedProfile> {
        read_json(path).await
    }

    /// `<safe_subject>_Analyst_Report_<date>_<job>.md`
    pub async fn save_report(
        &self,
        job_id: Uuid,
        subject: &str,
        markdown: &str,
    ) -> Result<PersistedArtifact> {
        let filename = format!(
            "{}_Analyst_Report_{}_{}.md",
            safe_subject(subject)?,
            date_stamp(),
            job_id.simple()
        );

        let mut hasher = Sha256::new();
        hasher.update(markdown.as_bytes());
        write_bytes(&self.reports_dir, &filename, markdown.as_bytes(), hasher).await
    }

    /// Recompute the digest of the file on disk.
    pub async fn verify(artifact: &PersistedArtifact) -> Result<bool> {
        let bytes = tokio::fs::read(&artifact.path).await?;
        Ok(hex::encode(Sha256::digest(&bytes)) == artifact.sha256)
    }
}

/// Alphanumerics, space, `-` and `_` survive; spaces become underscores.
pub fn safe_subject(subject: &str) -> Result<String> {
    let kept: String = subject
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = kept.trim().replace(' ', "_");

    if safe.is_empty() {
        return Err(PipelineError::ArtifactError(format!(
            "subject '{}' yields an empty file name",
            subject
        )));
    }
    Ok(safe)
}

/// Subjects that share a key would write under the same file-name stem.
pub fn subject_key(subject: &str) -> String {
    safe_subject(subject)
        .unwrap_or_else(|_| subject.trim().to_string())
        .to_lowercase()
}

fn date_stamp() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

async fn write_json<T: Serialize>(dir: &Path, filename: &str, value: &T) -> Result<PersistedArtifact> {
    let mut hasher = Sha256::new();
    let mut buffer = Vec::new();

    // Serialize once; every byte goes to the buffer and the hasher together.
    serde_json::to_writer_pretty(
        DigestingWriter {
            inner: &mut buffer,
            hasher: &mut hasher,
        },
        value,
    )?;

    write_bytes(dir, filename, &buffer, hasher).await
}

async fn write_bytes(
    dir: &Path,
    filename: &str,
    bytes: &[u8],
    hasher: Sha256,
) -> Result<PersistedArtifact> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        PipelineError::ArtifactError(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        PipelineError::ArtifactError(format!("cannot write {}: {}", path.display(), e))
    })?;

    let sha256 = hex::encode(hasher.finalize());
    debug!(path = %path.display(), bytes = bytes.len(), %sha256, "Artifact written");

    Ok(PersistedArtifact { path, sha256 })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        PipelineError::ArtifactError(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Tees writes into a byte sink and a digest.
struct DigestingWriter<'a, W: Write, H: Digest> {
    inner: W,
    hasher: &'a mut H,
}

impl<'a, W: Write, H: Digest> Write for DigestingWriter<'a, W, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryEssence, ConfidenceTier, EvidenceItem, KeyMetric};

    fn store(dir: &tempfile::TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path().join("research"), dir.path().join("reports"))
    }

    fn evidence() -> CategoryEvidence {
        let mut category = CategoryEvidence::new("3_balance_sheet_health_and_liquidity");
        category.push_subtopic(
            "credit ratings",
            "Acme credit ratings",
            vec![EvidenceItem {
                url: "https://www.reuters.com/acme".into(),
                title: "Acme upgraded".into(),
                source_domain: "www.reuters.com".into(),
                retrieved_at: Utc::now(),
                excerpt: "Rating agency upgrades Acme to AA.".into(),
                confidence: ConfidenceTier::High,
                raw_content: None,
            }],
            10,
        );
        category
    }

    #[test]
    fn test_safe_subject() {
        assert_eq!(safe_subject("Acme Industries Ltd.").unwrap(), "Acme_Industries_Ltd");
        assert_eq!(safe_subject("Tata-Steel & Co").unwrap(), "Tata-Steel__Co");
        assert!(safe_subject("&&&").is_err());
    }

    #[test]
    fn test_subject_key_matches_file_name_stem() {
        assert_eq!(subject_key("Acme."), subject_key("acme"));
        assert_eq!(subject_key("Acme Industries"), "acme_industries");
        assert_ne!(subject_key("Acme"), subject_key("Acme Industries"));
        assert_eq!(subject_key(" && "), "&&");
    }

    #[tokio::test]
    async fn test_category_evidence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let original = evidence();

        let artifact = store
            .save_category_evidence(Uuid::new_v4(), "Acme Industries", &original)
            .await
            .unwrap();
        let name = artifact.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("3_balance_sheet_health_and_liquidity_Acme_Industries_"));
        assert!(name.ends_with(".json"));

        let loaded = ArtifactStore::load_category_evidence(&artifact.path).await.unwrap();
        assert_eq!(loaded, original);
        assert!(ArtifactStore::verify(&artifact).await.unwrap());
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut profile = CondensedProfile::new("Acme");
        profile
            .insert(CategoryEssence {
                category: "1_business".into(),
                core_facts: vec!["Makes widgets".into()],
                key_numbers: vec![KeyMetric {
                    metric: "Revenue".into(),
                    value: "₹1,200 Cr".into(),
                    source: "annual report".into(),
                }],
                risks_and_red_flags: vec![],
                strengths: vec!["Brand".into()],
                key_quotes: vec![],
                source_quality: ConfidenceTier::Medium,
                summary: "Widget maker.".into(),
                error: None,
            })
            .unwrap();
        profile.insert(CategoryEssence::sentinel("2_financial", "timeout")).unwrap();

        let artifact = store.save_profile(Uuid::new_v4(), &profile).await.unwrap();
        let loaded = ArtifactStore::load_profile(&artifact.path).await.unwrap();
        assert_eq!(loaded, profile);
    }

    #[tokio::test]
    async fn test_report_digest_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let artifact = store.save_report(Uuid::new_v4(), "Acme", "# Acme\nAVOID").await.unwrap();
        assert!(artifact.path.starts_with(store.reports_dir()));
        assert!(ArtifactStore::verify(&artifact).await.unwrap());

        tokio::fs::write(&artifact.path, "# Acme\nBUY").await.unwrap();
        assert!(!ArtifactStore::verify(&artifact).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_day_reports_for_one_subject_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let (first_job, second_job) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.save_report(first_job, "Acme", "# Acme\nBUY").await.unwrap();
        let second = store.save_report(second_job, "Acme.", "# Acme\nAVOID").await.unwrap();

        assert_ne!(first.path, second.path);
        assert!(first
            .path
            .to_string_lossy()
            .ends_with(&format!("_{}.md", first_job.simple())));
        assert!(ArtifactStore::verify(&first).await.unwrap());
        assert!(ArtifactStore::verify(&second).await.unwrap());
    }
}
