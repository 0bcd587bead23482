//! The per-message decode → admit → parse → store → materialize pipeline
//! (§4.G steps 1-8), independent of the broker plumbing that calls it.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::error::Result;
use crate::message::CoverageMessage;
use crate::model::CoverageFormat;
use crate::parsers::trace::parse_trace;
use crate::repo::RepoCache;
use crate::resolver::resolve_base_commit;
use crate::store::{IngestInput, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ingested (or logically failed and marked so) — ack the message.
    Completed,
    /// Malformed envelope (bad JSON, empty `repo_id`): nack without requeue.
    NackNoRequeue,
    /// `repo_id` not present in Config: ack and drop, not an error.
    AdmissionMiss,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// Decodes and processes one message body. An `Err` return means processing
/// failed after admission (steps 5-8's parse/store/materialize path) and
/// the caller should apply the retry envelope (§4.G retry policy); the `Ok`
/// variants cover the two terminal/non-retry paths.
pub async fn process_message(
    store: &dyn Store,
    repo_cache: &RepoCache,
    body: &[u8],
) -> Result<Outcome> {
    let msg = match CoverageMessage::decode(body) {
        Ok(m) => m,
        Err(e) => {
            let preview: String = String::from_utf8_lossy(&body[..body.len().min(500)]).into();
            warn!(error = %e, preview, "malformed coverage message, dropping");
            return Ok(Outcome::NackNoRequeue);
        }
    };

    if msg.repo_id.trim().is_empty() {
        warn!("coverage message has empty repo_id, dropping");
        return Ok(Outcome::NackNoRequeue);
    }

    let Some(config) = store.get_config(&msg.repo_id)? else {
        info!(repo_id = msg.repo_id, "repo_id not admitted, dropping message");
        return Ok(Outcome::AdmissionMiss);
    };

    let now = now_ms();

    let Some(format) = CoverageFormat::parse(&msg.coverage.format) else {
        let error_message = format!("unsupported coverage format: {}", msg.coverage.format);
        store.mark_failed(
            &msg.repo_id,
            &msg.repo,
            &msg.branch,
            &config.base_branch,
            &error_message,
            now,
        )?;
        return Err(crate::error::DeltacovError::Parser(error_message));
    };

    let blocks = parse_trace(&msg.coverage.raw);

    let report = store.ingest(IngestInput {
        repo_id: &msg.repo_id,
        repo_name: &msg.repo,
        branch: &msg.branch,
        commit: &msg.commit,
        ci: crate::model::CiMetadata {
            provider: msg.ci.provider.clone(),
            pipeline_id: msg.ci.pipeline_id.clone(),
            job_id: msg.ci.job_id.clone(),
        },
        format,
        raw_trace: &msg.coverage.raw,
        blocks,
        default_base_branch: &config.base_branch,
        now_ms: now,
    })?;

    info!(
        repo_id = msg.repo_id,
        branch = msg.branch,
        commit = msg.commit,
        "ingested coverage report"
    );

    // Step 7: best-effort target materialization.
    match repo_cache.ensure_worktree(&config.repo_url, &msg.commit).await {
        Ok(_) => {
            // Step 8: lazy base-commit resolution, only if not already set.
            if report.base_commit.is_empty() {
                if let Some(base_commit) = resolve_base_commit(
                    repo_cache,
                    &config.repo_url,
                    &report.base_branch,
                    &msg.commit,
                )
                .await
                {
                    store.set_base_commit_if_empty(report.id, &base_commit)?;
                    if let Err(e) = repo_cache.ensure_worktree(&config.repo_url, &base_commit).await
                    {
                        warn!(error = %e, base_commit, "best-effort base worktree materialization failed");
                    }
                } else {
                    warn!(repo_id = msg.repo_id, "base commit could not be resolved");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, commit = msg.commit, "best-effort target materialization failed");
        }
    }

    Ok(Outcome::Completed)
}
