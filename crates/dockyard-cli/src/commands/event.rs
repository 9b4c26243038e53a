//! Dry-run event routing against the declared rules.

use anyhow::{Context, Result};
use dockyard_config::AppConfig;
use dockyard_core::job::SubmissionReceipt;
use dockyard_scheduler::{EventRouter, LocalJobQueue};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::deploy::render;

fn read_event(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file: {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Event is not valid JSON")
}

/// Route `event` through the rules `config` declares.
pub async fn submissions(config: &AppConfig, event: &Value) -> Result<Vec<SubmissionReceipt>> {
    let deployment = render(config).await?;
    let queue = Arc::new(LocalJobQueue::from_deployment(&deployment));
    let router =
        EventRouter::from_deployment(&deployment, queue.clone()).with_dedupe(config.trigger.dedupe);
    debug!(rules = router.rules().len(), "Routing event");
    Ok(router.route(event).await?)
}

pub async fn route(config: &AppConfig, path: &Path) -> Result<()> {
    let event = read_event(path)?;
    let receipts = submissions(config, &event).await?;
    if receipts.is_empty() {
        println!("No rule matched; nothing would be submitted");
        return Ok(());
    }
    for receipt in receipts {
        println!(
            "✓ job {} ({}) -> queue {}",
            receipt.job_name, receipt.job_id, receipt.job_queue
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::Namespace;
    use serde_json::json;

    fn event(tag: &str) -> Value {
        json!({
            "id": "evt-1",
            "detail-type": "ECR Image Action",
            "detail": {
                "result": "SUCCESS",
                "action-type": "PUSH",
                "repository-name": "cicdpipelineawsbatch",
                "image-tag": tag
            }
        })
    }

    #[tokio::test]
    async fn test_event_against_lowercased_registry() {
        let config = AppConfig::new(Namespace::new("CICDPipelineAWSBatch").unwrap());
        let receipts = submissions(&config, &event("latest")).await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].job_queue, "CICDPipelineAWSBatch-job-queue");

        assert!(submissions(&config, &event("v2")).await.unwrap().is_empty());
    }

    #[test]
    fn test_read_event_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, event("latest").to_string()).unwrap();
        assert_eq!(read_event(&path).unwrap()["id"], "evt-1");

        std::fs::write(&path, "not json").unwrap();
        assert!(read_event(&path).is_err());
    }
}
