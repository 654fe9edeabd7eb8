//! Feed a JSON-lines file of log records through a local node.

use std::fs::read_to_string;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use raftkv_command::{
    Command, CommandError, CommandRegistry, CommandResponse, LocalNode, LogRecord,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplaySummary {
    pub(crate) applied: usize,
    pub(crate) failed: usize,
}

/// One output line per replayed record.
#[derive(Debug, Serialize)]
struct ReplayOutcome {
    line: usize,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u16>,
}

fn response_value(resp: &CommandResponse) -> Result<Value> {
    Ok(match resp {
        CommandResponse::Change(change) => serde_json::to_value(change)?,
        CommandResponse::Event(bytes) => serde_json::from_slice(bytes)?,
        CommandResponse::Join(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    })
}

/// Propose every record of `path` in order and write one JSON outcome per
/// record to `out`. Blank lines and lines starting with `#` are skipped.
///
/// A watch that is still pending after `watch_timeout` has its watchers
/// cleared, so it fails with WatchCleared instead of stalling the replay.
pub(crate) async fn replay_file<W: Write>(
    node: &LocalNode,
    path: &Path,
    out: &mut W,
    watch_timeout: Duration,
) -> Result<ReplaySummary> {
    let content = read_to_string(path)
        .with_context(|| format!("Failed to read log file {}", path.display()))?;
    let registry = CommandRegistry::global();
    let mut summary = ReplaySummary::default();

    for (pos, raw) in content.lines().enumerate() {
        let line = pos + 1;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let record = LogRecord::from_bytes(raw.as_bytes())
            .with_context(|| format!("Line {} is not a log record", line))?;
        let command = match registry.decode(&record) {
            Ok(command) => command,
            Err(e) => {
                warn!(line, error = %e, "skipping undecodable record");
                summary.failed += 1;
                write_outcome(out, line, &record.type_identifier, Err(&e))?;
                continue;
            }
        };

        let name = command.name();
        let is_watch = matches!(command, Command::Watch(_));
        let mut pending = node.submit(command).await?;

        let received = if is_watch {
            loop {
                match tokio::time::timeout(watch_timeout, &mut pending).await {
                    Ok(received) => break received,
                    Err(_) => {
                        debug!(line, "watch still pending, clearing watchers");
                        node.context().store().clear_watchers().await;
                    }
                }
            }
        } else {
            pending.await
        };
        let result = received.map_err(|_| CommandError::Stopped)?;

        match &result {
            Ok(_) => summary.applied += 1,
            Err(_) => summary.failed += 1,
        }
        write_outcome(out, line, name, result.as_ref())?;
    }

    Ok(summary)
}

fn write_outcome<W: Write>(
    out: &mut W,
    line: usize,
    command: &str,
    result: std::result::Result<&CommandResponse, &CommandError>,
) -> Result<()> {
    let outcome = match result {
        Ok(resp) => ReplayOutcome {
            line,
            command: command.to_string(),
            response: Some(response_value(resp)?),
            error: None,
            code: None,
        },
        Err(e) => ReplayOutcome {
            line,
            command: command.to_string(),
            response: e
                .payload()
                .map(|p| Value::String(String::from_utf8_lossy(p).into_owned())),
            error: Some(e.to_string()),
            code: e.code(),
        },
    };
    writeln!(out, "{}", serde_json::to_string(&outcome)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use raftkv_command::ClusterConfig;
    use raftkv_store::MemoryStore;
    use std::sync::Arc;

    const LOG: &str = r#"
# scenario
{"typeIdentifier":"etcd:set","payload":{"key":"a","value":"1","expireTime":"1970-01-01T00:00:00Z"}}
{"typeIdentifier":"etcd:testAndSet","payload":{"key":"a","value":"2","PrevValue":"1","expireTime":"1970-01-01T00:00:00Z"}}
{"typeIdentifier":"etcd:testAndSet","payload":{"key":"a","value":"3","PrevValue":"1","expireTime":"1970-01-01T00:00:00Z"}}
{"typeIdentifier":"etcd:watch","payload":{"key":"a","sinceIndex":0}}
{"typeIdentifier":"etcd:get","payload":{"key":"a"}}
{"typeIdentifier":"etcd:compact","payload":{}}
"#;

    fn outcomes(out: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replays_records_and_reports_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, LOG).unwrap();

        let node = LocalNode::start(
            "node1",
            Arc::new(MemoryStore::new()),
            ClusterConfig::default(),
        );
        let mut out = Vec::new();
        let summary = replay_file(&node, &path, &mut out, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                applied: 3,
                failed: 3
            }
        );

        let lines = outcomes(&out);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0]["response"]["index"], 1);
        assert_eq!(lines[1]["response"]["value"], "2");
        assert_eq!(lines[2]["code"], 101);
        assert_eq!(lines[3]["command"], "etcd:watch");
        assert_eq!(lines[3]["code"], 401);
        assert_eq!(lines[4]["response"]["value"], "2");
        assert_eq!(lines[5]["command"], "etcd:compact");
        assert_eq!(lines[5]["code"], 300);

        node.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_lines_that_are_not_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let node = LocalNode::start(
            "node1",
            Arc::new(MemoryStore::new()),
            ClusterConfig::default(),
        );
        let mut out = Vec::new();
        let err = replay_file(&node, &path, &mut out, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Line 1"));
    }
}
