use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CommandResponse;
use crate::context::ExecutionContext;
use crate::errors::Result;

/// Unconditional write.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SetCommand {
    pub key: String,
    pub value: String,
    /// Fixed when the command is built; a time at or before the epoch never expires.
    #[serde(rename = "expireTime", default)]
    pub expire_time: DateTime<Utc>,
}

impl SetCommand {
    pub fn new(key: impl Into<String>, value: impl Into<String>, expire_time: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expire_time,
        }
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext, index: u64) -> Result<CommandResponse> {
        let resp = ctx
            .store()
            .set(&self.key, &self.value, self.expire_time, index)
            .await?;
        Ok(CommandResponse::Change(resp))
    }
}

/// Write only if the current value equals `prev_value` when the entry is applied.
///
/// Logs written before the field tag was fixed carry the previous value as
/// `PrevValue`; that name is still emitted so older nodes can decode new
/// entries, and `prevValue` is accepted on the way in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TestAndSetCommand {
    pub key: String,
    pub value: String,
    #[serde(rename = "PrevValue", alias = "prevValue")]
    pub prev_value: String,
    #[serde(rename = "expireTime", default)]
    pub expire_time: DateTime<Utc>,
}

impl TestAndSetCommand {
    pub fn new(
        key: impl Into<String>,
        prev_value: impl Into<String>,
        value: impl Into<String>,
        expire_time: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            prev_value: prev_value.into(),
            expire_time,
        }
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext, index: u64) -> Result<CommandResponse> {
        let resp = ctx
            .store()
            .test_and_set(
                &self.key,
                &self.prev_value,
                &self.value,
                self.expire_time,
                index,
            )
            .await?;
        Ok(CommandResponse::Change(resp))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GetCommand {
    pub key: String,
}

impl GetCommand {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext) -> Result<CommandResponse> {
        let resp = ctx.store().get(&self.key).await?;
        Ok(CommandResponse::Change(resp))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteCommand {
    pub key: String,
}

impl DeleteCommand {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub(crate) async fn apply(&self, ctx: &ExecutionContext, index: u64) -> Result<CommandResponse> {
        let resp = ctx.store().delete(&self.key, index).await?;
        debug!(key = %resp.key, index, "deleted");
        Ok(CommandResponse::Change(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_and_set_keeps_legacy_prev_value_tag() {
        let cmd = TestAndSetCommand::new("/a", "1", "2", raftkv_store::permanent());
        let encoded = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            encoded,
            json!({
                "key": "/a",
                "value": "2",
                "PrevValue": "1",
                "expireTime": "1970-01-01T00:00:00Z"
            })
        );

        let corrected: TestAndSetCommand = serde_json::from_value(json!({
            "key": "/a",
            "value": "2",
            "prevValue": "1",
            "expireTime": "1970-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(corrected, cmd);
    }

    #[test]
    fn set_accepts_zero_time_and_missing_expiry() {
        let zero: SetCommand = serde_json::from_value(json!({
            "key": "/a",
            "value": "1",
            "expireTime": "0001-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(raftkv_store::is_permanent(&zero.expire_time));

        let missing: SetCommand =
            serde_json::from_value(json!({ "key": "/a", "value": "1" })).unwrap();
        assert_eq!(missing.expire_time, raftkv_store::permanent());
    }
}
