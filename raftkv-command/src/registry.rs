//! Type identifier to decoder map used to rebuild commands from the log.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{
    Command, CommandName, DeleteCommand, GetCommand, JoinCommand, SetCommand, TestAndSetCommand,
    WatchCommand,
};
use crate::errors::{CommandError, Result};

/// A command as it is carried by a log entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub type_identifier: String,
    pub payload: Value,
}

impl LogRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

type Decoder = fn(Value) -> std::result::Result<Command, serde_json::Error>;

fn decode_as<T>(payload: Value) -> std::result::Result<Command, serde_json::Error>
where
    T: DeserializeOwned + Into<Command>,
{
    serde_json::from_value::<T>(payload).map(Into::into)
}

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl CommandRegistry {
    /// An empty registry; see [`CommandRegistry::with_all_commands`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_all_commands() -> Self {
        let mut registry = Self::new();
        registry
            .register::<SetCommand>()
            .register::<TestAndSetCommand>()
            .register::<GetCommand>()
            .register::<DeleteCommand>()
            .register::<WatchCommand>()
            .register::<JoinCommand>();
        registry
    }

    /// Process-wide registry holding every command variant. Built on first use
    /// and never modified afterwards.
    pub fn global() -> &'static CommandRegistry {
        static REGISTRY: OnceLock<CommandRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_all_commands)
    }

    pub fn register<T>(&mut self) -> &mut Self
    where
        T: CommandName + DeserializeOwned + Into<Command>,
    {
        self.decoders.insert(T::NAME, decode_as::<T>);
        self
    }

    pub fn contains(&self, type_identifier: &str) -> bool {
        self.decoders.contains_key(type_identifier)
    }

    pub fn decode(&self, record: &LogRecord) -> Result<Command> {
        let decoder = self
            .decoders
            .get(record.type_identifier.as_str())
            .ok_or_else(|| CommandError::UnknownCommand(record.type_identifier.clone()))?;

        decoder(record.payload.clone()).map_err(|source| CommandError::MalformedPayload {
            command: record.type_identifier.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn global_registry_knows_every_variant() {
        let registry = CommandRegistry::global();
        for name in [
            "etcd:set",
            "etcd:testAndSet",
            "etcd:get",
            "etcd:delete",
            "etcd:watch",
            "etcd:join",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn decode_inverts_encode() {
        let commands: Vec<Command> = vec![
            SetCommand::new("/a", "1", raftkv_store::permanent()).into(),
            TestAndSetCommand::new("/a", "1", "2", raftkv_store::permanent()).into(),
            WatchCommand::new("/a", 12).into(),
            JoinCommand::new("node2", "http://n2:7001", "http://n2:4001").into(),
        ];
        for command in commands {
            let bytes = command.encode().unwrap().to_bytes().unwrap();
            let record = LogRecord::from_bytes(&bytes).unwrap();
            assert_eq!(CommandRegistry::global().decode(&record).unwrap(), command);
        }
    }

    #[test]
    fn record_uses_wire_field_names() {
        let record = Command::from(JoinCommand::new("n", "r", "e")).encode().unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "typeIdentifier": "etcd:join",
                "payload": { "name": "n", "raftURL": "r", "etcdURL": "e" }
            })
        );
    }

    #[test]
    fn unregistered_identifier_is_unknown() {
        let mut registry = CommandRegistry::new();
        registry.register::<GetCommand>();

        let record = Command::from(DeleteCommand::new("/a")).encode().unwrap();
        let err = registry.decode(&record).unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(ref name) if name == "etcd:delete"));
    }

    #[test]
    fn payload_of_wrong_shape_is_malformed() {
        let record = LogRecord {
            type_identifier: "etcd:watch".to_string(),
            payload: json!({ "key": "/a", "sinceIndex": "not a number" }),
        };
        let err = CommandRegistry::global().decode(&record).unwrap_err();
        assert!(matches!(err, CommandError::MalformedPayload { .. }));
    }
}
