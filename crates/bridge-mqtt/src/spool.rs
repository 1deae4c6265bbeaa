//! Durable on-disk spool of publishes that couldn't be delivered while
//! the broker connection was down.
//!
//! One file per message, named by a monotonically increasing sequence
//! number so lexicographic directory order is FIFO order. Writes go to
//! a `.tmp` sibling and are renamed into place, so a crash never leaves
//! a half-written file where [`Spool::pop_next`] would trip over it.
//! Files that fail to parse are logged and deleted rather than retried
//! forever.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use bridge_core::mqtt_types::{MessageProperties, OutboundPublish, QoS};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::MqttBridgeError;

#[derive(Serialize, Deserialize)]
struct SpoolRecord {
    topic: String,
    payload: Vec<u8>,
    qos: u8,
    retain: bool,
    response_topic: Option<String>,
    correlation_data: Option<Vec<u8>>,
    user_properties: HashMap<String, String>,
    content_type: Option<String>,
    message_expiry_interval: Option<u32>,
}

impl From<&OutboundPublish> for SpoolRecord {
    fn from(publish: &OutboundPublish) -> Self {
        Self {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
            qos: qos_to_u8(publish.qos),
            retain: publish.retain,
            response_topic: publish.properties.response_topic.clone(),
            correlation_data: publish.properties.correlation_data.as_ref().map(|data| data.to_vec()),
            user_properties: publish.properties.user_properties.clone(),
            content_type: publish.properties.content_type.clone(),
            message_expiry_interval: publish.properties.message_expiry_interval,
        }
    }
}

impl From<SpoolRecord> for OutboundPublish {
    fn from(record: SpoolRecord) -> Self {
        Self {
            topic: record.topic,
            payload: record.payload.into(),
            qos: qos_from_u8(record.qos),
            retain: record.retain,
            properties: MessageProperties {
                response_topic: record.response_topic,
                correlation_data: record.correlation_data.map(Into::into),
                user_properties: record.user_properties,
                content_type: record.content_type,
                message_expiry_interval: record.message_expiry_interval,
            },
        }
    }
}

fn qos_to_u8(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Counters describing the spool's lifetime behavior, mirrored into the
/// daemon's status snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpoolSnapshot {
    /// Messages currently on disk.
    pub pending: usize,
    /// Configured maximum file count.
    pub limit: usize,
    /// Messages discarded because the spool was already at `limit`.
    pub dropped_due_to_limit: u64,
    /// Times the oldest file was deleted to make room for a new one.
    pub trim_events: u64,
    /// Files that failed to parse and were removed unread.
    pub corrupt_dropped: u64,
}

/// A directory-backed FIFO of [`OutboundPublish`] messages.
pub struct Spool {
    dir: PathBuf,
    limit: usize,
    next_seq: u64,
    dropped_due_to_limit: u64,
    trim_events: u64,
    corrupt_dropped: u64,
}

impl Spool {
    /// Open (creating if necessary) a spool rooted at `dir`, holding at
    /// most `limit` messages.
    pub async fn open(dir: impl Into<PathBuf>, limit: usize) -> Result<Self, MqttBridgeError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| MqttBridgeError::Spool { path: dir.display().to_string(), source })?;
        let next_seq = highest_sequence(&dir).await?.map_or(0, |seq| seq + 1);
        Ok(Self { dir, limit, next_seq, dropped_due_to_limit: 0, trim_events: 0, corrupt_dropped: 0 })
    }

    /// Append `publish` to the spool. If already at `limit`, the oldest
    /// file is deleted first to make room.
    pub async fn append(&mut self, publish: &OutboundPublish) -> Result<(), MqttBridgeError> {
        let mut entries = self.sorted_entries().await?;
        if self.limit > 0 && entries.len() >= self.limit {
            if let Some(oldest) = entries.first().cloned() {
                self.remove_file(&oldest).await?;
                entries.remove(0);
                self.trim_events += 1;
            }
        } else if self.limit == 0 {
            self.dropped_due_to_limit += 1;
            return Ok(());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let record = SpoolRecord::from(publish);
        let encoded = serde_json::to_vec(&record)
            .map_err(|source| MqttBridgeError::Spool { path: self.dir.display().to_string(), source: std::io::Error::other(source) })?;

        let final_path = self.dir.join(format!("{seq:020}.json"));
        let tmp_path = self.dir.join(format!("{seq:020}.json.tmp"));
        tokio::fs::write(&tmp_path, &encoded)
            .await
            .map_err(|source| MqttBridgeError::Spool { path: tmp_path.display().to_string(), source })?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|source| MqttBridgeError::Spool { path: final_path.display().to_string(), source })?;
        Ok(())
    }

    /// Pop and return the oldest message, skipping (and deleting) any
    /// corrupt files encountered along the way.
    pub async fn pop_next(&mut self) -> Result<Option<OutboundPublish>, MqttBridgeError> {
        let entries = self.sorted_entries().await?;
        for path in entries {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.remove_file(&path).await?;
                    continue;
                },
            };
            match serde_json::from_slice::<SpoolRecord>(&bytes) {
                Ok(record) => {
                    self.remove_file(&path).await?;
                    return Ok(Some(record.into()));
                },
                Err(error) => {
                    warn!(path = %path.display(), %error, "corrupt/unreadable spool file");
                    self.corrupt_dropped += 1;
                    self.remove_file(&path).await?;
                },
            }
        }
        Ok(None)
    }

    /// Current lifetime counters and pending count.
    pub async fn snapshot(&self) -> Result<SpoolSnapshot, MqttBridgeError> {
        let pending = self.sorted_entries().await?.len();
        Ok(SpoolSnapshot {
            pending,
            limit: self.limit,
            dropped_due_to_limit: self.dropped_due_to_limit,
            trim_events: self.trim_events,
            corrupt_dropped: self.corrupt_dropped,
        })
    }

    async fn sorted_entries(&self) -> Result<Vec<PathBuf>, MqttBridgeError> {
        let mut reader = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| MqttBridgeError::Spool { path: self.dir.display().to_string(), source })?;
        let mut paths = Vec::new();
        while let Some(entry) =
            reader.next_entry().await.map_err(|source| MqttBridgeError::Spool { path: self.dir.display().to_string(), source })?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), MqttBridgeError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MqttBridgeError::Spool { path: path.display().to_string(), source }),
        }
    }
}

async fn highest_sequence(dir: &Path) -> Result<Option<u64>, MqttBridgeError> {
    let mut reader =
        tokio::fs::read_dir(dir).await.map_err(|source| MqttBridgeError::Spool { path: dir.display().to_string(), source })?;
    let mut highest = None;
    while let Some(entry) =
        reader.next_entry().await.map_err(|source| MqttBridgeError::Spool { path: dir.display().to_string(), source })?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(seq) = path.file_stem().and_then(|stem| stem.to_str()).and_then(|stem| stem.parse::<u64>().ok()) {
                highest = Some(highest.map_or(seq, |current: u64| current.max(seq)));
            }
        }
    }
    Ok(highest)
}
