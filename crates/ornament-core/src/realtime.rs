//! Realtime change channel frames
//!
//! The realtime service speaks Phoenix channel JSON (v1) over a WebSocket.
//! We join one named channel filtered to INSERT events on the ornament
//! table, keep the socket alive with heartbeats, and leave the channel
//! when the scene goes away. A dropped socket is reopened after a backoff
//! and the channel joined again under a fresh join ref.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FrameError;
use crate::ornament::Ornament;
use crate::store::{decode_row, ORNAMENT_SCHEMA, ORNAMENT_TABLE};

/// Name of the channel carrying ornament inserts
pub const CHANNEL_NAME: &str = "ornaments-changes";

/// Seconds between heartbeat frames
pub const HEARTBEAT_INTERVAL_SECS: f32 = 25.0;

/// Seconds to wait before reconnect attempt `attempt` (counting from 1)
pub fn reconnect_delay_secs(attempt: u32) -> f32 {
    match attempt {
        0 | 1 => 1.0,
        2 => 2.0,
        3 => 5.0,
        _ => 10.0,
    }
}

/// A single Phoenix channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// What an incoming frame means for the scene
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A row was inserted by some client
    Inserted(Ornament),
    /// Reply to our join request
    Joined { ok: bool },
    /// The server closed or errored the channel
    Closed { reason: String },
    /// Heartbeat replies, presence, system messages
    Ignored,
}

/// Client side of the ornament insert channel
#[derive(Debug, Clone)]
pub struct InsertChannel {
    topic: String,
    join_ref: Option<String>,
    next_ref: u64,
}

impl Default for InsertChannel {
    fn default() -> Self {
        Self::new(CHANNEL_NAME)
    }
}

impl InsertChannel {
    pub fn new(name: &str) -> Self {
        Self {
            topic: format!("realtime:{}", name),
            join_ref: None,
            next_ref: 1,
        }
    }

    fn make_ref(&mut self) -> String {
        let r = self.next_ref.to_string();
        self.next_ref += 1;
        r
    }

    /// Join request subscribing to INSERT events on the ornament table
    pub fn join(&mut self) -> Result<String, FrameError> {
        let reference = self.make_ref();
        self.join_ref = Some(reference.clone());
        let frame = Frame {
            topic: self.topic.clone(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "INSERT",
                        "schema": ORNAMENT_SCHEMA,
                        "table": ORNAMENT_TABLE,
                    }],
                }
            }),
            reference: Some(reference),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Leave request, sent before closing the socket
    pub fn leave(&mut self) -> Result<String, FrameError> {
        let frame = Frame {
            topic: self.topic.clone(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(self.make_ref()),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Keep-alive on the socket-wide `phoenix` topic
    pub fn heartbeat(&mut self) -> Result<String, FrameError> {
        let frame = Frame {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(self.make_ref()),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Interpret an incoming text frame
    pub fn parse(&self, text: &str) -> Result<ChannelEvent, FrameError> {
        let frame: Frame = serde_json::from_str(text)?;
        if frame.topic != self.topic {
            return Ok(ChannelEvent::Ignored);
        }

        let event = match frame.event.as_str() {
            "postgres_changes" => {
                let data = &frame.payload["data"];
                let is_insert = data["type"].as_str() == Some("INSERT")
                    && data["table"].as_str().map_or(true, |t| t == ORNAMENT_TABLE);
                match data.get("record") {
                    Some(record) if is_insert => ChannelEvent::Inserted(decode_row(record)),
                    _ => ChannelEvent::Ignored,
                }
            }
            "phx_reply" if frame.reference.is_some() && frame.reference == self.join_ref => {
                ChannelEvent::Joined {
                    ok: frame.payload["status"].as_str() == Some("ok"),
                }
            }
            "phx_close" => ChannelEvent::Closed {
                reason: "closed by server".to_string(),
            },
            "phx_error" => ChannelEvent::Closed {
                reason: frame.payload.to_string(),
            },
            _ => ChannelEvent::Ignored,
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_join_frame_filters_inserts() {
        let mut channel = InsertChannel::default();
        let frame: Frame = serde_json::from_str(&channel.join().unwrap()).unwrap();

        assert_eq!(frame.topic, "realtime:ornaments-changes");
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.reference.as_deref(), Some("1"));
        let filter = &frame.payload["config"]["postgres_changes"][0];
        assert_eq!(filter["event"], "INSERT");
        assert_eq!(filter["schema"], "public");
        assert_eq!(filter["table"], "ornaments");
    }

    #[test]
    fn test_refs_increase() {
        let mut channel = InsertChannel::default();
        channel.join().unwrap();
        let heartbeat: Frame = serde_json::from_str(&channel.heartbeat().unwrap()).unwrap();
        let leave: Frame = serde_json::from_str(&channel.leave().unwrap()).unwrap();

        assert_eq!(heartbeat.topic, "phoenix");
        assert_eq!(heartbeat.reference.as_deref(), Some("2"));
        assert_eq!(leave.event, "phx_leave");
        assert_eq!(leave.reference.as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_insert_with_missing_fields() {
        let channel = InsertChannel::default();
        let text = r#"{
            "topic": "realtime:ornaments-changes",
            "event": "postgres_changes",
            "payload": {
                "ids": [81],
                "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "ornaments",
                    "commit_timestamp": "2025-12-24T10:00:00Z",
                    "record": { "x": 1.0, "y": null, "z": 2.0, "country": null }
                }
            },
            "ref": null
        }"#;

        match channel.parse(text).unwrap() {
            ChannelEvent::Inserted(ornament) => {
                assert_eq!(ornament.position, Vec3::new(1.0, 0.0, 2.0));
                assert_eq!(ornament.country, "");
                assert_eq!(ornament.message, "");
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_join_reply_and_close() {
        let mut channel = InsertChannel::default();
        channel.join().unwrap();

        let reply = r#"{"topic":"realtime:ornaments-changes","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(channel.parse(reply).unwrap(), ChannelEvent::Joined { ok: true });

        let close = r#"{"topic":"realtime:ornaments-changes","event":"phx_close","payload":{},"ref":"1"}"#;
        assert!(matches!(channel.parse(close).unwrap(), ChannelEvent::Closed { .. }));
    }

    #[test]
    fn test_rejoin_uses_fresh_join_ref() {
        let mut channel = InsertChannel::default();
        let first: Frame = serde_json::from_str(&channel.join().unwrap()).unwrap();
        channel.heartbeat().unwrap();
        let second: Frame = serde_json::from_str(&channel.join().unwrap()).unwrap();

        assert_eq!(second.event, "phx_join");
        assert_ne!(first.reference, second.reference);

        // A late reply to the abandoned join is not taken as success
        let stale = format!(
            r#"{{"topic":"realtime:ornaments-changes","event":"phx_reply","payload":{{"status":"ok"}},"ref":"{}"}}"#,
            first.reference.unwrap()
        );
        assert_eq!(channel.parse(&stale).unwrap(), ChannelEvent::Ignored);

        let fresh = format!(
            r#"{{"topic":"realtime:ornaments-changes","event":"phx_reply","payload":{{"status":"ok"}},"ref":"{}"}}"#,
            second.reference.unwrap()
        );
        assert_eq!(channel.parse(&fresh).unwrap(), ChannelEvent::Joined { ok: true });
    }

    #[test]
    fn test_reconnect_delay_backs_off() {
        let delays: Vec<f32> = (1..=6).map(reconnect_delay_secs).collect();
        assert_eq!(delays, vec![1.0, 2.0, 5.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_parse_ignores_other_traffic() {
        let channel = InsertChannel::default();
        let heartbeat_reply = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"2"}"#;
        assert_eq!(channel.parse(heartbeat_reply).unwrap(), ChannelEvent::Ignored);

        let update = r#"{"topic":"realtime:ornaments-changes","event":"postgres_changes","payload":{"data":{"type":"UPDATE","record":{}}}}"#;
        assert_eq!(channel.parse(update).unwrap(), ChannelEvent::Ignored);

        assert!(channel.parse("not json").is_err());
    }
}
