//! Remote store contract: configuration, endpoints, and row encoding
//!
//! The store is a hosted PostgREST-style table named `ornaments` with
//! columns `x`, `y`, `z`, `country`, `message` and an optional nullable
//! `client_id` (added by `sql/ornaments.sql`; tables without it still accept
//! writes through [`insert_body_without_client_id`]).
//! Rows coming back from it are not trusted to be complete or well typed,
//! so decoding never fails on a single row: missing or malformed numbers
//! become 0 and missing text becomes the empty string.

use glam::Vec3;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigError, StoreError};
use crate::ornament::{Ornament, OrnamentId};

/// Table holding the ornaments
pub const ORNAMENT_TABLE: &str = "ornaments";

/// Database schema the table lives in
pub const ORNAMENT_SCHEMA: &str = "public";

/// Column carrying the client-generated ornament id
pub const CLIENT_ID_COLUMN: &str = "client_id";

/// Connection settings for the hosted store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL without trailing slash (e.g. "https://abc.supabase.co")
    pub url: String,
    /// Public (anon) access key
    pub key: String,
}

impl StoreConfig {
    /// Validate raw values from the hosting environment
    pub fn new(url: Option<&str>, key: Option<&str>) -> Result<Self, ConfigError> {
        let url = url.map(str::trim).filter(|u| !u.is_empty()).ok_or(ConfigError::MissingUrl)?;
        let key = key.map(str::trim).filter(|k| !k.is_empty()).ok_or(ConfigError::MissingKey)?;

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    /// REST endpoint of the ornament table
    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, ORNAMENT_TABLE)
    }

    /// REST endpoint selecting every row
    pub fn select_all_url(&self) -> String {
        format!("{}?select=*", self.table_url())
    }

    /// WebSocket endpoint of the realtime service
    pub fn realtime_url(&self) -> String {
        let ws = self
            .url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", ws, self.key)
    }

    /// Headers every REST request carries
    pub fn auth_headers(&self) -> [(&'static str, String); 2] {
        [
            ("apikey", self.key.clone()),
            ("Authorization", format!("Bearer {}", self.key)),
        ]
    }
}

/// Row written by an insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertRow {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub country: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl From<&Ornament> for InsertRow {
    fn from(ornament: &Ornament) -> Self {
        Self {
            x: ornament.position.x,
            y: ornament.position.y,
            z: ornament.position.z,
            country: ornament.country.clone(),
            message: ornament.message.clone(),
            client_id: ornament.id.map(|id| id.to_string()),
        }
    }
}

impl InsertRow {
    pub fn without_client_id(self) -> Self {
        Self { client_id: None, ..self }
    }
}

/// Insert request body: a one-element array of rows
pub fn insert_body(ornament: &Ornament) -> Result<String, StoreError> {
    encode_row(InsertRow::from(ornament))
}

/// Insert body limited to the five base columns
pub fn insert_body_without_client_id(ornament: &Ornament) -> Result<String, StoreError> {
    encode_row(InsertRow::from(ornament).without_client_id())
}

fn encode_row(row: InsertRow) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&[row])?)
}

/// Decode one row, coercing anything missing or malformed
pub fn decode_row(row: &Value) -> Ornament {
    let number = |field: &str| coerce_number(row.get(field));
    let text = |field: &str| coerce_text(row.get(field));

    Ornament {
        id: row
            .get(CLIENT_ID_COLUMN)
            .and_then(Value::as_str)
            .and_then(OrnamentId::parse),
        position: Vec3::new(number("x"), number("y"), number("z")),
        country: text("country"),
        message: text("message"),
    }
}

/// Decode a select-all response body
pub fn decode_rows(body: &str) -> Result<Vec<Ornament>, StoreError> {
    let rows: Vec<Value> = serde_json::from_str(body)?;
    Ok(rows.iter().map(decode_row).collect())
}

fn coerce_number(value: Option<&Value>) -> f32 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_finite() {
        n as f32
    } else {
        0.0
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
