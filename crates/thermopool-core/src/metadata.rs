// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User-defined job metadata.
//
// Callers attach a small JSON object to every job.  The only field the pool
// cares about is the `type` discriminator; everything else is carried along
// untouched in `extra`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PoolError;

const TYPE_KEY: &str = "type";

/// Job type discriminator.
///
/// Known kinds are matched case-insensitively with spaces and dashes read as
/// underscores, so `"Receipt"`, `"RECEIPT"` and `"receipt"` are the same kind.
/// Anything else is preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    Receipt,
    Bill,
    Kot,
    TestConnection,
    CashInOut,
    OpenDrawer,
    ShiftOpenSummary,
    ItemSalesReport,
    ShiftCloseSummary,
    Other(String),
}

impl JobKind {
    /// Canonical wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Receipt => "RECEIPT",
            Self::Bill => "BILL",
            Self::Kot => "KOT",
            Self::TestConnection => "TEST_CONNECTION",
            Self::CashInOut => "CASH_IN_OUT",
            Self::OpenDrawer => "OPEN_DRAWER",
            Self::ShiftOpenSummary => "SHIFT_OPEN_SUMMARY",
            Self::ItemSalesReport => "ITEM_SALES_REPORT",
            Self::ShiftCloseSummary => "SHIFT_CLOSE_SUMMARY",
            Self::Other(raw) => raw,
        }
    }

    /// How long the printer is left alone after successfully printing a job
    /// of this kind.  Long receipts need the mechanism to finish before the
    /// next payload arrives.
    pub fn settle_delay(&self) -> Duration {
        let millis = match self {
            Self::Kot => 300,
            Self::Receipt | Self::Bill => 1000,
            Self::TestConnection | Self::CashInOut | Self::OpenDrawer => 100,
            Self::ShiftOpenSummary | Self::ItemSalesReport => 400,
            Self::ShiftCloseSummary => 800,
            Self::Other(_) => 500,
        };
        Duration::from_millis(millis)
    }
}

impl From<String> for JobKind {
    fn from(raw: String) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "RECEIPT" => Self::Receipt,
            "BILL" => Self::Bill,
            "KOT" => Self::Kot,
            "TEST_CONNECTION" => Self::TestConnection,
            "CASH_IN_OUT" => Self::CashInOut,
            "OPEN_DRAWER" | "OPEN_CASHBOX" => Self::OpenDrawer,
            "SHIFT_OPEN_SUMMARY" => Self::ShiftOpenSummary,
            "ITEM_SALES_REPORT" => Self::ItemSalesReport,
            "SHIFT_CLOSE_SUMMARY" => Self::ShiftCloseSummary,
            _ => Self::Other(raw),
        }
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Structured job metadata: a `type` discriminator plus arbitrary extra
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMetadata {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            extra: Map::new(),
        }
    }

    /// Attach an extra field.  A `type` key is ignored: the discriminator
    /// is `kind`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key == TYPE_KEY {
            return self;
        }
        self.extra.insert(key, value.into());
        self
    }

    /// Parse an opaque metadata blob.  The error is a human-readable reason.
    pub fn parse(blob: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(blob).map_err(|e| format!("invalid JSON: {e}"))?;
        let Value::Object(fields) = value else {
            return Err("metadata must be a JSON object".into());
        };
        match fields.get(TYPE_KEY) {
            Some(Value::String(kind)) if !kind.trim().is_empty() => {}
            Some(Value::String(_)) => return Err("`type` must not be empty".into()),
            Some(_) => return Err("`type` must be a string".into()),
            None => return Err("missing `type` discriminator".into()),
        }
        serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
    }

    /// Serialize to the opaque blob stored alongside a job.  Fails if
    /// `extra` carries its own `type`, which would shadow `kind`.
    pub fn to_blob(&self) -> crate::error::Result<String> {
        if self.extra.contains_key(TYPE_KEY) {
            return Err(PoolError::Serialization(serde::ser::Error::custom(
                "extra fields must not contain `type`",
            )));
        }
        Ok(serde_json::to_string(self)?)
    }
}
