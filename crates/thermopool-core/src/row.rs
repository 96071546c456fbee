// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print-row descriptors.
//
// A job's payload is an ordered list of rows.  The pool never looks inside
// them; they are handed as-is to whatever encoder sits in front of the
// transport.

use serde::{Deserialize, Serialize};

/// Character size multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FontSize {
    #[default]
    Normal,
    /// Double width.
    Wide,
    /// Double height.
    Tall,
    /// Double width and height.
    Big,
}

/// Horizontal alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Text content: either one string or several lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextContent {
    Single(String),
    Lines(Vec<String>),
}

impl TextContent {
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Self::Single(text) => text.lines().collect(),
            Self::Lines(lines) => lines.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for TextContent {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

/// One cell of a column row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub text: String,
    /// Share of the line width, in percent.
    pub width: u32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub wrap_words: bool,
}

/// A single print-row descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum PrintRow {
    Text {
        text: TextContent,
        #[serde(default)]
        bold: bool,
        #[serde(default)]
        font_size: FontSize,
        #[serde(default)]
        alignment: Alignment,
        #[serde(default)]
        wrap_words: bool,
    },
    Feed {
        lines: u32,
    },
    Cut,
    Column {
        #[serde(default)]
        bold: bool,
        #[serde(default)]
        font_size: FontSize,
        columns: Vec<Column>,
    },
    Image {
        url: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        alignment: Option<Alignment>,
    },
    #[serde(rename = "QRCODE")]
    QrCode {
        text: String,
        #[serde(default)]
        alignment: Option<Alignment>,
    },
    Cashbox,
}

impl PrintRow {
    /// Plain left-aligned text row.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: TextContent::Single(text.into()),
            bold: false,
            font_size: FontSize::Normal,
            alignment: Alignment::Left,
            wrap_words: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_use_uppercase_type_tags() {
        let json = serde_json::to_value(PrintRow::QrCode {
            text: "https://example.test".into(),
            alignment: Some(Alignment::Center),
        })
        .expect("serialize");
        assert_eq!(json["type"], "QRCODE");
        assert_eq!(json["alignment"], "CENTER");

        let json = serde_json::to_value(PrintRow::Cashbox).expect("serialize");
        assert_eq!(json["type"], "CASHBOX");
    }

    #[test]
    fn text_row_accepts_line_arrays_and_camel_case() {
        let row: PrintRow = serde_json::from_str(
            r#"{"type":"TEXT","text":["a","b"],"bold":true,"fontSize":"BIG","alignment":"RIGHT","wrapWords":true}"#,
        )
        .expect("deserialize");
        let PrintRow::Text { text, font_size, wrap_words, .. } = row else {
            panic!("expected text row");
        };
        assert_eq!(text.lines(), vec!["a", "b"]);
        assert_eq!(font_size, FontSize::Big);
        assert!(wrap_words);
    }

    #[test]
    fn column_row_defaults_optional_fields() {
        let row: PrintRow = serde_json::from_str(
            r#"{"type":"COLUMN","columns":[{"text":"Tea","width":70},{"text":"2.50","width":30,"alignment":"RIGHT"}]}"#,
        )
        .expect("deserialize");
        let PrintRow::Column { bold, columns, .. } = row else {
            panic!("expected column row");
        };
        assert!(!bold);
        assert_eq!(columns[0].alignment, Alignment::Left);
        assert_eq!(columns[1].alignment, Alignment::Right);
    }
}
