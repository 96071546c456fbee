// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS rendering of print rows.
//
// Enough of the command set for receipts and kitchen tickets: text styling,
// feeds, cuts, fixed-width columns, QR codes and the cash drawer kick.
// Images are not rendered.

use tracing::warn;

use thermopool_core::error::{PoolError, Result};
use thermopool_core::row::{Alignment, Column, FontSize};
use thermopool_core::PrintRow;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Turns print rows into the bytes a device understands.
pub trait RowEncoder: Send + Sync {
    fn encode(&self, rows: &[PrintRow]) -> Result<Vec<u8>>;
}

/// Paper roll width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperWidth {
    /// 58 mm roll, 32 characters per line in font A.
    Mm58,
    /// 80 mm roll, 48 characters per line in font A.
    #[default]
    Mm80,
}

impl PaperWidth {
    pub fn chars_per_line(self) -> usize {
        match self {
            Self::Mm58 => 32,
            Self::Mm80 => 48,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

pub mod commands {
    use super::*;

    /// ESC @ - reset to power-on defaults.
    pub fn init() -> Vec<u8> {
        vec![ESC, b'@']
    }

    /// ESC E n
    pub fn bold(on: bool) -> Vec<u8> {
        vec![ESC, b'E', u8::from(on)]
    }

    /// GS ! n - character size multiplier.
    pub fn size(size: FontSize) -> Vec<u8> {
        let n = match size {
            FontSize::Normal => 0x00,
            FontSize::Wide => 0x10,
            FontSize::Tall => 0x01,
            FontSize::Big => 0x11,
        };
        vec![GS, b'!', n]
    }

    /// ESC a n
    pub fn align(alignment: Alignment) -> Vec<u8> {
        let n = match alignment {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        };
        vec![ESC, b'a', n]
    }

    /// ESC d n - print and feed n lines.
    pub fn feed(lines: u32) -> Vec<u8> {
        vec![ESC, b'd', lines.min(255) as u8]
    }

    /// GS V B 0 - feed to the cutter and partial cut.
    pub fn cut() -> Vec<u8> {
        vec![GS, b'V', b'B', 0]
    }

    /// ESC p 0 t1 t2 - pulse drawer pin 2 (50 ms on, 500 ms off).
    pub fn kick_drawer() -> Vec<u8> {
        vec![ESC, b'p', 0, 25, 250]
    }

    /// GS ( k sequence for a model 2 QR code, module size 6, ECC level M.
    pub fn qr_code(data: &str) -> Result<Vec<u8>> {
        let payload = data.as_bytes();
        let stored = payload.len() + 3;
        if stored > u16::MAX as usize {
            return Err(PoolError::Encoding(format!(
                "QR payload of {} bytes is too large",
                payload.len()
            )));
        }
        let [p_l, p_h] = (stored as u16).to_le_bytes();

        let mut out = Vec::with_capacity(payload.len() + 32);
        // Model 2.
        out.extend([GS, b'(', b'k', 4, 0, 49, 65, 50, 0]);
        // Module size.
        out.extend([GS, b'(', b'k', 3, 0, 49, 67, 6]);
        // Error correction M.
        out.extend([GS, b'(', b'k', 3, 0, 49, 69, 49]);
        // Store.
        out.extend([GS, b'(', b'k', p_l, p_h, 49, 80, 48]);
        out.extend_from_slice(payload);
        // Print.
        out.extend([GS, b'(', b'k', 3, 0, 49, 81, 48]);
        Ok(out)
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// ESC/POS encoder for a given paper width.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscPosEncoder {
    paper: PaperWidth,
}

impl EscPosEncoder {
    pub fn new(paper: PaperWidth) -> Self {
        Self { paper }
    }

    fn line_width(&self, size: FontSize) -> usize {
        match size {
            FontSize::Wide | FontSize::Big => self.paper.chars_per_line() / 2,
            FontSize::Normal | FontSize::Tall => self.paper.chars_per_line(),
        }
    }

    fn text_lines(&self, out: &mut Vec<u8>, lines: &[&str], width: usize, wrap: bool) {
        for line in lines {
            let rendered = if wrap {
                wrap_words(line, width)
            } else {
                vec![line.to_string()]
            };
            for part in rendered {
                push_text(out, &part);
                out.push(LF);
            }
        }
    }

    fn columns(&self, out: &mut Vec<u8>, columns: &[Column], line_width: usize) {
        let widths: Vec<usize> = columns
            .iter()
            .map(|c| (line_width * c.width as usize / 100).max(1))
            .collect();
        let cells: Vec<Vec<String>> = columns
            .iter()
            .zip(&widths)
            .map(|(column, &width)| {
                if column.wrap_words {
                    wrap_words(&column.text, width)
                } else {
                    vec![column.text.chars().take(width).collect()]
                }
            })
            .collect();
        let height = cells.iter().map(Vec::len).max().unwrap_or(0);

        for row in 0..height {
            let mut line = String::new();
            for ((column, lines), &width) in columns.iter().zip(&cells).zip(&widths) {
                let text = lines.get(row).map(String::as_str).unwrap_or("");
                line.push_str(&pad(text, width, column.alignment));
            }
            push_text(out, line.trim_end());
            out.push(LF);
        }
    }
}

impl RowEncoder for EscPosEncoder {
    fn encode(&self, rows: &[PrintRow]) -> Result<Vec<u8>> {
        let mut out = commands::init();
        for row in rows {
            match row {
                PrintRow::Text {
                    text,
                    bold,
                    font_size,
                    alignment,
                    wrap_words,
                } => {
                    out.extend(commands::align(*alignment));
                    out.extend(commands::bold(*bold));
                    out.extend(commands::size(*font_size));
                    self.text_lines(&mut out, &text.lines(), self.line_width(*font_size), *wrap_words);
                    out.extend(commands::size(FontSize::Normal));
                    out.extend(commands::bold(false));
                    out.extend(commands::align(Alignment::Left));
                }
                PrintRow::Feed { lines } => out.extend(commands::feed(*lines)),
                PrintRow::Cut => out.extend(commands::cut()),
                PrintRow::Column {
                    bold,
                    font_size,
                    columns,
                } => {
                    out.extend(commands::bold(*bold));
                    out.extend(commands::size(*font_size));
                    self.columns(&mut out, columns, self.line_width(*font_size));
                    out.extend(commands::size(FontSize::Normal));
                    out.extend(commands::bold(false));
                }
                PrintRow::QrCode { text, alignment } => {
                    out.extend(commands::align(alignment.unwrap_or(Alignment::Center)));
                    out.extend(commands::qr_code(text)?);
                    out.push(LF);
                    out.extend(commands::align(Alignment::Left));
                }
                PrintRow::Cashbox => out.extend(commands::kick_drawer()),
                PrintRow::Image { url, .. } => {
                    warn!(url = %url, "image rows are not rendered; skipped");
                }
            }
        }
        Ok(out)
    }
}

/// Code page 437 covers ASCII; anything else prints as '?'.
fn push_text(out: &mut Vec<u8>, text: &str) {
    out.extend(text.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
}

fn pad(text: &str, width: usize, alignment: Alignment) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.chars().take(width).collect();
    }
    let gap = width - len;
    match alignment {
        Alignment::Left => format!("{text}{}", " ".repeat(gap)),
        Alignment::Right => format!("{}{text}", " ".repeat(gap)),
        Alignment::Center => {
            let left = gap / 2;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(gap - left))
        }
    }
}

/// Greedy word wrap.  Words longer than the width are split.
fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
