// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let base = base_dir(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    );
    let dir = base.join("thermopool");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), error = %e, "could not create data directory");
    }
    dir
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.json")
}

/// Journal location used when the config does not name one.
pub fn journal_path(dir: &Path) -> PathBuf {
    dir.join("pending.db")
}

fn base_dir(xdg: Option<String>, home: Option<String>) -> PathBuf {
    // XDG first, then ~/.local/share
    if let Some(xdg) = xdg.filter(|s| !s.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home.filter(|s| !s.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}
