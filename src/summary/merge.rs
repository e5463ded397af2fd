use crate::db::{CaptureKind, WindowText};

/// Joins the non-blank text of a window, sources in screenshot, photo, audio
/// order and rows in timestamp order, one line per row.
pub fn merged_text(window: &WindowText) -> String {
    CaptureKind::ALL
        .into_iter()
        .flat_map(|kind| window.rows(kind))
        .map(|row| row.trim())
        .filter(|row| !row.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
