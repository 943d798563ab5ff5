use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use crate::model::LatLon;

// Clipboard worker channel, started on first copy.
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Text placed on the clipboard for a hotspot.
pub fn hotspot_clipboard_text(hotspot: LatLon) -> String {
    format!("{:.6}, {:.6}", hotspot.lat, hotspot.lon)
}

/// Start the clipboard worker. Each copy keeps its clipboard handle alive for a
/// while so clipboard managers on Linux get a chance to read it.
fn clipboard_sender() -> &'static std_mpsc::Sender<String> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            for text in rx {
                if let Ok(mut clipboard) = arboard::Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });
        tx
    })
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_sender()
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))
}
