//! Runtime font registration for chart text.
//!
//! Plotters is built without its system font backend (no fontconfig at build
//! time), so a TrueType file is located on disk and registered once under the
//! `sans-serif` family. Without one, charts are drawn without text.

use std::path::PathBuf;
use std::sync::OnceLock;

use plotters::style::{FontStyle, register_font};
use tracing::{debug, warn};

/// Family name used by every chart in this crate.
pub const FONT_FAMILY: &str = "sans-serif";

const CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static REGISTERED: OnceLock<bool> = OnceLock::new();

/// Register a chart font if one can be found. Returns whether text can be drawn.
pub fn ensure_font() -> bool {
    *REGISTERED.get_or_init(|| {
        for path in font_candidates() {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            // Plotters keeps a `'static` reference to the font data.
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                debug!(path = %path.display(), "registered chart font");
                return true;
            }
        }
        warn!("no TrueType font found (set LOAD_FORECAST_FONT); charts will have no text");
        false
    })
}

fn font_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(custom) = std::env::var("LOAD_FORECAST_FONT") {
        if !custom.trim().is_empty() {
            out.push(PathBuf::from(custom));
        }
    }
    out.extend(CANDIDATES.iter().map(PathBuf::from));
    out
}
