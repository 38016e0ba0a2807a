//! YouTube link handling for resource videos.

use once_cell::sync::Lazy;
use regex::Regex;

static RAW_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("static regex"));
static URL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=|shorts/|live/)([^#&?]*).*")
        .expect("static regex")
});

/// Video id from a raw 11-character id or any of the usual YouTube URL shapes.
pub fn youtube_id(url: &str) -> Option<String> {
    let clean = url.trim();
    if clean.is_empty() {
        return None;
    }
    if RAW_ID.is_match(clean) {
        return Some(clean.to_string());
    }
    let caps = URL_ID.captures(clean)?;
    caps.get(2)
        .map(|m| m.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn embed_url(video_id: &str) -> String {
    format!("https://www.youtube.com/embed/{video_id}?autoplay=1&rel=0&modestbranding=1")
}

/// Embed URL for a resource's video link, if it names a recognizable video.
pub fn embed_for(url: &str) -> Option<String> {
    youtube_id(url).map(|id| embed_url(&id))
}
