pub mod arxiv;
pub mod ieee;
pub mod pubmed;
pub mod scholar;

pub use arxiv::ArxivSearcher;
pub use ieee::IeeeSearcher;
pub use pubmed::PubmedSearcher;
pub use scholar::ScholarSearcher;

use sha2::{Digest, Sha256};

/// Collapse runs of whitespace, including newlines, into single spaces.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable id for results that carry no identifier of their own.
pub(crate) fn synthetic_id(prefix: &str, seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", prefix, hex)
}

pub(crate) fn year_start(year: i32) -> String {
    format!("{:04}-01-01T00:00:00Z", year)
}

/// First plausible publication year (1900-2099) appearing in free text.
pub(crate) fn find_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    (0..bytes.len().saturating_sub(3)).find_map(|i| {
        let window = &bytes[i..i + 4];
        let bounded_left = i == 0 || !bytes[i - 1].is_ascii_digit();
        let bounded_right = bytes.get(i + 4).map_or(true, |b| !b.is_ascii_digit());
        let plausible = window.starts_with(b"19") || window.starts_with(b"20");
        if bounded_left && bounded_right && plausible && window.iter().all(u8::is_ascii_digit) {
            std::str::from_utf8(window).ok()?.parse().ok()
        } else {
            None
        }
    })
}
