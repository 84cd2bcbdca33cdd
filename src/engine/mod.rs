//! Archive engine contract
//!
//! The engine is the opaque library that opens archive files and answers
//! queries against them. The registry and search coordinator only talk to it
//! through [`ArchiveEngine`] and [`ArchiveHandle`], so a native ZIM reader can
//! be plugged in without touching the coordination code.
//!
//! [`JsonArchiveEngine`] is a small engine for archives stored as JSON
//! documents, used for fixtures and tooling.

mod json;
mod traits;

pub use json::{JsonArchive, JsonArchiveEngine, JsonArticle};
pub use traits::{ArchiveContent, ArchiveEngine, ArchiveHandle, ArchiveHit, archive_url};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
