//! Frame-indexed zip archives of per-frame files.
//!
//! Entries are named `<prefix><6-digit frame>.<ext>` and hold the exact bytes of the
//! per-frame file, so any file kind (`.flo`, depth arrays, PNGs) round-trips
//! byte-for-byte.

/// Packing a directory into an archive and reading frames back out.
pub mod frames;
