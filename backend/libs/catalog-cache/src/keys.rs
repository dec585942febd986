//! Catalog cache key schema
//!
//! The write path deletes these keys after every successful write, so the
//! read and write sides must both build them here.
//! Key format: {collection}[_{parent_id}], locks are {key}_lock

/// Every album
pub const ALBUMS: &str = "albums";

/// Every song
pub const SONGS: &str = "songs";

/// Prefix for the per-album song listing
pub const ALBUM_SONGS_PREFIX: &str = "album_songs";

/// Suffix marking a stampede lock entry
pub const LOCK_SUFFIX: &str = "_lock";

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Format: albums
    pub fn albums() -> String {
        ALBUMS.to_string()
    }

    /// Format: songs
    pub fn songs() -> String {
        SONGS.to_string()
    }

    /// Songs of one album together with the album row
    /// Format: album_songs_{album_id}
    pub fn album_songs(album_id: i64) -> String {
        format!("{}_{}", ALBUM_SONGS_PREFIX, album_id)
    }

    /// Mutual-exclusion token guarding the refill of `key`.
    /// Never read as data.
    /// Format: {key}_lock
    pub fn lock(key: &str) -> String {
        format!("{}{}", key, LOCK_SUFFIX)
    }

    pub fn is_lock(key: &str) -> bool {
        key.ends_with(LOCK_SUFFIX)
    }

    /// Collection a key belongs to, used as a low-cardinality metrics label.
    ///
    /// `album_songs_42` -> `album_songs`, `albums` -> `albums`,
    /// any lock -> `lock`.
    pub fn collection(key: &str) -> &str {
        if Self::is_lock(key) {
            return "lock";
        }

        match key.rsplit_once('_') {
            Some((prefix, suffix))
                if !prefix.is_empty()
                    && !suffix.is_empty()
                    && suffix.chars().all(|c| c.is_ascii_digit()) =>
            {
                prefix
            }
            _ => key,
        }
    }
}
