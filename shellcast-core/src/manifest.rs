//! HLS playlist inspection.
//!
//! Only the handful of tags readiness depends on are recognised; everything
//! else in the playlist is ignored.

use std::path::Path;

use tokio::fs;

const HEADER_TAG: &str = "#EXTM3U";
const SEGMENT_TAG: &str = "#EXTINF:";
const END_TAG: &str = "#EXT-X-ENDLIST";

/// What a single read of a playlist revealed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestSnapshot {
    /// Size of the file in bytes at read time
    pub bytes: u64,
    pub has_header: bool,
    pub segment_count: usize,
    pub has_end_marker: bool,
}

impl ManifestSnapshot {
    /// Rolling playability: past the byte floor with enough segments listed.
    pub fn is_playable(&self, min_bytes: u64, min_segments: usize) -> bool {
        self.bytes > min_bytes && self.segment_count >= min_segments
    }

    /// A finished VOD playlist carries both the header and the end marker.
    pub fn is_complete(&self) -> bool {
        self.has_header && self.has_end_marker
    }
}

pub fn inspect(contents: &str) -> ManifestSnapshot {
    let mut snapshot = ManifestSnapshot {
        bytes: contents.len() as u64,
        ..Default::default()
    };

    for line in contents.lines().map(str::trim) {
        if line == HEADER_TAG {
            snapshot.has_header = true;
        } else if line.starts_with(SEGMENT_TAG) {
            snapshot.segment_count += 1;
        } else if line == END_TAG {
            snapshot.has_end_marker = true;
        }
    }

    snapshot
}

/// Reads and inspects the playlist at `path`. A missing file (or one the
/// encoder is mid-way through replacing) yields `None`.
pub async fn read(path: &Path) -> Option<ManifestSnapshot> {
    let bytes = fs::read(path).await.ok()?;
    Some(inspect(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLLING: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n\
        #EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:4.000000,\nseg-00000001.ts\n\
        #EXTINF:4.000000,\nseg-00000002.ts\n";

    #[test]
    fn counts_segments_in_rolling_playlist() {
        let snapshot = inspect(ROLLING);
        assert!(snapshot.has_header);
        assert_eq!(snapshot.segment_count, 2);
        assert!(!snapshot.has_end_marker);
        assert!(snapshot.is_playable(64, 2));
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn header_only_file_is_not_playable() {
        let snapshot = inspect("#EXTM3U\n#EXT-X-VERSION:3\n");
        assert_eq!(snapshot.segment_count, 0);
        assert!(!snapshot.is_playable(64, 2));
    }

    #[test]
    fn small_file_fails_byte_floor_even_with_segments() {
        let snapshot = inspect("#EXTINF:4,\na\n#EXTINF:4,\nb\n");
        assert_eq!(snapshot.segment_count, 2);
        assert!(!snapshot.is_playable(64, 2));
    }

    #[test]
    fn end_marker_marks_vod_complete() {
        let vod = format!("{ROLLING}#EXT-X-ENDLIST\n");
        assert!(inspect(&vod).is_complete());
        assert!(!inspect("#EXTINF:4,\na\n#EXT-X-ENDLIST\n").is_complete());
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("index.m3u8")).await.is_none());
    }
}
