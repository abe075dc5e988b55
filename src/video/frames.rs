// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! On-disk storage of received image frames.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::FrameError;

/// Directory under the working directory that holds frames.
pub const FRAMES_DIR: &str = "esp32_images";

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXT: &str = ".jpg";

/// Frame file name for a zero-based receipt index.
pub fn frame_file_name(index: u32) -> String {
    format!("{}{:04}{}", FRAME_PREFIX, index, FRAME_EXT)
}

/// Parse the index out of a frame file name (`frame_0007.jpg` -> 7).
pub fn parse_frame_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(FRAME_PREFIX)?.strip_suffix(FRAME_EXT)?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Indexed JPEG frames in a single directory.
#[derive(Debug, Clone)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Frame store rooted at `{work_dir}/esp32_images`.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            dir: work_dir.join(FRAMES_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.dir.join(frame_file_name(index))
    }

    /// Write a frame and read it back.
    ///
    /// Data goes to a `.part` file that is renamed into place only after it
    /// reads back whole. On any failure neither file is left behind.
    pub fn persist(&self, data: &[u8], index: u32) -> Result<PathBuf, FrameError> {
        let path = self.frame_path(index);
        let staging = self.dir.join(format!("{}.part", frame_file_name(index)));

        if let Err(e) = self.write_verified(data, index, &staging, &path) {
            error!("Invalid frame {}: {}", index, e);
            discard(&staging);
            discard(&path);
            return Err(e);
        }

        info!("Saved frame {} ({} bytes)", index, data.len());
        Ok(path)
    }

    fn write_verified(
        &self,
        data: &[u8],
        index: u32,
        staging: &Path,
        path: &Path,
    ) -> Result<(), FrameError> {
        let io_err = |source: io::Error| FrameError::Write {
            index,
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(staging, data).map_err(io_err)?;
        let written = fs::read(staging).map_err(io_err)?.len();

        if written == 0 {
            return Err(FrameError::Empty {
                index,
                path: path.to_path_buf(),
            });
        }
        if written != data.len() {
            return Err(FrameError::Truncated {
                index,
                path: path.to_path_buf(),
                expected: data.len(),
                actual: written,
            });
        }

        fs::rename(staging, path).map_err(io_err)
    }

    /// Frame files in index order. A missing directory has no frames.
    pub fn list_frames(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_frame_index) {
                frames.push((index, entry.path()));
            }
        }
        frames.sort_by_key(|(index, _)| *index);

        Ok(frames.into_iter().map(|(_, path)| path).collect())
    }

    /// Renumber the frames to a contiguous run from 0, keeping their order.
    ///
    /// Returns the renumbered paths.
    pub fn compact(&self) -> io::Result<Vec<PathBuf>> {
        let frames = self.list_frames()?;
        let mut compacted = Vec::with_capacity(frames.len());
        for (index, source) in frames.into_iter().enumerate() {
            let target = self.frame_path(index as u32);
            if source != target {
                debug!("Renumbering {:?} -> {:?}", source, target);
                fs::rename(&source, &target)?;
            }
            compacted.push(target);
        }
        Ok(compacted)
    }

    /// Number of frame files currently stored.
    pub fn frame_count(&self) -> usize {
        self.list_frames().map(|frames| frames.len()).unwrap_or(0)
    }

    /// Delete every file in the frame directory. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted {:?}", path);
                    removed += 1;
                }
                Err(e) => error!("Error deleting file {:?}: {}", path, e),
            }
        }
        removed
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Deleted {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_frame_file_name() {
        assert_eq!(frame_file_name(0), "frame_0000.jpg");
        assert_eq!(frame_file_name(42), "frame_0042.jpg");
        assert_eq!(frame_file_name(12345), "frame_12345.jpg");
    }

    #[test]
    fn test_parse_frame_index() {
        assert_eq!(parse_frame_index("frame_0007.jpg"), Some(7));
        assert_eq!(parse_frame_index("frame_12345.jpg"), Some(12345));
        assert_eq!(parse_frame_index("frame_7.jpg"), None);
        assert_eq!(parse_frame_index("frame_00a1.jpg"), None);
        assert_eq!(parse_frame_index("output_0001.jpg"), None);
        assert_eq!(parse_frame_index("frame_0001.png"), None);
    }

    #[test]
    fn test_persist_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());

        let path = store.persist(&[0xFF, 0xD8, 0xFF, 0xD9], 3).unwrap();
        assert_eq!(path, temp.path().join("esp32_images").join("frame_0003.jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_persist_empty_frame_is_deleted() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());

        let err = store.persist(&[], 0).unwrap_err();
        assert!(matches!(err, FrameError::Empty { index: 0, .. }));
        assert!(!store.frame_path(0).exists());
    }

    #[test]
    fn test_persist_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());

        store.persist(b"jpeg", 0).unwrap();
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["frame_0000.jpg"]);
    }

    #[test]
    fn test_failed_write_removes_frame() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());
        store.persist(b"stale frame", 0).unwrap();

        // Block the staging file so the write fails
        fs::create_dir(store.dir().join("frame_0000.jpg.part")).unwrap();

        let err = store.persist(b"new frame", 0).unwrap_err();
        assert!(matches!(err, FrameError::Write { index: 0, .. }));
        assert!(!store.frame_path(0).exists());
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn test_failed_rename_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());
        fs::create_dir_all(store.frame_path(0)).unwrap();

        let err = store.persist(b"jpeg", 0).unwrap_err();
        assert!(matches!(err, FrameError::Write { index: 0, .. }));
        assert!(!store.dir().join("frame_0000.jpg.part").exists());
    }

    #[test]
    fn test_compact_closes_gaps_in_order() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());
        for (index, data) in [(0, b"a"), (2, b"c"), (3, b"d")] {
            store.persist(data, index).unwrap();
        }

        let frames = store.compact().unwrap();
        assert_eq!(frames, vec![store.frame_path(0), store.frame_path(1), store.frame_path(2)]);
        assert_eq!(fs::read(store.frame_path(1)).unwrap(), b"c");
        assert_eq!(fs::read(store.frame_path(2)).unwrap(), b"d");
        assert!(!store.frame_path(3).exists());
    }

    #[test]
    fn test_list_frames_in_index_order() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());

        for index in [2, 0, 10000, 1] {
            store.persist(b"jpeg", index).unwrap();
        }
        fs::write(store.dir().join("notes.txt"), b"x").unwrap();

        let names: Vec<String> = store
            .list_frames()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["frame_0000.jpg", "frame_0001.jpg", "frame_0002.jpg", "frame_10000.jpg"]
        );
        assert_eq!(store.frame_count(), 4);
    }

    #[test]
    fn test_list_frames_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(&temp.path().join("nowhere"));
        assert!(store.list_frames().unwrap().is_empty());
        assert_eq!(store.frame_count(), 0);
    }

    #[test]
    fn test_clear_removes_all_files() {
        let temp = TempDir::new().unwrap();
        let store = FrameStore::new(temp.path());

        store.persist(b"a", 0).unwrap();
        store.persist(b"b", 1).unwrap();
        assert_eq!(store.clear(), 2);
        assert_eq!(store.frame_count(), 0);
    }
}
