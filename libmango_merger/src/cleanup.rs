use std::path::Path;
use std::sync::mpsc::Sender;

use super::error::CleanupError;
use super::worker_status::{Stage, WorkerStatus};

/// Remove everything inside `folder` (files, links and subdirectories), leaving the folder
/// itself. The folder is created if it does not exist yet.
///
/// A single entry that cannot be removed is logged and skipped. Returns the number of bytes
/// freed by the removed files.
pub fn empty_directory(folder: &Path, tx: &Sender<WorkerStatus>) -> Result<u64, CleanupError> {
    if !folder.exists() {
        spdlog::info!("Creating target folder {}", folder.display());
        std::fs::create_dir_all(folder)?;
        return Ok(0);
    }
    if !folder.is_dir() {
        return Err(CleanupError::NotADirectory(folder.to_path_buf()));
    }

    let entries: Vec<_> = folder.read_dir()?.collect::<Result<_, _>>()?;
    let total = entries.len().max(1) as f32;
    let mut freed_bytes: u64 = 0;
    let mut removed = 0;
    for (idx, entry) in entries.iter().enumerate() {
        let path = entry.path();
        let label = entry.file_name().to_string_lossy().into_owned();
        // symlink_metadata so a link is removed as a link, never followed
        let result = entry.path().symlink_metadata().and_then(|meta| {
            if meta.is_dir() {
                let size = directory_size(&path);
                std::fs::remove_dir_all(&path).map(|_| size)
            } else {
                std::fs::remove_file(&path).map(|_| meta.len())
            }
        });
        match result {
            Ok(size) => {
                freed_bytes += size;
                removed += 1;
            }
            Err(e) => spdlog::warn!("Failed to delete {}. Reason: {}", path.display(), e),
        }
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / total,
            Stage::Clean,
            label,
        ))?;
    }

    spdlog::info!(
        "Removed {} entries ({}) from {}",
        removed,
        human_bytes::human_bytes(freed_bytes as f64),
        folder.display()
    );
    Ok(freed_bytes)
}

fn directory_size(dir: &Path) -> u64 {
    let Ok(read_dir) = dir.read_dir() else {
        return 0;
    };
    read_dir
        .flatten()
        .map(|entry| match entry.path().symlink_metadata() {
            Ok(meta) if meta.is_dir() => directory_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_empty_directory_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("merged");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("reco_run1-2_3D.h5"), [0u8; 100]).unwrap();
        std::fs::create_dir(target.join("old")).unwrap();
        std::fs::write(target.join("old").join("reco_run3-4_3D.h5"), [0u8; 50]).unwrap();

        let (tx, rx) = mpsc::channel();
        let freed = empty_directory(&target, &tx).unwrap();
        assert_eq!(freed, 150);
        assert!(target.is_dir());
        assert_eq!(target.read_dir().unwrap().count(), 0);
        assert!(rx.try_iter().all(|status| status.stage == Stage::Clean));
    }

    #[cfg(unix)]
    #[test]
    fn test_empty_directory_removes_link_not_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("merged");
        let kept = dir.path().join("kept");
        std::fs::create_dir(&target).unwrap();
        std::fs::create_dir(&kept).unwrap();
        std::fs::write(kept.join("data.h5"), b"data").unwrap();
        std::os::unix::fs::symlink(&kept, target.join("link")).unwrap();

        let (tx, _rx) = mpsc::channel();
        empty_directory(&target, &tx).unwrap();
        assert_eq!(target.read_dir().unwrap().count(), 0);
        assert!(kept.join("data.h5").exists());
    }

    #[test]
    fn test_missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("not").join("yet");
        let (tx, _rx) = mpsc::channel();
        assert_eq!(empty_directory(&target, &tx).unwrap(), 0);
        assert!(target.is_dir());
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("merged.h5");
        std::fs::write(&file, b"x").unwrap();
        let (tx, _rx) = mpsc::channel();
        let err = empty_directory(&file, &tx).unwrap_err();
        assert!(matches!(err, CleanupError::NotADirectory(p) if p == file));
        assert!(file.exists());
    }

    #[test]
    fn test_closed_progress_channel_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("merged");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("reco_run1-2_3D.h5"), b"x").unwrap();

        let (tx, rx) = mpsc::channel();
        drop(rx);
        let err = empty_directory(&target, &tx).unwrap_err();
        assert!(matches!(err, CleanupError::SendError(_)));
    }
}
