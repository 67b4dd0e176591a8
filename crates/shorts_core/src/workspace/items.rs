//! Finding, moving, and archiving work items on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::layout::is_video;
use crate::models::{sidecar_path_for, VideoMetadata, WorkItem};
use crate::persist::{self, Loaded};

/// Video items in `dir`, sorted by file name. A missing directory is empty.
///
/// Each item picks up its metadata sidecar when one exists.
pub fn discover_items(dir: &Path) -> io::Result<Vec<WorkItem>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_video(&path) {
            continue;
        }

        let mut item = WorkItem::from_path(&path);
        item.metadata = load_sidecar(&sidecar_path_for(&path));
        items.push(item);
    }

    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}

/// Read a metadata sidecar. Missing or unreadable sidecars yield `None`.
pub fn load_sidecar(path: &Path) -> Option<VideoMetadata> {
    match persist::read_json::<VideoMetadata>(path) {
        Ok(Loaded::Present(metadata)) => Some(metadata),
        Ok(Loaded::Missing) => None,
        Ok(Loaded::Corrupt(reason)) => {
            tracing::warn!("Ignoring corrupt sidecar {}: {}", path.display(), reason);
            None
        }
        Err(e) => {
            tracing::warn!("Cannot read sidecar {}: {}", path.display(), e);
            None
        }
    }
}

/// Move `item` (and its sidecar) into `dest_dir`, keeping the file name.
///
/// When the item carries metadata the sidecar is (re)written at the new
/// location. Returns the item at its new path. An existing file of the same
/// name in `dest_dir` is never replaced (`ErrorKind::AlreadyExists`).
pub fn relocate(item: &WorkItem, dest_dir: &Path) -> io::Result<WorkItem> {
    fs::create_dir_all(dest_dir)?;

    let dest = dest_dir.join(&item.name);
    if dest != item.path {
        if dest.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            ));
        }
        move_file(&item.path, &dest)?;
    }
    let moved = item.moved_to(dest);

    let old_sidecar = item.sidecar_path();
    let new_sidecar = moved.sidecar_path();
    match &moved.metadata {
        Some(metadata) => {
            persist::write_json_atomic(&new_sidecar, metadata)?;
            if old_sidecar != new_sidecar {
                remove_if_exists(&old_sidecar)?;
            }
        }
        None => {
            if old_sidecar != new_sidecar && old_sidecar.exists() {
                move_file(&old_sidecar, &new_sidecar)?;
            }
        }
    }

    tracing::debug!("Relocated {} to {}", item.name, dest_dir.display());
    Ok(moved)
}

/// Delete an item's file and sidecar.
pub fn remove_item(item: &WorkItem) -> io::Result<()> {
    remove_if_exists(&item.path)?;
    remove_if_exists(&item.sidecar_path())
}

/// Move `src` to `dst`, falling back to copy-then-remove across filesystems.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !src.exists() {
                return Err(rename_err);
            }
            fs::copy(src, dst).map_err(|e| {
                let _ = fs::remove_file(dst);
                e
            })?;
            fs::remove_file(src)
        }
    }
}

/// Remove a file, ignoring a missing one.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Files in `dir` whose name starts with `prefix`, sorted.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() && entry.file_name().to_string_lossy().starts_with(prefix) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discovers_videos_in_name_order() {
        let dir = tempdir().unwrap();
        for name in ["c.mp4", "a.webm", "b.mp4", "notes.txt", "b.json"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("d.mp4")).unwrap();

        let names: Vec<String> = discover_items(dir.path())
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["a.webm", "b.mp4", "c.mp4"]);
    }

    #[test]
    fn missing_dir_has_no_items() {
        let dir = tempdir().unwrap();
        assert!(discover_items(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn discovery_loads_sidecars() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        fs::write(
            dir.path().join("clip.json"),
            r#"{"title": "T", "description": "D"}"#,
        )
        .unwrap();

        let items = discover_items(dir.path()).unwrap();
        assert_eq!(items[0].metadata.as_ref().unwrap().title, "T");
    }

    #[test]
    fn relocate_moves_file_and_writes_sidecar() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("final");
        let dst_dir = dir.path().join("ready");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("clip.mp4"), b"video").unwrap();

        let item = WorkItem::from_path(src_dir.join("clip.mp4")).with_metadata(VideoMetadata {
            title: "Title".into(),
            description: "Desc".into(),
            tags: vec!["Tech".into()],
        });
        let moved = relocate(&item, &dst_dir).unwrap();

        assert!(!src_dir.join("clip.mp4").exists());
        assert_eq!(fs::read(&moved.path).unwrap(), b"video");
        assert_eq!(load_sidecar(&dst_dir.join("clip.json")).unwrap().title, "Title");
    }

    #[test]
    fn relocate_carries_existing_sidecar() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("ready");
        let dst_dir = dir.path().join("uploaded");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("clip.mp4"), b"video").unwrap();
        fs::write(src_dir.join("clip.json"), "{}").unwrap();

        relocate(&WorkItem::from_path(src_dir.join("clip.mp4")), &dst_dir).unwrap();

        assert!(dst_dir.join("clip.json").exists());
        assert!(!src_dir.join("clip.json").exists());
    }

    #[test]
    fn relocate_refuses_to_replace_an_existing_file() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("edited");
        let dst_dir = dir.path().join("final");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("a.mp4"), b"second").unwrap();
        fs::write(dst_dir.join("a.mp4"), b"first").unwrap();

        let err = relocate(&WorkItem::from_path(src_dir.join("a.mp4")), &dst_dir).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(dst_dir.join("a.mp4")).unwrap(), b"first");
        assert_eq!(fs::read(src_dir.join("a.mp4")).unwrap(), b"second");
    }

    #[test]
    fn remove_item_ignores_missing_sidecar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"x").unwrap();

        remove_item(&WorkItem::from_path(&path)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn finds_files_by_prefix() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("123.mp4"), b"x").unwrap();
        fs::write(dir.path().join("123.mp4.part"), b"x").unwrap();
        fs::write(dir.path().join("456.mp4"), b"x").unwrap();

        let found = files_with_prefix(dir.path(), "123.").unwrap();
        assert_eq!(found.len(), 2);
    }
}
