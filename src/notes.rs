//! Local Markdown note storage, organized by workspace and folder.
//!
//! Layout: `<root>/<workspace>/<folder>/.../<timestamp>-<seq>-<slug>.md`
//!
//! `seq` is a zero-padded counter within one timestamp, so notes saved in the
//! same second still list in the order they were written.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A note file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEntry {
    pub path: PathBuf,
    pub file_name: String,
}

pub struct NoteStore {
    root: PathBuf,
}

impl NoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a workspace and an optional `a/b/c` folder path.
    pub fn folder_path(&self, workspace: &str, folder: &str) -> Result<PathBuf> {
        validate_component(workspace)?;
        let mut dir = self.root.join(workspace);
        for part in folder.split('/').filter(|p| !p.is_empty()) {
            validate_component(part)?;
            dir.push(part);
        }
        Ok(dir)
    }

    /// Write a new note and return its path. Never overwrites.
    pub fn save(&self, workspace: &str, folder: &str, title: &str, markdown: &str) -> Result<PathBuf> {
        self.save_stamped(workspace, folder, &now_stamp(), title, markdown)
    }

    fn save_stamped(
        &self,
        workspace: &str,
        folder: &str,
        stamp: &str,
        title: &str,
        markdown: &str,
    ) -> Result<PathBuf> {
        let dir = self.folder_path(workspace, folder)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create note folder: {}", dir.display()))?;
        let seq = next_sequence(&dir, stamp)?;
        create_unique(&dir, stamp, seq, &slugify(title), markdown)
    }

    pub fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
    }

    /// Markdown notes directly inside a folder, newest first.
    pub fn list(&self, workspace: &str, folder: &str) -> Result<Vec<NoteEntry>> {
        let dir = self.folder_path(workspace, folder)?;
        let mut notes = Vec::new();
        if !dir.exists() {
            return Ok(notes);
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "md") {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                notes.push(NoteEntry { path, file_name });
            }
        }
        notes.sort_by(|a, b| {
            sort_key(&b.file_name)
                .cmp(&sort_key(&a.file_name))
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(notes)
    }

    pub fn workspaces(&self) -> Result<Vec<String>> {
        subdirectories(&self.root)
    }

    /// Immediate subfolders of a workspace folder.
    pub fn folders(&self, workspace: &str, folder: &str) -> Result<Vec<String>> {
        subdirectories(&self.folder_path(workspace, folder)?)
    }
}

/// Create `<stamp>-<seq>-<slug>.md`, moving to the next sequence number
/// whenever the name is already taken.
fn create_unique(dir: &Path, stamp: &str, mut seq: u32, slug: &str, markdown: &str) -> Result<PathBuf> {
    loop {
        let path = dir.join(format!("{}-{:03}-{}.md", stamp, seq, slug));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(markdown.as_bytes())
                    .with_context(|| format!("Failed to write note: {}", path.display()))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => seq += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create note: {}", path.display()))
            }
        }
    }
}

/// One past the highest sequence already used for `stamp` in `dir`.
fn next_sequence(dir: &Path, stamp: &str) -> Result<u32> {
    let prefix = format!("{}-", stamp);
    let mut next = 1;
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        let seq = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.split('-').next())
            .and_then(|seq| seq.parse::<u32>().ok());
        if let Some(seq) = seq {
            next = next.max(seq + 1);
        }
    }
    Ok(next)
}

/// `(date, time, seq)` parsed from a note file name. Files not written by
/// `save` get sequence 0.
fn sort_key(file_name: &str) -> (&str, &str, u32) {
    let mut parts = file_name.splitn(4, '-');
    let date = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    let seq = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (date, time, seq)
}

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.exists() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn validate_component(name: &str) -> Result<()> {
    if name.trim().is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("Invalid workspace or folder name: '{}'", name);
    }
    Ok(())
}

/// Lowercase ASCII slug for file names; "note" when nothing usable is left.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "note".to_string()
    } else {
        slug.chars().take(48).collect()
    }
}

pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}
