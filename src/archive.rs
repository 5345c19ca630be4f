//! Where model files come from.
//!
//! Paths use backslashes and match case-insensitively. Archives are passed
//! in explicitly; there is no process-wide search path.

use log::{debug, trace};

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{FormatError, Result};
use crate::model::Model;

pub trait Archive {
    fn has(&self, path: &str) -> bool;

    /// Opens an entry. A missing entry is `Ok(None)`.
    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read>>>;

    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        match self.open(path)? {
            Some(mut reader) => {
                let mut buf = vec![];
                reader.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }
}

/// Lowercase with backslash separators.
pub fn normalize(path: &str) -> String {
    path.replace('/', "\\").to_lowercase()
}

/// Layers probed last-added first, so later layers override earlier ones.
#[derive(Default)]
pub struct ArchiveStack {
    layers: Vec<Box<dyn Archive>>,
}

impl ArchiveStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, archive: Box<dyn Archive>) {
        self.layers.push(archive);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Archive for ArchiveStack {
    fn has(&self, path: &str) -> bool {
        self.layers.iter().rev().any(|a| a.has(path))
    }

    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read>>> {
        for layer in self.layers.iter().rev() {
            if let Some(reader) = layer.open(path)? {
                return Ok(Some(reader));
            }
        }
        Ok(None)
    }
}

/// A directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks `path` one component at a time, falling back to a
    /// case-insensitive scan where the exact name is missing. Paths with a
    /// `..` component resolve to nothing, so lookups stay under the root.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut current = self.root.clone();
        for part in path.split(|c: char| c == '\\' || c == '/') {
            match part {
                "" | "." => continue,
                ".." => {
                    debug!("refusing {} outside {}", path, self.root.display());
                    return None;
                }
                _ => {}
            }
            let exact = current.join(part);
            if exact.exists() {
                current = exact;
                continue;
            }
            let found = fs::read_dir(&current)
                .ok()?
                .filter_map(|e| e.ok())
                .find(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(part))?;
            current = found.path();
        }
        Some(current)
    }
}

impl Archive for DirectoryArchive {
    fn has(&self, path: &str) -> bool {
        self.resolve(path).map_or(false, |p| p.is_file())
    }

    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read>>> {
        match self.resolve(path).filter(|p| p.is_file()) {
            Some(file) => {
                trace!("opening {}", file.display());
                Ok(Some(Box::new(fs::File::open(file)?)))
            }
            None => Ok(None),
        }
    }
}

/// Entries held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) {
        self.entries.insert(normalize(path), data.into());
    }
}

impl Archive for MemoryArchive {
    fn has(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    fn open(&self, path: &str) -> io::Result<Option<Box<dyn Read>>> {
        Ok(self
            .entries
            .get(&normalize(path))
            .map(|data| Box::new(Cursor::new(data.clone())) as Box<dyn Read>))
    }
}

/// Loads a model, choosing the codec from the extension: `.mdx` is binary,
/// `.mdl` is text. `Ok(None)` when the archive has no such entry.
pub fn load_model(archive: &dyn Archive, path: &str) -> Result<Option<Model>> {
    let normalized = normalize(path);
    let binary = if normalized.ends_with(".mdx") {
        true
    } else if normalized.ends_with(".mdl") {
        false
    } else {
        return Err(FormatError::Malformed(format!("{} is neither .mdx nor .mdl", path)).into());
    };

    let bytes = match archive.read(path)? {
        Some(bytes) => bytes,
        None => {
            debug!("{} not found", path);
            return Ok(None);
        }
    };
    let model = if binary {
        Model::from_mdx(&bytes)?
    } else {
        let src = String::from_utf8(bytes)
            .map_err(|e| FormatError::Malformed(format!("{} is not UTF-8: {}", path, e)))?;
        Model::from_mdl(&src)?
    };
    Ok(Some(model))
}

#[cfg(test)]
mod test {
    use super::*;

    const SMALL_MDL: &str = "Version { FormatVersion 800 }\nGlobalSequences 1 { Duration 300 }";

    #[test]
    fn memory_paths_are_normalized() {
        let mut archive = MemoryArchive::new();
        archive.insert("Units/Footman/Footman.mdl", SMALL_MDL);
        assert!(archive.has("units\\footman\\FOOTMAN.MDL"));
        assert!(!archive.has("units\\footman\\footman.mdx"));
        let bytes = archive.read("UNITS/footman/footman.mdl").unwrap().unwrap();
        assert_eq!(bytes, SMALL_MDL.as_bytes());
    }

    #[test]
    fn later_layers_win() {
        let mut base = MemoryArchive::new();
        base.insert("a.mdl", "base");
        base.insert("b.mdl", "only in base");
        let mut patch = MemoryArchive::new();
        patch.insert("a.mdl", "patch");

        let mut stack = ArchiveStack::new();
        stack.push(Box::new(base));
        stack.push(Box::new(patch));
        assert_eq!(stack.read("A.mdl").unwrap().unwrap(), b"patch");
        assert_eq!(stack.read("b.mdl").unwrap().unwrap(), b"only in base");
        assert!(stack.read("c.mdl").unwrap().is_none());
        assert!(!stack.has("c.mdl"));
    }

    #[test]
    fn load_model_by_extension() {
        let mut archive = MemoryArchive::new();
        archive.insert("m.mdl", SMALL_MDL);
        let model = load_model(&archive, "M.MDL").unwrap().unwrap();
        assert_eq!(model.global_sequences, [300]);

        archive.insert("m.mdx", model.to_mdx().unwrap());
        assert_eq!(load_model(&archive, "m.mdx").unwrap().unwrap(), model);

        assert!(load_model(&archive, "missing.mdx").unwrap().is_none());
        assert!(load_model(&archive, "m.blp").is_err());
    }

    #[test]
    fn directory_lookup_ignores_case() {
        let root = std::env::temp_dir().join(format!("mdlx-archive-{}", std::process::id()));
        let dir = root.join("Doodads").join("Tree");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Tree.mdl"), SMALL_MDL).unwrap();

        let archive = DirectoryArchive::new(&root);
        assert!(archive.has("doodads\\tree\\tree.mdl"));
        assert!(!archive.has("doodads\\tree"));
        assert!(!archive.has("doodads\\tree\\bush.mdl"));
        let model = load_model(&archive, "DOODADS\\TREE\\TREE.MDL").unwrap().unwrap();
        assert_eq!(model.version, 800);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn directory_stays_under_root() {
        let root = std::env::temp_dir().join(format!("mdlx-escape-{}", std::process::id()));
        let dir = root.join("inner");
        fs::create_dir_all(&dir).unwrap();
        fs::write(root.join("outside.mdl"), SMALL_MDL).unwrap();
        fs::write(dir.join("inside.mdl"), SMALL_MDL).unwrap();

        let archive = DirectoryArchive::new(&dir);
        assert!(archive.has(".\\inside.mdl"));
        assert!(!archive.has("..\\outside.mdl"));
        assert!(archive.open("../outside.mdl").unwrap().is_none());
        assert!(load_model(&archive, "sub\\..\\..\\outside.mdl").unwrap().is_none());

        fs::remove_dir_all(&root).unwrap();
    }
}
