use crate::chunk::Entry;

/// Joins a directory path and a child name.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Splits `/a/b` into `("/a", "b")`; the root splits into `("/", "")`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => ("/", path),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    pub path: String,
}

impl Dir {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn child_path(&self, name: &str) -> String {
        join_path(&self.path, name)
    }
}

/// A file node with the entry snapshot it was resolved to.
#[derive(Debug, Clone)]
pub struct File {
    pub dir_path: String,
    pub name: String,
    pub entry: Entry,
}

impl File {
    pub fn from_entry(entry: Entry) -> Self {
        let (dir, name) = split_path(&entry.full_path);
        Self {
            dir_path: dir.to_string(),
            name: name.to_string(),
            entry,
        }
    }

    pub fn full_path(&self) -> String {
        join_path(&self.dir_path, &self.name)
    }
}
