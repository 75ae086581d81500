//! Inode numbers for filer paths, as the kernel protocol addresses nodes by
//! number. Numbers are handed out on first lookup and retired on forget.
use std::collections::HashMap;
use std::sync::Mutex;

pub const ROOT_INO: u64 = 1;

struct Node {
    path: String,
    lookups: u64,
}

struct Inodes {
    by_path: HashMap<String, u64>,
    by_ino: HashMap<u64, Node>,
    next: u64,
}

impl Inodes {
    fn get_or_insert(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_path.insert(path.to_string(), ino);
        self.by_ino.insert(
            ino,
            Node {
                path: path.to_string(),
                lookups: 0,
            },
        );
        ino
    }
}

pub struct InodeTable {
    inner: Mutex<Inodes>,
}

impl InodeTable {
    pub fn new(root_path: &str) -> Self {
        let mut by_path = HashMap::new();
        let mut by_ino = HashMap::new();
        by_path.insert(root_path.to_string(), ROOT_INO);
        by_ino.insert(
            ROOT_INO,
            Node {
                path: root_path.to_string(),
                lookups: 1,
            },
        );
        Self {
            inner: Mutex::new(Inodes {
                by_path,
                by_ino,
                next: ROOT_INO + 1,
            }),
        }
    }

    /// Returns the inode for `path`, counting one kernel lookup reference.
    pub fn lookup(&self, path: &str) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ino = inner.get_or_insert(path);
        if let Some(node) = inner.by_ino.get_mut(&ino) {
            node.lookups += 1;
        }
        ino
    }

    /// Inode for `path` without taking a reference, assigning one if needed.
    /// Used for directory listings, which the kernel does not count.
    pub fn assign(&self, path: &str) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get_or_insert(path)
    }

    /// Inode for `path` without taking a reference, if one was assigned.
    pub fn ino_of(&self, path: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_path.get(path).copied()
    }

    pub fn path_of(&self, ino: u64) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_ino.get(&ino).map(|n| n.path.clone())
    }

    /// Drops `nlookup` references; the number is retired at zero. The root
    /// is never retired.
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let retired = match inner.by_ino.get_mut(&ino) {
            Some(node) => {
                node.lookups = node.lookups.saturating_sub(nlookup);
                (node.lookups == 0).then(|| node.path.clone())
            }
            None => None,
        };
        if let Some(path) = retired {
            inner.by_ino.remove(&ino);
            inner.by_path.remove(&path);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_ino
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
