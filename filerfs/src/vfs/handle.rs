//! Open file handles and the slot table that owns them.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::node::File;
use crate::chunk::VolumeReader;
use crate::error::FilerResult;

#[derive(Debug)]
pub struct FileHandle {
    /// Index of the slot holding this handle.
    pub handle: u64,
    pub file: File,
    pub uid: u32,
    pub gid: u32,
}

impl FileHandle {
    /// Reads up to `size` bytes at `offset`, short at end of file.
    pub async fn read(&self, reader: &VolumeReader, offset: u64, size: u64) -> FilerResult<Vec<u8>> {
        let total = self.file.entry.total_size()?;
        if offset >= total {
            return Ok(Vec::new());
        }
        let size = size.min(total - offset);
        reader.read_at(&self.file.entry.chunks, offset, size).await
    }
}

#[derive(Default)]
struct Slots {
    handles: Vec<Option<Arc<FileHandle>>>,
    path_to_handle_index: HashMap<String, usize>,
}

impl Slots {
    fn place(&mut self, index: usize, file: File, uid: u32, gid: u32) -> Arc<FileHandle> {
        let path = file.full_path();
        let fh = Arc::new(FileHandle {
            handle: index as u64,
            file,
            uid,
            gid,
        });
        if index == self.handles.len() {
            self.handles.push(Some(fh.clone()));
        } else {
            self.handles[index] = Some(fh.clone());
        }
        self.path_to_handle_index.insert(path, index);
        fh
    }
}

/// Arena of handle slots. A `None` slot is free and is reused before the
/// table grows.
#[derive(Default)]
pub struct HandleTable {
    slots: Mutex<Slots>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, file: File, uid: u32, gid: u32) -> Arc<FileHandle> {
        let path = file.full_path();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(&index) = slots.path_to_handle_index.get(&path) {
            match slots.handles.get(index).cloned() {
                Some(Some(live)) if live.file.full_path() == path => return live,
                Some(None) => {
                    debug!("reinit handle {} for {}", index, path);
                    return slots.place(index, file, uid, gid);
                }
                // Slot gone or taken by another path.
                _ => {
                    slots.path_to_handle_index.remove(&path);
                }
            }
        }

        let index = slots
            .handles
            .iter()
            .position(Option::is_none)
            .unwrap_or(slots.handles.len());
        debug!("acquire handle {} for {}", index, path);
        slots.place(index, file, uid, gid)
    }

    /// Out-of-range ids only drop the path mapping.
    pub fn release(&self, path: &str, handle_id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.path_to_handle_index.remove(path);
        if let Some(slot) = slots.handles.get_mut(handle_id as usize) {
            *slot = None;
        }
    }

    pub fn get(&self, handle_id: u64) -> Option<Arc<FileHandle>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.handles.get(handle_id as usize).cloned().flatten()
    }

    /// Number of slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).handles.len()
    }

    pub fn live(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.handles.iter().filter(|h| h.is_some()).count()
    }
}
