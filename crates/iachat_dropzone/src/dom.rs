use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Class applied to the drop target while a drag hovers over it.
pub const DRAG_OVER_CLASS: &str = "drag-over";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DroppedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEventKind {
    Enter,
    Over,
    Leave,
    Drop,
}

/// The element files are dropped onto.
pub trait DropTarget: Send + Sync {
    fn add_class(&self, class: &str);
    fn remove_class(&self, class: &str);
    fn has_class(&self, class: &str) -> bool;
}

/// The element receiving human-readable status lines.
pub trait LogView: Send + Sync {
    fn append_line(&self, line: &str);
    fn scroll_to_bottom(&self);
}

pub trait DragEvent: Send + Sync {
    fn kind(&self) -> DragEventKind;
    /// Files carried by the event; empty for everything but a drop.
    fn files(&self) -> &[DroppedFile];
    fn prevent_default(&self);
    fn stop_propagation(&self);
}

/// Class set of a headless element.
#[derive(Debug, Default)]
pub struct ClassList {
    classes: Mutex<BTreeSet<String>>,
}

impl ClassList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DropTarget for ClassList {
    fn add_class(&self, class: &str) {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.to_string());
    }

    fn remove_class(&self, class: &str) {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(class);
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(class)
    }
}

/// Log view that keeps every line in memory and tracks whether it was
/// scrolled after the last append.
#[derive(Debug, Default)]
pub struct BufferedLog {
    lines: Mutex<Vec<String>>,
    scrolled: AtomicBool,
}

impl BufferedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.scrolled.load(Ordering::SeqCst)
    }
}

impl LogView for BufferedLog {
    fn append_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        self.scrolled.store(false, Ordering::SeqCst);
    }

    fn scroll_to_bottom(&self) {
        self.scrolled.store(true, Ordering::SeqCst);
    }
}

/// A drag event built in code rather than by a browser. Records whether the
/// handler suppressed default handling and propagation.
#[derive(Debug)]
pub struct SyntheticDragEvent {
    kind: DragEventKind,
    files: Vec<DroppedFile>,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

impl SyntheticDragEvent {
    pub fn new(kind: DragEventKind) -> Self {
        Self {
            kind,
            files: Vec::new(),
            default_prevented: AtomicBool::new(false),
            propagation_stopped: AtomicBool::new(false),
        }
    }

    pub fn drop_files(files: Vec<DroppedFile>) -> Self {
        Self {
            files,
            ..Self::new(DragEventKind::Drop)
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.load(Ordering::SeqCst)
    }
}

impl DragEvent for SyntheticDragEvent {
    fn kind(&self) -> DragEventKind {
        self.kind
    }

    fn files(&self) -> &[DroppedFile] {
        &self.files
    }

    fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    fn stop_propagation(&self) {
        self.propagation_stopped.store(true, Ordering::SeqCst);
    }
}
