//! Headless drag-and-drop upload client.
//!
//! A [`DropZone`] turns drag events on an injected [`DropTarget`] into one
//! multipart `POST /upload`, narrating progress into an injected [`LogView`].

pub mod dom;
pub mod transport;
pub mod zone;

pub use dom::{
    BufferedLog, ClassList, DragEvent, DragEventKind, DropTarget, DroppedFile, LogView,
    SyntheticDragEvent, DRAG_OVER_CLASS,
};
pub use transport::{HttpUploadTransport, RawResponse, TransportError, UploadTransport};
pub use zone::{DropOutcome, DropZone, NoopObserver, UploadError, UploadObserver};
