pub mod chat;
pub mod reply;
pub mod upload;

pub use chat::{ChatReply, ChatRequest, HistoryEntry};
pub use reply::{decode_reply, ReplyError, UploadReply};
pub use upload::{
    UploadAck, UploadErrorCode, UploadFailure, UploadedFile, UPLOAD_FIELD, UPLOAD_PATH,
};
