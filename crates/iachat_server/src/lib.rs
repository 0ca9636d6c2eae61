mod app;
mod chat;
mod summary;
mod upload;

#[cfg(test)]
mod test_support;

pub use app::{build_router, AppState, LogLine, ServerSettings};
