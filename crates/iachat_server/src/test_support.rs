use std::path::PathBuf;
use std::sync::Arc;

use iachat_llm::ChatModel;
use iachat_storage::{StorageConfig, UploadStore};
use tempfile::TempDir;

use crate::app::{build_router, AppState, ServerSettings};

pub(crate) struct TestApp {
    pub base_url: String,
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.state.store.upload_dir().to_path_buf()
    }
}

pub(crate) async fn spawn_app(model: Arc<dyn ChatModel>) -> TestApp {
    spawn_app_with(model, ServerSettings::default()).await
}

pub(crate) async fn spawn_app_with(model: Arc<dyn ChatModel>, settings: ServerSettings) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = UploadStore::connect(&StorageConfig {
        sqlite_path: dir.path().join("iachat.db").display().to_string(),
        upload_dir: dir.path().join("uploads"),
    })
    .await
    .expect("store");

    let state = AppState::new(store, model, settings);
    let router = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        state,
        _dir: dir,
    }
}
