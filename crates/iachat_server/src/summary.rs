use iachat_llm::{ChatMessage, ChatModel, CompletionRequest};
use tracing::warn;

pub(crate) const FALLBACK_SUMMARY: &str =
    "An automatic summary could not be generated, but the file was uploaded correctly.";
pub(crate) const UNREADABLE_SUMMARY: &str = "I could not read this file (unsupported or empty).";

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "ts", "json", "html", "css", "csv", "xml", "yml", "yaml", "sql",
    "ini", "cfg", "toml", "rs",
];
const MAX_TEXT_BYTES: usize = 250_000;
const PROMPT_CHARS: usize = 8_000;

fn is_text_like(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Text worth sending to the model, if any.
pub(crate) fn extract_text(file_name: &str, bytes: &[u8]) -> Option<String> {
    if !is_text_like(file_name) || bytes.len() > MAX_TEXT_BYTES {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub(crate) fn summary_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(PROMPT_CHARS).collect();
    format!(
        "Summarize the following document in a few bullet points, highlighting key \
         information useful for IT, business analysis and project follow-up:\n\n{excerpt}"
    )
}

pub(crate) async fn summarize_upload(
    model: &dyn ChatModel,
    model_name: &str,
    file_name: &str,
    bytes: &[u8],
) -> String {
    let Some(text) = extract_text(file_name, bytes) else {
        return UNREADABLE_SUMMARY.to_string();
    };

    let request = CompletionRequest {
        model: model_name.to_string(),
        messages: vec![ChatMessage::user(summary_prompt(&text))],
    };

    match model.complete(&request).await {
        Ok(completion) if !completion.content.is_empty() => completion.content,
        Ok(_) => FALLBACK_SUMMARY.to_string(),
        Err(err) => {
            warn!(file_name = %file_name, error = %err, "summary generation failed");
            FALLBACK_SUMMARY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_text, summarize_upload, summary_prompt, FALLBACK_SUMMARY, UNREADABLE_SUMMARY};
    use iachat_llm::StaticChatModel;

    #[test]
    fn only_small_text_files_are_read() {
        assert_eq!(extract_text("notes.MD", b"  hola \n"), Some("hola".to_string()));
        assert_eq!(extract_text("photo.png", b"hola"), None);
        assert_eq!(extract_text("empty.txt", b"   \n"), None);
        assert_eq!(extract_text("big.txt", &vec![b'a'; 250_001]), None);
        assert_eq!(extract_text("Makefile", b"all:"), None);
    }

    #[test]
    fn prompt_is_truncated_by_characters() {
        let text = "ñ".repeat(9_000);
        let prompt = summary_prompt(&text);
        assert_eq!(prompt.chars().filter(|c| *c == 'ñ').count(), 8_000);
    }

    #[tokio::test]
    async fn binary_files_skip_the_model() {
        let model = StaticChatModel::reply("- resumen");
        let summary = summarize_upload(&model, "gpt-4o-mini", "b.png", &[0u8; 300]).await;
        assert_eq!(summary, UNREADABLE_SUMMARY);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn office_documents_are_not_parsed() {
        let model = StaticChatModel::reply("- resumen");
        for name in ["informe.pdf", "datos.xlsx", "slides.pptx", "carta.docx"] {
            let summary = summarize_upload(&model, "gpt-4o-mini", name, b"PK\x03\x04").await;
            assert_eq!(summary, UNREADABLE_SUMMARY, "{name}");
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let model = StaticChatModel::unavailable("quota exceeded");
        let summary = summarize_upload(&model, "gpt-4o-mini", "a.txt", b"contenido").await;
        assert_eq!(summary, FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn text_files_are_summarized() {
        let model = StaticChatModel::reply("- resumen");
        let summary = summarize_upload(&model, "gpt-4o-mini", "a.txt", b"contenido").await;
        assert_eq!(summary, "- resumen");
        assert_eq!(model.calls(), 1);
    }
}
