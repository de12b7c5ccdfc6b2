mod common;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{offline, orchestrator, Scripted};
use vibe_sitegen::orchestrator::APOLOGY;
use vibe_sitegen::prompt::IMAGE_MARKER;
use vibe_sitegen::wire::{Category, GenerationLayout, GenerationRequest, GenerationResult, ImageData, Task};

fn req(prompt: &str) -> GenerationRequest {
    GenerationRequest { prompt: prompt.into() }
}

#[tokio::test]
async fn build_request_carries_extracted_prompt() {
    let p = Scripted::new().reply(
        Task::Classify,
        Ok(r#"{"category":"code_request","prompt":"a portfolio for a painter"}"#),
    );
    let reply = orchestrator(&p)
        .handle_categorization("Create a portfolio for a painter", None)
        .await
        .unwrap();
    assert_eq!(reply.category, Category::CodeRequest);
    assert_eq!(reply.prompt, "a portfolio for a painter");
    assert_eq!(reply.response, "");
    assert_eq!(p.tasks_seen(), vec![Task::Classify]);
}

#[tokio::test]
async fn unavailable_classifier_degrades_to_apology() {
    let p = Scripted::new().reply(Task::Classify, Err(offline()));
    let reply = orchestrator(&p).handle_categorization("What can you build?", None).await.unwrap();
    assert_eq!(reply.category, Category::GeneralInquiry);
    assert_eq!(reply.response, APOLOGY);
    assert_eq!(reply.prompt, "");
    // No diagnosis is attempted once classification failed.
    assert_eq!(p.tasks_seen(), vec![Task::Classify]);
}

#[tokio::test]
async fn malformed_classification_also_degrades() {
    let p = Scripted::new().reply(Task::Classify, Ok(r#"{"category":"smalltalk"}"#));
    let reply = orchestrator(&p).handle_categorization("hello", None).await.unwrap();
    assert_eq!(reply.category, Category::GeneralInquiry);
    assert_eq!(reply.response, APOLOGY);
}

#[tokio::test]
async fn general_inquiry_is_answered_by_diagnoser() {
    let p = Scripted::new()
        .reply(Task::Classify, Ok(r#"{"category":"general_inquiry","response":"short"}"#))
        .reply(Task::Diagnose, Ok(r#"{"response":"Open styles.css and change the h1 color."}"#));
    let reply = orchestrator(&p)
        .handle_categorization("How do I make the title red?", None)
        .await
        .unwrap();
    assert_eq!(reply.category, Category::GeneralInquiry);
    assert_eq!(reply.response, "Open styles.css and change the h1 color.");
    assert_eq!(p.tasks_seen(), vec![Task::Classify, Task::Diagnose]);
}

#[tokio::test]
async fn failed_diagnosis_falls_back_to_classifier_reply() {
    let p = Scripted::new()
        .reply(Task::Classify, Ok(r#"{"category":"general_inquiry","response":"I build websites."}"#))
        .reply(Task::Diagnose, Err(offline()));
    let reply = orchestrator(&p).handle_categorization("What can you build?", None).await.unwrap();
    assert_eq!(reply.response, "I build websites.");
}

#[tokio::test]
async fn silent_classifier_and_failed_diagnosis_still_answer() {
    let p = Scripted::new()
        .reply(Task::Classify, Ok(r#"{"category":"general_inquiry"}"#))
        .reply(Task::Diagnose, Err(offline()));
    let reply = orchestrator(&p).handle_categorization("What can you build?", None).await.unwrap();
    assert_eq!(reply.category, Category::GeneralInquiry);
    assert_eq!(reply.response, APOLOGY);
    assert_eq!(reply.prompt, "");
}

#[tokio::test]
async fn build_request_with_nothing_to_build_is_answered() {
    let p = Scripted::new()
        .reply(Task::Classify, Ok(r#"{"category":"code_request","prompt":"  "}"#))
        .reply(Task::Diagnose, Ok(r#"{"response":"Tell me what kind of site you want."}"#));
    let reply = orchestrator(&p).handle_categorization("   ", None).await.unwrap();
    assert_eq!(reply.category, Category::GeneralInquiry);
    assert_eq!(reply.prompt, "");
    assert_eq!(reply.response, "Tell me what kind of site you want.");
    assert_eq!(p.tasks_seen(), vec![Task::Classify, Task::Diagnose]);
}

#[tokio::test]
async fn image_reaches_classifier_prompt() {
    let img = ImageData::from_data_uri("data:image/png;base64,iVBORw0KGgo=").unwrap();
    let p = Scripted::new().reply(Task::Classify, Ok(r#"{"category":"code_request"}"#));
    let reply = orchestrator(&p)
        .handle_categorization("make a site like this", Some(img.clone()))
        .await
        .unwrap();
    // Missing prompt falls back to the utterance itself.
    assert_eq!(reply.prompt, "make a site like this");
    let seen = p.seen.lock();
    assert_eq!(seen[0].image.as_ref(), Some(&img));
    assert!(seen[0].text.contains(IMAGE_MARKER));
}

#[tokio::test]
async fn chat_without_image_has_no_image_reference() {
    let p = Scripted::new().reply(Task::Diagnose, Ok(r#"{"response":"Try a darker background."}"#));
    let reply = orchestrator(&p).handle_chat("the page is too bright", None).await.unwrap();
    assert_eq!(reply.response, "Try a darker background.");
    let seen = p.seen.lock();
    assert!(seen[0].image.is_none());
    assert!(!seen[0].text.contains(IMAGE_MARKER));
}

#[tokio::test]
async fn chat_failure_is_a_plain_boundary_error() {
    let p = Scripted::new().reply(Task::Diagnose, Err(offline()));
    let err = orchestrator(&p).handle_chat("hi", None).await.unwrap_err();
    assert!(!err.error.contains("connection refused"));
    assert!(!err.error.is_empty());
}

#[tokio::test]
async fn fenced_structured_document_is_unwrapped() {
    let p = Scripted::new().reply(Task::GenerateStructured, Ok("```json\n{\"html\":\"<p>hi</p>\"}\n```"));
    let r = orchestrator(&p)
        .handle_structured_generation(req("hi page"), GenerationLayout::Document)
        .await
        .unwrap();
    assert_eq!(r, GenerationResult::Document { html: "<p>hi</p>".into() });
}

#[tokio::test]
async fn non_json_reply_becomes_fallback_document() {
    let p = Scripted::new().reply(Task::GenerateStructured, Ok("oops"));
    let r = orchestrator(&p)
        .handle_structured_generation(req("hi page"), GenerationLayout::Document)
        .await
        .unwrap();
    let GenerationResult::Document { html } = r else {
        panic!("expected a document");
    };
    assert!(html.contains("oops"));
    assert!(html.contains(r#"class="parse-error""#));
    // No retry before falling back.
    assert_eq!(p.tasks_seen(), vec![Task::GenerateStructured]);
}

#[tokio::test]
async fn file_set_with_dangling_reference_falls_back() {
    let raw = r#"{"files":[{"name":"index.html","content":"<script src=\"app.js\"></script>"}]}"#;
    let p = Scripted::new().reply(Task::GenerateFiles, Ok(raw));
    let r = orchestrator(&p)
        .handle_structured_generation(req("x"), GenerationLayout::Files)
        .await
        .unwrap();
    assert!(matches!(r, GenerationResult::Document { ref html } if html.contains("app.js")));
}

#[tokio::test]
async fn valid_file_set_is_returned_as_files() {
    let raw = r#"{"files":[
        {"name":"index.html","content":"<link rel=\"stylesheet\" href=\"style.css\"><h1>Hi</h1>"},
        {"name":"style.css","content":"h1{color:teal}"}
    ]}"#;
    let p = Scripted::new().reply(Task::GenerateFiles, Ok(raw));
    let r = orchestrator(&p)
        .handle_structured_generation(req("x"), GenerationLayout::Files)
        .await
        .unwrap();
    let names: Vec<String> = r.into_files().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["index.html", "style.css"]);
}

#[tokio::test]
async fn unavailable_structured_generation_is_an_error_not_a_fallback() {
    let p = Scripted::new().reply(Task::GenerateStructured, Err(offline()));
    let err = orchestrator(&p)
        .handle_structured_generation(req("x"), GenerationLayout::Document)
        .await
        .unwrap_err();
    assert!(!err.error.is_empty());
}

#[tokio::test]
async fn generation_stream_preserves_chunk_order() {
    let p = Scripted::new().stream_chunks(vec![Ok("<!DOCTYPE html>"), Ok("<html><body>"), Ok("</body></html>")]);
    let chunks: Vec<_> = orchestrator(&p)
        .handle_generation(req("a landing page"))
        .await
        .unwrap()
        .collect()
        .await;
    let text: String = chunks
        .into_iter()
        .map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(text, "<!DOCTYPE html><html><body></body></html>");
}

#[tokio::test]
async fn generation_stream_ends_at_first_error() {
    let p = Scripted::new().stream_chunks(vec![Ok("<html>"), Err(offline()), Ok("never")]);
    let chunks: Vec<_> = orchestrator(&p)
        .handle_generation(req("a landing page"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].is_ok());
    assert!(chunks[1].is_err());
}

#[tokio::test]
async fn silent_generation_stream_reports_error() {
    let p = Scripted::new().stream_chunks(vec![]);
    let chunks: Vec<_> = orchestrator(&p).handle_generation(req("x")).await.unwrap().collect().await;
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_err());
}

#[tokio::test]
async fn blank_prompt_is_rejected_before_any_model_call() {
    let p = Scripted::new();
    assert!(orchestrator(&p).handle_generation(req("   ")).await.is_err());
    assert!(p.tasks_seen().is_empty());
}

#[tokio::test]
async fn empty_diagnosis_is_an_error() {
    let p = Scripted::new().reply(Task::Diagnose, Ok(r#"{"response":"  "}"#));
    assert!(orchestrator(&p).handle_chat("hi", None).await.is_err());
}
