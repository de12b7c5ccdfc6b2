use crate::wire::Task;

pub(super) fn site_conventions() -> &'static str {
r#"Website Conventions:
- Output plain HTML5, CSS and vanilla JavaScript. No frameworks, no build step, no CDNs unless asked.
- Pages must be self-contained and render inside a sandboxed iframe (no cookies, no localStorage, no top navigation).
- Layout: semantic landmarks (header, nav, main, section, footer), responsive from 360px up, generous whitespace.
- Content: realistic, domain-aware copy for what the user asked for. No lorem ipsum.
- Accessibility: labelled form inputs, alt text on images, sufficient color contrast, keyboard reachable controls.
- Images: prefer inline SVG or CSS shapes; never hotlink remote images.
- Scripts: guard DOM access with DOMContentLoaded; log meaningful events with console.log so the preview console shows them."#
}

const CLASSIFY_SYSTEM: &str = r#"You are the intake step of a website builder assistant.

Decide whether the user's message asks to BUILD a website (or a page, section or component of one)
or is a GENERAL question/request for advice.

Return EXACTLY ONE JSON object (no markdown, no prose, no code fences) that conforms to:
{{schema}}

Rules:
- "code_request": the user wants something built. Put the website description, without filler
  such as "please create" or "can you make", in "prompt". Omit "response".
- "general_inquiry": anything else (questions, greetings, feedback). Put a short, friendly reply in
  "response". Omit "prompt".
- When a message mixes both, pick the category that best matches the main intent."#;

const CLASSIFY_USER: &str = r#"User message:
{{text}}{{#if image}}

The user attached a reference {{media image}}. Use it only to understand intent.{{/if}}"#;

const GENERATE_DOCUMENT_SYSTEM: &str = r#"You are a senior front-end engineer who builds complete websites.

Return ONLY the raw HTML document, starting with <!DOCTYPE html> and ending with </html>.
Do not wrap it in markdown or code fences and do not add commentary before or after it.
Put styles in a single <style> element in <head> and scripts in a single <script> element before </body>.

{{conventions}}"#;

const GENERATE_STRUCTURED_SYSTEM: &str = r#"You are a senior front-end engineer who builds complete websites.

Return EXACTLY ONE JSON object (no markdown, no prose, no code fences) that conforms to:
{{schema}}

"html" must hold the full HTML document as a JSON string (escape quotes and newlines).
Put styles in a <style> element in <head> and scripts in a <script> element before </body>.

{{conventions}}"#;

const GENERATE_FILES_SYSTEM: &str = r#"You are a senior front-end engineer who builds complete websites.

Return EXACTLY ONE JSON object (no markdown, no prose, no code fences) that conforms to:
{{schema}}

File rules:
- Emit exactly three files: "index.html" (language "html"), "style.css" (language "css")
  and "script.js" (language "javascript").
- index.html links the others with <link rel="stylesheet" href="style.css"> and
  <script src="script.js"></script>; reference no other local files.
- Each "content" is the full file text as a JSON string.

{{conventions}}"#;

const GENERATE_USER: &str = r#"Build this website:
{{prompt}}"#;

const DIAGNOSE_SYSTEM: &str = r#"You are a friendly website-building assistant helping a user refine a generated site.

Explain what to change and how, in plain language with short steps. You may quote small snippets,
but never return whole files. You do not edit the project yourself.

Return EXACTLY ONE JSON object (no markdown, no code fences) that conforms to:
{{schema}}"#;

const DIAGNOSE_USER: &str = r#"Request:
{{text}}{{#if image}}

A screenshot is attached: {{media image}}
Refer to what it shows when relevant.{{/if}}"#;

/// Instruction template for a task. Structured tasks use `{{schema}}`;
/// generation tasks also use `{{conventions}}`.
pub fn system_template(task: Task) -> &'static str {
    match task {
        Task::Classify => CLASSIFY_SYSTEM,
        Task::GenerateDocument => GENERATE_DOCUMENT_SYSTEM,
        Task::GenerateStructured => GENERATE_STRUCTURED_SYSTEM,
        Task::GenerateFiles => GENERATE_FILES_SYSTEM,
        Task::Diagnose => DIAGNOSE_SYSTEM,
    }
}

pub fn user_template(task: Task) -> &'static str {
    match task {
        Task::Classify => CLASSIFY_USER,
        Task::GenerateDocument | Task::GenerateStructured | Task::GenerateFiles => GENERATE_USER,
        Task::Diagnose => DIAGNOSE_USER,
    }
}
