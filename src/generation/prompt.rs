// src/generation/prompt.rs
use super::{GenerationRequest, OutputMode};

const DESIGN_RULES: &str = r#"You are a visionary front-end developer and UI/UX designer who builds striking, modern interfaces with React and CSS.
Your task is to generate or MODIFY existing code based on the user's request.

GOLDEN RULES:
1. AESTHETICS FIRST: harmonious palettes (invent one if the request is vague), clean typography, generous spacing and subtle micro-interactions (CSS transitions, hover/focus states).
2. SMART MODIFICATION: when previous code is provided, MODIFY it instead of starting over. Apply only the requested change and keep the rest intact.
3. CLEAN, WORKING CODE: idiomatic React (hooks) and CSS."#;

const LEGACY_OUTPUT_RULES: &str = r#"OUTPUT RULES (VERY IMPORTANT):
4. Reply with ONE valid JSON object and no text before or after it.
5. The object must have EXACTLY the keys "html", "css" and "jsx".
6. The code under each key must not contain comments.
7. ALWAYS end JavaScript statements with a semicolon (;).
8. Do NOT use 'import' or 'export'. 'React' and 'ReactDOM' are available globally."#;

const FILES_OUTPUT_RULES: &str = r#"OUTPUT RULES (VERY IMPORTANT):
4. Reply with ONE valid JSON object and no text before or after it.
5. The object must have EXACTLY one key, "files": an array of {"path": string, "content": string}.
6. Paths are relative, forward-slash separated, inside a Next.js App Router project (for example "app/page.tsx", "app/components/Card.tsx").
7. Only return files you create or change; untouched project files are kept as they are.
8. "app/page.tsx" is rendered in a live preview where 'React' and 'ReactDOM' are global, so it must also work without imports.
9. Global styles belong in "app/globals.css"."#;

/// Full prompt for a synchronous generation: rules, current code, request.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(DESIGN_RULES);
    prompt.push_str("\n\n");

    match request.mode {
        OutputMode::Legacy => {
            prompt.push_str(LEGACY_OUTPUT_RULES);
            prompt.push_str("\n\n----------------\n[PREVIOUS CODE]\n");
            prompt.push_str("This is the current state of the code you must modify.\n\n");
            push_block(&mut prompt, "HTML", "html", &request.preview.html);
            push_block(&mut prompt, "CSS", "css", &request.preview.css);
            push_block(&mut prompt, "JSX", "jsx", &request.preview.js);
        }
        OutputMode::Files => {
            prompt.push_str(FILES_OUTPUT_RULES);
            prompt.push_str("\n\n----------------\n[CURRENT PROJECT FILES]\n");
            if request.files.is_empty() {
                prompt.push_str("(empty project)\n");
            }
            for file in &request.files {
                let language = fence_language(&file.path);
                push_block(&mut prompt, &file.path, language, &file.content);
            }
        }
    }

    prompt.push_str("----------------\n[NEW USER REQUEST]\n");
    prompt.push_str("Apply the following instruction to the code above: \"");
    prompt.push_str(request.prompt.trim());
    prompt.push_str("\"\n");
    prompt
}

fn push_block(prompt: &mut String, title: &str, language: &str, code: &str) {
    prompt.push_str(title);
    prompt.push_str(":\n```");
    prompt.push_str(language);
    prompt.push('\n');
    prompt.push_str(code);
    prompt.push_str("\n```\n\n");
}

fn fence_language(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("tsx") => "tsx",
        Some("ts") => "ts",
        Some("jsx") => "jsx",
        Some("js") | Some("mjs") => "js",
        Some("css") => "css",
        Some("json") => "json",
        Some("html") => "html",
        _ => "",
    }
}
