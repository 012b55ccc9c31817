use crate::generator::GenerationRequest;
use crate::workflow::skeleton::CONTENT_PLACEHOLDER;

/// System prompt for the content-generation agent.
pub const GENERATOR_SYSTEM_PROMPT: &str = "\
You are a senior front-end engineer who builds complete, production-ready single-page websites.

You work on an existing index.html through the manage_site_files tool. The page already loads
React 18 (UMD), ReactDOM, Babel standalone, and the Tailwind CSS 4 browser build, and contains
a <div id=\"root\"></div> mount point.

Rules:
- Write the application as one or more <script type=\"text/babel\"> blocks and mount it with
  ReactDOM.createRoot(document.getElementById(\"root\")).render(<App />).
- Style exclusively with Tailwind utility classes.
- Never recreate index.html; edit it in place.
- Keep every old_string short and unique. Prefer several small edits over one large edit.
- When the site is finished, reply with a one-paragraph summary and no tool calls.";

/// Build the user prompt for one generation attempt.
pub fn generation_prompt(req: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Requirements: {}\nSite Type: {}\nStyle Preferences: {}\n\n",
        req.requirements,
        req.site_type,
        req.style_preferences.as_deref().unwrap_or("none specified"),
    );

    prompt.push_str(&format!(
        "The HTML skeleton has been created with placeholders. Your task is to:\n\
         1. Replace {CONTENT_PLACEHOLDER} with complete React components\n\
         2. Add all necessary styling, components, and functionality\n\
         3. Ensure the site is production-ready\n\n\
         IMPORTANT:\n\
         - Use the manage_site_files tool with site_id: {}\n\
         - Keep old_string SHORT (under {} characters)\n\
         - Use {CONTENT_PLACEHOLDER} as the old_string for the first edit\n\
         - Build incrementally if needed (create, read, edit in steps)\n\
         - React 18+ and Tailwind CSS 4+ are already loaded in the head\n",
        req.task_id, req.max_old_string_len,
    ));

    if req.attempt > 1 {
        prompt.push_str(&format!(
            "\nThis is retry attempt {} of {}. A previous attempt did not finish the page. \
             Read index.html first, then repair or complete what is there instead of starting over. \
             Remove any remaining placeholder comments.\n",
            req.attempt, req.max_attempts
        ));
    }

    prompt.push_str("\nGenerate a complete, production-ready website.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesmith_core::types::TaskId;

    fn request(attempt: u32) -> GenerationRequest {
        GenerationRequest {
            task_id: TaskId::new("20250101_000000_000001"),
            requirements: "simple landing page".into(),
            site_type: "landing page".into(),
            style_preferences: Some("dark, minimal".into()),
            attempt,
            max_attempts: 3,
            max_old_string_len: 200,
        }
    }

    #[test]
    fn test_first_attempt_prompt() {
        let prompt = generation_prompt(&request(1));
        assert!(prompt.starts_with("Requirements: simple landing page\nSite Type: landing page"));
        assert!(prompt.contains("Style Preferences: dark, minimal"));
        assert!(prompt.contains("site_id: 20250101_000000_000001"));
        assert!(prompt.contains("under 200 characters"));
        assert!(!prompt.contains("retry attempt"));
    }

    #[test]
    fn test_retry_prompt_asks_for_repair() {
        let prompt = generation_prompt(&request(2));
        assert!(prompt.contains("This is retry attempt 2 of 3"));
        assert!(prompt.contains("Read index.html first"));
    }
}
