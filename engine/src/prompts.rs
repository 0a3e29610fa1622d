//! Prompt composition and response cleanup.

/// Fence marker that opens a markdown code block.
const FENCE: &str = "```";

/// Content size above which a request is logged as large.
const LARGE_CONTENT_CHARS: usize = 15_000;
/// Content size above which a request is logged as medium.
const MEDIUM_CONTENT_CHARS: usize = 8_000;

/// System instruction for rewriting an artifact.
#[must_use]
pub fn edit_system_instruction(artifact: &str) -> String {
    format!(
        "You are an expert code editor. You receive the current content of a file and a request \
describing changes to make.

File: {artifact}

Reply with ONLY the complete edited content. No explanations, no markdown formatting, no other \
text: your reply replaces the file as-is.

Implement new functionality, modifications, and fixes directly in the content you return.

Always start from the CURRENT content provided and make incremental changes to it. Do not \
rewrite from scratch unless explicitly asked."
    )
}

/// System instruction for a conversational turn, optionally grounded in a file.
#[must_use]
pub fn chat_system_instruction(file_context: Option<&str>) -> String {
    match file_context {
        Some(context) => format!(
            "You are an expert programming assistant and code reviewer. The user asks questions \
or seeks advice.

Current File Context:
{context}

Give helpful, practical answers. You can explain how the current code works, suggest \
improvements, answer programming questions, provide examples, and help debug issues. Reference \
the attached file where it helps. Be conversational."
        ),
        None => "You are an expert programming assistant and code reviewer. The user asks \
questions or seeks advice.

Give helpful, practical answers. You can answer programming questions, provide examples, explain \
concepts, and help debug issues. Be conversational."
            .to_string(),
    }
}

/// The user turn sent for an edit; also what the context remembers.
#[must_use]
pub fn edit_user_turn(content: &str, prompt: &str) -> String {
    format!("Current file content:\n{content}\n\nUser request: {prompt}")
}

/// File context block embedded in the chat system instruction.
#[must_use]
pub fn chat_file_context(name: &str, content: &str) -> String {
    format!("File: {name}\n\nContent:\n{content}")
}

/// Drop a single wrapping code fence.
///
/// When `text` starts with a fence and has more than two lines, the first and
/// last lines are removed. Anything else is returned unchanged. The second
/// value reports whether a fence was removed.
#[must_use]
pub fn strip_code_fence(text: &str) -> (String, bool) {
    if !text.starts_with(FENCE) {
        return (text.to_string(), false);
    }
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= 2 {
        return (text.to_string(), false);
    }
    (lines[1..lines.len() - 1].join("\n"), true)
}

/// Log how much content a request is about to carry.
pub(crate) fn log_content_size(what: &'static str, chars: usize) {
    if chars > LARGE_CONTENT_CHARS {
        tracing::warn!(what, chars, "Large content: this will use significant tokens");
    } else if chars > MEDIUM_CONTENT_CHARS {
        tracing::info!(what, chars, "Medium content: moderate token usage expected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_is_unwrapped() {
        assert_eq!(strip_code_fence("```\ncode\n```"), ("code".to_string(), true));
        assert_eq!(
            strip_code_fence("```rust\nfn a() {}\nfn b() {}\n```"),
            ("fn a() {}\nfn b() {}".to_string(), true)
        );
    }

    #[test]
    fn short_or_unfenced_text_is_untouched() {
        assert_eq!(strip_code_fence("```\n```"), ("```\n```".to_string(), false));
        assert_eq!(strip_code_fence("plain"), ("plain".to_string(), false));
        assert_eq!(
            strip_code_fence("text\n```\ncode\n```"),
            ("text\n```\ncode\n```".to_string(), false)
        );
    }

    #[test]
    fn fence_drops_last_line_even_without_closing_marker() {
        assert_eq!(
            strip_code_fence("```\na\nb"),
            ("a".to_string(), true)
        );
    }

    #[test]
    fn edit_turn_layout() {
        assert_eq!(
            edit_user_turn("x = 1", "rename x"),
            "Current file content:\nx = 1\n\nUser request: rename x"
        );
    }

    #[test]
    fn instructions_name_the_artifact() {
        assert!(edit_system_instruction("src/app.py").contains("File: src/app.py"));
        let ctx = chat_file_context("app.py", "print(1)");
        assert_eq!(ctx, "File: app.py\n\nContent:\nprint(1)");
        assert!(chat_system_instruction(Some(&ctx)).contains(&ctx));
        assert!(!chat_system_instruction(None).contains("Current File Context"));
    }
}
