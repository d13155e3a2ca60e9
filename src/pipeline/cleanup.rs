const FENCE: &str = "```";

/// Appended to every published post.
pub const NOTICE: &str = "---\n\n\
> *This briefing was drafted with the help of an AI model from public market data. \
It is provided for information only and is not investment advice. \
Always do your own research before making investment decisions.*";

/// Final cleanup of the last stage's output: drop a wrapping code fence,
/// trim, and append the notice.
pub fn finalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.ends_with(NOTICE) {
        return trimmed.to_string();
    }
    let body = strip_code_fences(trimmed).trim();
    if body.is_empty() {
        return NOTICE.to_string();
    }
    format!("{}\n\n{}", body, NOTICE)
}

/// Removes an opening fence (```` ``` ```` or ```` ```lang ````, then a newline)
/// at the very start and a closing ```` ``` ```` at the very end. Fences
/// inside the body are left alone.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        if let Some((info, body)) = rest.split_once('\n') {
            if is_fence_info(info) {
                text = body;
            }
        }
    }

    if let Some(body) = text.strip_suffix(FENCE) {
        if body.is_empty() || body.ends_with('\n') {
            text = body;
        }
    }

    text
}

fn is_fence_info(info: &str) -> bool {
    let info = info.trim_end_matches('\r');
    info.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}
