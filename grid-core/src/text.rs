//! Text helpers for generated output

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Removes `<think>...</think>` reasoning blocks from model output.
///
/// An unterminated block swallows the rest of the text. A dangling close
/// tag (opening tag consumed by the chat template) drops everything before it.
pub fn strip_thinking_tags(text: &str) -> String {
    let mut rest = text;
    if let Some(close) = rest.find(THINK_CLOSE) {
        if !rest[..close].contains(THINK_OPEN) {
            rest = &rest[close + THINK_CLOSE.len()..];
        }
    }

    let mut out = String::with_capacity(rest.len());
    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close) => rest = &after_open[close + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}
