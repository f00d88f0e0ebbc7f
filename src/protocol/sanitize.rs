//! 模型输出清洗：在结构解析前修复常见的标记问题
//!
//! 1. 去掉控制字符（保留 \n \r \t）
//! 2. 不构成实体的裸 `&` 转义为 `&amp;`
//! 3. （可选）不以已知标签开头的 `<` 转义为 `&lt;`
//!
//! 解析器取出标签内文本后再调用 [`unescape`] 还原。

use std::sync::OnceLock;

use regex::Regex;

/// 解析器认识的标签名
pub const KNOWN_TAGS: &[&str] = &["title", "tool_use", "name", "arguments", "thinking"];

#[derive(Debug, Clone, Copy)]
pub struct SanitizeOptions {
    pub escape_stray_lt: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            escape_stray_lt: true,
        }
    }
}

static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static UNESCAPE_RE: OnceLock<Regex> = OnceLock::new();

fn entity_re() -> &'static Regex {
    ENTITY_RE.get_or_init(|| {
        Regex::new(r"^&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").unwrap()
    })
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| {
        let names = KNOWN_TAGS.join("|");
        Regex::new(&format!(r"^</?(?:{})\s*>", names)).unwrap()
    })
}

pub fn sanitize(text: &str, options: SanitizeOptions) -> String {
    let cleaned = strip_control_chars(text);
    let escaped = escape_bare_ampersands(&cleaned);
    if options.escape_stray_lt {
        escape_stray_lt(&escaped)
    } else {
        escaped
    }
}

pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// `a & b` -> `a &amp; b`；`&lt;`、`&#38;` 等合法实体保持不变
pub fn escape_bare_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '&' && !entity_re().is_match(&text[i..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

pub fn escape_stray_lt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if c == '<' && !tag_re().is_match(&text[i..]) {
            out.push_str("&lt;");
        } else {
            out.push(c);
        }
    }
    out
}

/// 还原常见 XML 实体与数字字符引用；单次扫描，`&amp;lt;` 只还原一层
pub fn unescape(text: &str) -> String {
    let re = UNESCAPE_RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|lt|gt|amp|quot|apos);").unwrap()
    });
    re.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let decoded = match body {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = if let Some(hex) = body
                    .strip_prefix("#x")
                    .or_else(|| body.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    body[1..].parse::<u32>().ok()
                };
                code.and_then(char::from_u32)
            }
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_controls_but_keeps_whitespace() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7}c\n\td\r"), "abc\n\td\r");
    }

    #[test]
    fn escapes_only_bare_ampersands() {
        assert_eq!(
            escape_bare_ampersands("Tom & Jerry &amp; &#38; &x"),
            "Tom &amp; Jerry &amp; &#38; &amp;x"
        );
    }

    #[test]
    fn stray_lt_is_escaped_known_tags_kept() {
        let input = "<title>a < b</title><tool_use></tool_use><b>";
        assert_eq!(
            escape_stray_lt(input),
            "<title>a &lt; b</title><tool_use></tool_use>&lt;b>"
        );
    }

    #[test]
    fn unescape_is_single_pass() {
        assert_eq!(unescape("&lt;x&gt; &amp;lt; &#65;&#x42;"), "<x> &lt; AB");
    }

    #[test]
    fn sanitize_then_unescape_restores_text() {
        let raw = "x < y && z";
        let clean = sanitize(raw, SanitizeOptions::default());
        assert!(!clean.contains(" < "));
        assert_eq!(unescape(&clean), raw);
    }
}
