//! Template tokenizer.
//!
//! Scans raw template text left to right into a flat token stream. Three
//! delimiter pairs are recognized: `{{ }}` for variable references,
//! `{% %}` for control tags, and `{# #}` for comments. A backslash
//! immediately before an opening delimiter escapes it into literal text.
//!
//! Each token records the exact source slice it was produced from, so
//! concatenating the `raw` fields of a token stream reproduces the
//! original source byte for byte. Comment tokens are retained in the
//! stream but produce no output and are never evaluated.

use crate::core::GuidegenError;

/// The lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A run of literal text (escapes still present in `raw`)
    Text,
    /// `{{ expr }}`
    VarRef,
    /// `{% if expr %}`
    CondStart,
    /// `{% elif expr %}`
    CondElif,
    /// `{% else %}`
    CondElse,
    /// `{% endif %}`
    CondEnd,
    /// `{% for item in seq %}`
    LoopStart,
    /// `{% endfor %}`
    LoopEnd,
    /// `{# ... #}`
    Comment,
}

/// One lexical unit of a template.
///
/// Nesting is implicit: the stream is flat and block structure is
/// recovered by matching start/end kinds at equal depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source slice, delimiters and escapes included
    pub raw: String,
    /// Trimmed payload: the expression for `VarRef`/`CondStart`/`CondElif`,
    /// the full header for `LoopStart`, empty otherwise
    pub expr: String,
    /// 1-based line of the token's first character
    pub line: usize,
    /// 1-based column of the token's first character
    pub column: usize,
}

/// Is `c` the second character of a delimiter opener (`{{`, `{%`, `{#`)?
fn opener_second(c: char) -> bool {
    matches!(c, '{' | '%' | '#')
}

/// The closer characters matching an opener's second character.
fn closer_for(second: char) -> (char, char) {
    match second {
        '{' => ('}', '}'),
        '%' => ('%', '}'),
        _ => ('#', '}'),
    }
}

/// Tokenize template source into a flat stream.
///
/// # Errors
///
/// Returns [`GuidegenError::TemplateSyntax`] for an unterminated delimiter,
/// an empty or unknown control tag, or an empty variable tag. The error
/// references the 1-based line and column of the offending opener.
pub fn tokenize(source: &str) -> Result<Vec<Token>, GuidegenError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    // Pending text run
    let mut text = String::new();
    let mut text_line = 1;
    let mut text_column = 1;

    let advance = |c: char, line: &mut usize, column: &mut usize| {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    };

    let flush_text =
        |text: &mut String, tokens: &mut Vec<Token>, text_line: usize, text_column: usize| {
            if !text.is_empty() {
                tokens.push(Token {
                    kind: TokenKind::Text,
                    raw: std::mem::take(text),
                    expr: String::new(),
                    line: text_line,
                    column: text_column,
                });
            }
        };

    while i < chars.len() {
        let c = chars[i];

        // Escaped opener: keep the backslash in raw, consume all three chars
        if c == '\\' && i + 2 < chars.len() && chars[i + 1] == '{' && opener_second(chars[i + 2]) {
            if text.is_empty() {
                text_line = line;
                text_column = column;
            }
            text.push(chars[i]);
            text.push(chars[i + 1]);
            text.push(chars[i + 2]);
            for k in 0..3 {
                advance(chars[i + k], &mut line, &mut column);
            }
            i += 3;
            continue;
        }

        // Delimiter opener
        if c == '{' && i + 1 < chars.len() && opener_second(chars[i + 1]) {
            flush_text(&mut text, &mut tokens, text_line, text_column);

            let tag_line = line;
            let tag_column = column;
            let second = chars[i + 1];
            let (c1, c2) = closer_for(second);

            // Consume opener
            advance(chars[i], &mut line, &mut column);
            advance(chars[i + 1], &mut line, &mut column);
            let mut j = i + 2;

            // Scan for the matching two-character closer
            let mut end = None;
            while j < chars.len() {
                if chars[j] == c1 && j + 1 < chars.len() && chars[j + 1] == c2 {
                    end = Some(j);
                    break;
                }
                advance(chars[j], &mut line, &mut column);
                j += 1;
            }

            let Some(end) = end else {
                let what = match second {
                    '{' => "variable",
                    '%' => "control",
                    _ => "comment",
                };
                return Err(GuidegenError::TemplateSyntax {
                    message: format!("unterminated {what} tag"),
                    line: tag_line,
                    column: tag_column,
                });
            };

            // Consume closer
            advance(chars[end], &mut line, &mut column);
            advance(chars[end + 1], &mut line, &mut column);

            let raw: String = chars[i..end + 2].iter().collect();
            let inner: String = chars[i + 2..end].iter().collect();
            let inner = inner.trim().to_string();
            i = end + 2;

            let token = match second {
                '#' => Token {
                    kind: TokenKind::Comment,
                    raw,
                    expr: String::new(),
                    line: tag_line,
                    column: tag_column,
                },
                '{' => {
                    if inner.is_empty() {
                        return Err(GuidegenError::TemplateSyntax {
                            message: "empty variable tag".to_string(),
                            line: tag_line,
                            column: tag_column,
                        });
                    }
                    Token {
                        kind: TokenKind::VarRef,
                        raw,
                        expr: inner,
                        line: tag_line,
                        column: tag_column,
                    }
                }
                _ => classify_control(raw, inner, tag_line, tag_column)?,
            };
            tokens.push(token);
            continue;
        }

        // Plain text
        if text.is_empty() {
            text_line = line;
            text_column = column;
        }
        text.push(c);
        advance(c, &mut line, &mut column);
        i += 1;
    }

    flush_text(&mut text, &mut tokens, text_line, text_column);
    Ok(tokens)
}

/// Classify the payload of a `{% %}` tag.
fn classify_control(
    raw: String,
    inner: String,
    line: usize,
    column: usize,
) -> Result<Token, GuidegenError> {
    let syntax_err = |message: String| GuidegenError::TemplateSyntax {
        message,
        line,
        column,
    };

    let mut words = inner.split_whitespace();
    let Some(keyword) = words.next() else {
        return Err(syntax_err("empty control tag".to_string()));
    };
    let rest = inner[keyword.len()..].trim().to_string();

    let (kind, expr) = match keyword {
        "if" => {
            if rest.is_empty() {
                return Err(syntax_err("'if' tag requires an expression".to_string()));
            }
            (TokenKind::CondStart, rest)
        }
        "elif" => {
            if rest.is_empty() {
                return Err(syntax_err("'elif' tag requires an expression".to_string()));
            }
            (TokenKind::CondElif, rest)
        }
        "else" => {
            if !rest.is_empty() {
                return Err(syntax_err("'else' tag takes no expression".to_string()));
            }
            (TokenKind::CondElse, String::new())
        }
        "endif" => {
            if !rest.is_empty() {
                return Err(syntax_err("'endif' tag takes no expression".to_string()));
            }
            (TokenKind::CondEnd, String::new())
        }
        "for" => {
            if rest.is_empty() {
                return Err(syntax_err("'for' tag requires a loop header".to_string()));
            }
            (TokenKind::LoopStart, rest)
        }
        "endfor" => {
            if !rest.is_empty() {
                return Err(syntax_err("'endfor' tag takes no expression".to_string()));
            }
            (TokenKind::LoopEnd, String::new())
        }
        other => {
            return Err(syntax_err(format!("unknown control tag '{other}'")));
        }
    };

    Ok(Token {
        kind,
        raw,
        expr,
        line,
        column,
    })
}

/// Convert a `Text` token's raw form to output text by dropping the
/// backslash from escaped delimiter openers.
pub(crate) fn unescape_text(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\'
            && i + 2 < chars.len()
            && chars[i + 1] == '{'
            && opener_second(chars[i + 2])
        {
            out.push(chars[i + 1]);
            out.push(chars[i + 2]);
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
