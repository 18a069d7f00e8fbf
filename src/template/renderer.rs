//! Template renderer.
//!
//! Walks a flat token stream with an explicit block stack instead of
//! native recursion, so the nesting limit is enforced structurally and
//! exceeding it is a reported syntax error rather than a crash.
//!
//! Rendering is forgiving where the tokenizer is strict: a missing
//! variable substitutes the empty string and records a warning, and a
//! `for` over a non-array records a warning and renders nothing. Only
//! structural problems (unmatched tags, depth overflow) abort a render.

use std::collections::HashMap;
use std::time::Instant;

use crate::constants::MAX_BLOCK_DEPTH;
use crate::core::{ErrorCategory, GuidegenError};
use crate::template::expr::{self, Expr, RenderWarning};
use crate::template::token::{Token, TokenKind, unescape_text};
use crate::template::value::{Value, VariableContext};

/// The output of one render pass.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Rendered text
    pub content: String,
    /// Wall-clock render time in microseconds
    pub render_time_micros: u64,
    /// Non-fatal problems accumulated across the pass
    pub warnings: Vec<RenderWarning>,
}

/// A conditional block: its `elif`/`else` branch token indices in source
/// order, and the index of the matching `endif`.
#[derive(Debug)]
struct CondBlock {
    branches: Vec<usize>,
    end: usize,
}

/// Structural index over a token stream, built once per parse.
///
/// Maps every block-opening token to its branches and end, and every
/// branch token to the end of its block, so the renderer can jump in
/// O(1) while skipping untaken branches.
#[derive(Debug, Default)]
pub(crate) struct BlockIndex {
    cond: HashMap<usize, CondBlock>,
    loops: HashMap<usize, usize>,
    branch_end: HashMap<usize, usize>,
}

enum OpenBlock {
    Cond {
        start: usize,
        branches: Vec<usize>,
        saw_else: bool,
    },
    Loop {
        start: usize,
    },
}

/// Match block start/end pairs and check nesting depth.
///
/// # Errors
///
/// Returns a syntax error for an `elif`/`else`/`endif` without an open
/// `if`, an `endfor` without an open `for`, a branch after `else`, an
/// unclosed block at end of input, or nesting deeper than
/// [`MAX_BLOCK_DEPTH`].
pub(crate) fn build_block_index(tokens: &[Token]) -> Result<BlockIndex, GuidegenError> {
    let mut index = BlockIndex::default();
    let mut stack: Vec<OpenBlock> = Vec::new();

    let syntax_err = |message: String, token: &Token| GuidegenError::TemplateSyntax {
        message,
        line: token.line,
        column: token.column,
    };

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::CondStart => {
                stack.push(OpenBlock::Cond {
                    start: i,
                    branches: Vec::new(),
                    saw_else: false,
                });
            }
            TokenKind::LoopStart => {
                stack.push(OpenBlock::Loop { start: i });
            }
            TokenKind::CondElif | TokenKind::CondElse => {
                let name = if token.kind == TokenKind::CondElif {
                    "elif"
                } else {
                    "else"
                };
                match stack.last_mut() {
                    Some(OpenBlock::Cond {
                        branches, saw_else, ..
                    }) => {
                        if *saw_else {
                            return Err(syntax_err(
                                format!("'{name}' after 'else' in the same block"),
                                token,
                            ));
                        }
                        if token.kind == TokenKind::CondElse {
                            *saw_else = true;
                        }
                        branches.push(i);
                    }
                    _ => {
                        return Err(syntax_err(
                            format!("'{name}' without a matching 'if'"),
                            token,
                        ));
                    }
                }
            }
            TokenKind::CondEnd => match stack.pop() {
                Some(OpenBlock::Cond { start, branches, .. }) => {
                    for &b in &branches {
                        index.branch_end.insert(b, i);
                    }
                    index.cond.insert(start, CondBlock { branches, end: i });
                }
                _ => {
                    return Err(syntax_err("'endif' without a matching 'if'".to_string(), token));
                }
            },
            TokenKind::LoopEnd => match stack.pop() {
                Some(OpenBlock::Loop { start }) => {
                    index.loops.insert(start, i);
                }
                _ => {
                    return Err(syntax_err(
                        "'endfor' without a matching 'for'".to_string(),
                        token,
                    ));
                }
            },
            TokenKind::Text | TokenKind::VarRef | TokenKind::Comment => {}
        }

        if stack.len() > MAX_BLOCK_DEPTH {
            return Err(GuidegenError::DepthExceeded {
                max: MAX_BLOCK_DEPTH,
                line: token.line,
            });
        }
    }

    if let Some(open) = stack.last() {
        let (what, at) = match open {
            OpenBlock::Cond { start, .. } => ("'if' block is never closed (missing 'endif')", start),
            OpenBlock::Loop { start } => ("'for' block is never closed (missing 'endfor')", start),
        };
        let token = &tokens[*at];
        return Err(GuidegenError::TemplateSyntax {
            message: what.to_string(),
            line: token.line,
            column: token.column,
        });
    }

    Ok(index)
}

/// State for one active loop.
struct LoopFrame {
    start: usize,
    end: usize,
    var: String,
    items: Vec<Value>,
    index: usize,
}

/// Render a token stream against a variable context.
///
/// Expressions are parsed lazily per token and memoized for the pass, so
/// a loop body pays the parse cost once regardless of iteration count.
pub fn render(tokens: &[Token], ctx: &VariableContext) -> Result<RenderResult, GuidegenError> {
    let started = Instant::now();
    let index = build_block_index(tokens)?;

    let mut out = String::new();
    let mut warnings: Vec<RenderWarning> = Vec::new();
    let mut scopes = ctx.clone();
    let mut loop_stack: Vec<LoopFrame> = Vec::new();
    let mut parsed: HashMap<usize, Expr> = HashMap::new();
    let mut pc = 0;

    // Parse the expression attached to token `i`, caching the tree.
    fn expr_for<'a>(
        parsed: &'a mut HashMap<usize, Expr>,
        tokens: &[Token],
        i: usize,
    ) -> Result<&'a Expr, GuidegenError> {
        if !parsed.contains_key(&i) {
            let expr = expr::parse_expression(&tokens[i].expr)?;
            parsed.insert(i, expr);
        }
        Ok(&parsed[&i])
    }

    while pc < tokens.len() {
        let token = &tokens[pc];
        match token.kind {
            TokenKind::Text => {
                out.push_str(&unescape_text(&token.raw));
                pc += 1;
            }
            TokenKind::Comment => {
                pc += 1;
            }
            TokenKind::VarRef => {
                let expr = expr_for(&mut parsed, tokens, pc)?;
                let before = warnings.len();
                let value = expr::evaluate(expr, &scopes, &mut warnings);
                for w in &mut warnings[before..] {
                    w.line = Some(token.line);
                    w.column = Some(token.column);
                }
                out.push_str(&value.display_string());
                pc += 1;
            }
            TokenKind::CondStart => {
                let expr = expr_for(&mut parsed, tokens, pc)?;
                let truthy = expr::evaluate(expr, &scopes, &mut warnings).is_truthy();
                if truthy {
                    pc += 1;
                } else {
                    pc = select_branch(tokens, &index, pc, &scopes, &mut parsed, &mut warnings)?;
                }
            }
            TokenKind::CondElif | TokenKind::CondElse => {
                // Reached linearly after a taken branch: jump past the block
                let end = index.branch_end[&pc];
                pc = end + 1;
            }
            TokenKind::CondEnd => {
                pc += 1;
            }
            TokenKind::LoopStart => {
                let end = index.loops[&pc];
                let (var, seq_expr) = expr::parse_loop_header(&token.expr)?;
                let seq = expr::evaluate(&seq_expr, &scopes, &mut warnings);
                let items = match seq {
                    Value::Array(items) => items,
                    other => {
                        warnings.push(
                            RenderWarning::new(
                                ErrorCategory::Validation,
                                format!(
                                    "'for {var}' subject is {}, not an array; treated as empty",
                                    other.type_name()
                                ),
                            )
                            .at(token.line, token.column),
                        );
                        Vec::new()
                    }
                };
                if items.is_empty() {
                    pc = end + 1;
                } else {
                    scopes.push_scope();
                    scopes.insert(var.clone(), items[0].clone());
                    loop_stack.push(LoopFrame {
                        start: pc,
                        end,
                        var,
                        items,
                        index: 0,
                    });
                    pc += 1;
                }
            }
            TokenKind::LoopEnd => {
                let frame = loop_stack
                    .last_mut()
                    .expect("loop stack mirrors block index");
                frame.index += 1;
                if frame.index < frame.items.len() {
                    scopes.insert(frame.var.clone(), frame.items[frame.index].clone());
                    pc = frame.start + 1;
                } else {
                    scopes.pop_scope();
                    pc = frame.end + 1;
                    loop_stack.pop();
                }
            }
        }
    }

    tracing::debug!(
        warnings = warnings.len(),
        micros = started.elapsed().as_micros() as u64,
        "render pass complete"
    );

    Ok(RenderResult {
        content: out,
        render_time_micros: started.elapsed().as_micros() as u64,
        warnings,
    })
}

/// Given a false `if` at `start`, pick the next program counter: the token
/// after the first true `elif`, after the `else`, or after the `endif`.
fn select_branch(
    tokens: &[Token],
    index: &BlockIndex,
    start: usize,
    scopes: &VariableContext,
    parsed: &mut HashMap<usize, Expr>,
    warnings: &mut Vec<RenderWarning>,
) -> Result<usize, GuidegenError> {
    let block = &index.cond[&start];
    for &b in &block.branches {
        match tokens[b].kind {
            TokenKind::CondElif => {
                if !parsed.contains_key(&b) {
                    let expr = expr::parse_expression(&tokens[b].expr)?;
                    parsed.insert(b, expr);
                }
                if expr::evaluate(&parsed[&b], scopes, warnings).is_truthy() {
                    return Ok(b + 1);
                }
            }
            TokenKind::CondElse => return Ok(b + 1),
            _ => unreachable!("branch list only holds elif/else"),
        }
    }
    Ok(block.end + 1)
}
