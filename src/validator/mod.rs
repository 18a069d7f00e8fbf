//! Static template validation.
//!
//! Checks a template for well-formedness before any filesystem mutation:
//! tag balance, expression syntax, and variable/configuration
//! consistency. Validation never evaluates expressions against real data
//! and never touches the filesystem.
//!
//! The report has three sections (syntax, configuration, files); a
//! template is valid only if all three are. Errors are collected rather
//! than returned at the first failure, so a report lists everything a
//! user needs to fix in one pass.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::{ErrorCategory, ErrorSeverity, GuidegenError};
use crate::models::{Template, VariableSpec};
use crate::template::expr::{self, Expr};
use crate::template::renderer::build_block_index;
use crate::template::token::{Token, TokenKind, tokenize};
use crate::template::value::{Value, VariableContext};

/// One problem found during validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    /// The template file's declared path, when the issue is file-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl ValidationIssue {
    fn error(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: ErrorSeverity::High,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Validation,
            severity: ErrorSeverity::Low,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    fn for_file(mut self, path: &str) -> Self {
        self.file = Some(path.to_string());
        self
    }

    fn from_template_error(err: &GuidegenError) -> Self {
        let (line, column) = match err {
            GuidegenError::TemplateSyntax { line, column, .. } => (Some(*line), Some(*column)),
            GuidegenError::DepthExceeded { line, .. } => (Some(*line), None),
            _ => (None, None),
        };
        Self {
            category: ErrorCategory::Syntax,
            severity: ErrorSeverity::High,
            message: err.to_string(),
            file: None,
            line,
            column,
        }
    }
}

/// One section of the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSection {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationSection {
    fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

/// Full validation report for one template.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub syntax: ValidationSection,
    pub configuration: ValidationSection,
    pub files: ValidationSection,
    /// All section errors, flattened
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Short human-readable summary of the first error and how many more
    /// there are, for embedding in a fatal error message.
    pub fn summary(&self) -> String {
        match self.errors.as_slice() {
            [] => "no errors".to_string(),
            [first] => first.message.clone(),
            [first, rest @ ..] => format!("{} (and {} more)", first.message, rest.len()),
        }
    }
}

/// Statically validate a template.
///
/// `id` names the template in log output; it does not affect the checks.
pub fn validate_template(template: &Template, id: &str) -> ValidationReport {
    let mut syntax = ValidationSection::default();
    let mut configuration = ValidationSection::default();
    let mut files = ValidationSection::default();

    validate_configuration(template, &mut configuration);

    let schema_names: Option<BTreeSet<String>> = template
        .variables
        .as_ref()
        .map(|vars| vars.iter().map(|v| v.name.clone()).collect());

    if template.files.is_empty() {
        files.errors.push(ValidationIssue::error(
            ErrorCategory::Validation,
            "template defines no output files",
        ));
    }

    for file in &template.files {
        // Content: tokenization, balance, and expression syntax
        match tokenize(&file.content) {
            Ok(tokens) => {
                if let Err(err) = build_block_index(&tokens) {
                    syntax
                        .errors
                        .push(ValidationIssue::from_template_error(&err).for_file(&file.path));
                }
                let mut refs = BTreeSet::new();
                collect_stream_refs(&tokens, &mut refs, &mut syntax.errors, &file.path);
                report_unknown_refs(&refs, schema_names.as_ref(), &file.path, &mut files.warnings);
            }
            Err(err) => {
                syntax
                    .errors
                    .push(ValidationIssue::from_template_error(&err).for_file(&file.path));
            }
        }

        // Path: must itself be a valid template
        if file.path.trim().is_empty() {
            files.errors.push(
                ValidationIssue::error(ErrorCategory::Validation, "file has an empty path")
                    .for_file(&file.path),
            );
        } else {
            match tokenize(&file.path) {
                Ok(tokens) => {
                    let mut refs = BTreeSet::new();
                    collect_stream_refs(&tokens, &mut refs, &mut files.errors, &file.path);
                    report_unknown_refs(
                        &refs,
                        schema_names.as_ref(),
                        &file.path,
                        &mut files.warnings,
                    );
                }
                Err(err) => {
                    files
                        .errors
                        .push(ValidationIssue::from_template_error(&err).for_file(&file.path));
                }
            }
        }

        // Condition: a single expression
        if let Some(condition) = &file.condition {
            match expr::parse_expression(condition) {
                Ok(parsed) => {
                    let mut refs = BTreeSet::new();
                    expr::collect_roots(&parsed, &mut refs);
                    report_unknown_refs(
                        &refs,
                        schema_names.as_ref(),
                        &file.path,
                        &mut files.warnings,
                    );
                }
                Err(err) => {
                    files
                        .errors
                        .push(ValidationIssue::from_template_error(&err).for_file(&file.path));
                }
            }
        }
    }

    let syntax = syntax.finish();
    let configuration = configuration.finish();
    let files = files.finish();

    let mut errors = Vec::new();
    errors.extend(syntax.errors.iter().cloned());
    errors.extend(configuration.errors.iter().cloned());
    errors.extend(files.errors.iter().cloned());

    let is_valid = syntax.is_valid && configuration.is_valid && files.is_valid;
    tracing::debug!(
        id,
        valid = is_valid,
        errors = errors.len(),
        "template validation complete"
    );

    ValidationReport {
        is_valid,
        syntax,
        configuration,
        files,
        errors,
    }
}

/// Check that every schema variable marked required is bound in the
/// context. Used by the orchestrator as its pre-mutation gate; kept here
/// so the rule lives with the rest of the schema logic.
pub fn check_required_variables(
    template: &Template,
    variables: &VariableContext,
) -> Vec<ValidationIssue> {
    let Some(specs) = &template.variables else {
        return Vec::new();
    };
    specs
        .iter()
        .filter(|spec| spec.required && spec.default.is_none() && !variables.contains(&spec.name))
        .map(|spec| {
            ValidationIssue::error(
                ErrorCategory::Validation,
                format!("required variable '{}' is not bound", spec.name),
            )
        })
        .collect()
}

fn validate_configuration(template: &Template, section: &mut ValidationSection) {
    if template.name.trim().is_empty() {
        section.errors.push(ValidationIssue::error(
            ErrorCategory::Validation,
            "template name is empty",
        ));
    }

    if let Err(err) = semver::Version::parse(&template.version) {
        section.errors.push(ValidationIssue::error(
            ErrorCategory::Validation,
            format!("template version '{}' is not semver: {err}", template.version),
        ));
    }

    if let Some(vars) = &template.variables {
        let mut seen = BTreeSet::new();
        for spec in vars {
            if !seen.insert(spec.name.as_str()) {
                section.errors.push(ValidationIssue::error(
                    ErrorCategory::Validation,
                    format!("variable '{}' is declared more than once", spec.name),
                ));
            }
            if spec.required && spec.default.is_some() {
                section.warnings.push(ValidationIssue::warning(format!(
                    "variable '{}' is required but has a default; the default wins",
                    spec.name
                )));
            }
        }
        check_circular_defaults(vars, section);
    }
}

/// Detect cycles among string defaults that reference other schema
/// variables (`a` defaults to `"{{b}}"`, `b` defaults to `"{{a}}"`).
fn check_circular_defaults(vars: &[VariableSpec], section: &mut ValidationSection) {
    let names: BTreeSet<&str> = vars.iter().map(|v| v.name.as_str()).collect();
    let mut edges: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

    for spec in vars {
        if let Some(Value::String(default)) = &spec.default {
            let Ok(tokens) = tokenize(default) else {
                // Malformed defaults surface through the render path
                continue;
            };
            let mut refs = BTreeSet::new();
            let mut scratch = Vec::new();
            collect_stream_refs(&tokens, &mut refs, &mut scratch, &spec.name);
            let deps: BTreeSet<String> = refs
                .into_iter()
                .filter(|r| names.contains(r.as_str()))
                .collect();
            if !deps.is_empty() {
                edges.insert(spec.name.as_str(), deps);
            }
        }
    }

    for start in edges.keys() {
        let mut visited = BTreeSet::new();
        let mut stack = vec![(*start).to_string()];
        while let Some(current) = stack.pop() {
            if current == **start && !visited.is_empty() {
                section.errors.push(ValidationIssue::error(
                    ErrorCategory::Validation,
                    format!("circular default-value reference involving '{start}'"),
                ));
                return;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = edges.get(current.as_str()) {
                stack.extend(deps.iter().cloned());
            }
        }
    }
}

/// Walk a token stream, parsing every embedded expression. Parse failures
/// are pushed to `errors`; root variable references (minus loop-bound
/// names) accumulate in `refs`.
fn collect_stream_refs(
    tokens: &[Token],
    refs: &mut BTreeSet<String>,
    errors: &mut Vec<ValidationIssue>,
    file_path: &str,
) {
    let mut bound: Vec<String> = Vec::new();

    fn push_expr_refs(parsed: &Expr, bound: &[String], refs: &mut BTreeSet<String>) {
        let mut roots = BTreeSet::new();
        expr::collect_roots(parsed, &mut roots);
        for root in roots {
            if !bound.iter().any(|b| *b == root) {
                refs.insert(root);
            }
        }
    }

    for token in tokens {
        match token.kind {
            TokenKind::VarRef | TokenKind::CondStart | TokenKind::CondElif => {
                match expr::parse_expression(&token.expr) {
                    Ok(parsed) => push_expr_refs(&parsed, &bound, refs),
                    Err(err) => {
                        let mut issue = ValidationIssue::from_template_error(&err);
                        issue.line = Some(token.line);
                        issue.column = Some(token.column);
                        errors.push(issue.for_file(file_path));
                    }
                }
            }
            TokenKind::LoopStart => match expr::parse_loop_header(&token.expr) {
                Ok((var, seq)) => {
                    push_expr_refs(&seq, &bound, refs);
                    bound.push(var);
                }
                Err(err) => {
                    let mut issue = ValidationIssue::from_template_error(&err);
                    issue.line = Some(token.line);
                    issue.column = Some(token.column);
                    errors.push(issue.for_file(file_path));
                    // Keep depth bookkeeping sane for later endfor tokens
                    bound.push(String::new());
                }
            },
            TokenKind::LoopEnd => {
                bound.pop();
            }
            _ => {}
        }
    }
}

fn report_unknown_refs(
    refs: &BTreeSet<String>,
    schema: Option<&BTreeSet<String>>,
    file_path: &str,
    warnings: &mut Vec<ValidationIssue>,
) {
    let Some(schema) = schema else {
        // No schema declared: dynamic variables are allowed silently
        return;
    };
    for name in refs {
        if !schema.contains(name) {
            warnings.push(
                ValidationIssue::warning(format!(
                    "variable '{name}' is not declared in the template's variable schema"
                ))
                .for_file(file_path),
            );
        }
    }
}
