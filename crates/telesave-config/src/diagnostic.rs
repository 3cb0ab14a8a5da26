// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Telesave reports four kinds of configuration problem: a key it does not
//! know (with a "did you mean" hint), a value of the wrong type, a value
//! that parses but fails validation, and missing service credentials.
//! Parse failures point into the TOML file that caused them when it can be
//! found.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a known key needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(code(telesave::config::unknown_key))]
    UnknownKey {
        key: String,
        /// `[telegram]`, `[sync]`, ... or `the top level`.
        section: String,
        suggestion: Option<String>,
        #[help]
        help: String,
        #[label("not a telesave setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}, expected {expected}")]
    #[diagnostic(code(telesave::config::invalid_type))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("{message}")]
    #[diagnostic(code(telesave::config::validation))]
    Validation { message: String },

    /// Raised by the sync command only; `log` and `scan` run without a token.
    #[error("no Telegram bot token configured")]
    #[diagnostic(
        code(telesave::config::missing_credentials),
        help("set `bot_token` under [telegram], or export TELEGRAM_BOT_TOKEN")
    )]
    MissingCredentials,

    #[error("{0}")]
    #[diagnostic(code(telesave::config::other))]
    Other(String),
}

/// Where a parse error points: the file it came from and the byte span of
/// the offending key, when both can be found.
type Location = (Option<SourceSpan>, Option<NamedSource<String>>);

/// Turns a figment extraction failure into telesave diagnostics.
///
/// `toml_sources` holds `(path, content)` for every file that took part in
/// loading; it is only used to attach source spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let parents: Vec<String> = error.path.iter().map(|p| p.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(key, known) => {
                    let section = parents.first().map(String::as_str);
                    let suggestion = suggest_key(key, known);
                    let (span, src) = locate(&error, section, key, toml_sources);
                    ConfigError::UnknownKey {
                        key: key.clone(),
                        section: section_label(section),
                        help: unknown_key_help(suggestion.as_deref(), section, known),
                        suggestion,
                        span,
                        src,
                    }
                }
                Kind::InvalidType(found, expected) => {
                    let (section, key) = match parents.split_last() {
                        Some((key, rest)) => (rest.first().map(String::as_str), key.as_str()),
                        None => (None, ""),
                    };
                    let (span, src) = locate(&error, section, key, toml_sources);
                    ConfigError::InvalidType {
                        key: parents.join("."),
                        found: found.to_string(),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn section_label(section: Option<&str>) -> String {
    match section {
        Some(name) => format!("[{name}]"),
        None => "the top level".to_string(),
    }
}

fn unknown_key_help(suggestion: Option<&str>, section: Option<&str>, known: &[&str]) -> String {
    match suggestion {
        Some(fix) => format!("did you mean `{fix}`?"),
        None => format!("{} accepts: {}", section_label(section), known.join(", ")),
    }
}

/// Picks the TOML file the error came from and finds the key inside it.
fn locate(
    error: &figment::error::Error,
    section: Option<&str>,
    key: &str,
    toml_sources: &[(String, String)],
) -> Location {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let file = match origin {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        // Inline strings carry no path; a single candidate is unambiguous.
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    file.and_then(|(path, content)| {
        let span = key_span(content, section, key)?;
        Some((Some(span), Some(NamedSource::new(path, content.clone()))))
    })
    .unwrap_or((None, None))
}

/// Byte span of `key` inside `[section]` (or before any header when
/// `section` is `None`). A top-level key may also be a table header, as in
/// a misspelled `[synk]`.
pub fn key_span(content: &str, section: Option<&str>, key: &str) -> Option<SourceSpan> {
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(header) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .map(|(name, _)| name.trim())
        {
            if section.is_none() && header == key {
                let at = offset + indent + trimmed.find(key).unwrap_or(1);
                return Some(SourceSpan::new(at.into(), key.len()));
            }
            current = Some(header);
        } else if current == section && assigns(trimmed, key) {
            return Some(SourceSpan::new((offset + indent).into(), key.len()));
        }

        offset += line.len();
    }
    None
}

/// Whether `line` is `key = ...`, allowing whitespace before the `=`.
fn assigns(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

/// The closest known key to `unknown`, if any is close enough.
pub fn suggest_key(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Prints every diagnostic to stderr, followed by a one-line count.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
    if errors.len() > 1 {
        eprintln!("{} configuration problems found", errors.len());
    }
}
