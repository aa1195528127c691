use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::LogMetadata;

/// Values a log message template and entry metadata are built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    /// Fills `{name}`
    pub name: Option<String>,
    /// Fills `{count}`
    pub count: Option<i64>,
    /// Noun pluralized with the count, e.g. `table` renders `3 tables`
    pub noun: Option<String>,
    pub metadata: LogMetadata,
}

impl LogContext {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_count(mut self, count: i64, noun: impl Into<String>) -> Self {
        self.count = Some(count);
        self.noun = Some(noun.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: LogMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{(name|count)\}").expect("Invalid regex"))
}

/// Substitute `{name}` and `{count}` in a template.
///
/// Unknown tokens are left alone; a missing name renders empty and a missing
/// count renders as zero.
pub fn format_message(template: &str, context: &LogContext) -> String {
    let rendered = token_pattern().replace_all(template, |caps: &Captures<'_>| match &caps[1] {
        "name" => context.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
        _ => {
            let count = context.count.unwrap_or_default();
            context
                .noun
                .as_deref()
                .map_or_else(|| count.to_string(), |noun| pluralize(count, noun))
        }
    });
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `1 table`, `3 tables`, `2 categories`
pub fn pluralize(count: i64, noun: &str) -> String {
    if count == 1 {
        return format!("{count} {noun}");
    }

    let plural = if let Some(stem) = noun.strip_suffix('y') {
        if stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            format!("{noun}s")
        } else {
            format!("{stem}ies")
        }
    } else if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| noun.ends_with(suffix))
    {
        format!("{noun}es")
    } else {
        format!("{noun}s")
    };
    format!("{count} {plural}")
}
