//! Load scheduling
//!
//! Orders scenarios into chunks so whatever the user is looking at gets
//! resolved first.

use shotdiff_common::ScenarioKey;
use tracing::debug;

/// What the user is currently viewing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeepLink {
    #[default]
    None,
    /// A whole context; `None` is the root context
    Context(Option<String>),
    Scenario {
        context: Option<String>,
        name: String,
    },
}

/// Literal context segment naming the root context
const ROOT_CONTEXT_SEGMENT: &str = "null";

impl DeepLink {
    pub fn scenario(name: impl Into<String>, context: Option<&str>) -> Self {
        DeepLink::Scenario {
            context: context.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn context(context: Option<&str>) -> Self {
        DeepLink::Context(context.map(str::to_string))
    }

    /// Parse a navigation path:
    /// `/contexts/:context/scenarios/:scenario[/view]` or `/contexts/:context`.
    /// Anything else is no deep link.
    pub fn from_path(path: &str) -> Self {
        let segments: Vec<String> = path
            .split('?')
            .next()
            .unwrap_or("")
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match segments.as_slice() {
            ["contexts", context] => DeepLink::Context(context_param(context)),
            ["contexts", context, "scenarios", name] | ["contexts", context, "scenarios", name, "view"] => {
                DeepLink::Scenario {
                    context: context_param(context),
                    name: name.to_string(),
                }
            }
            _ => DeepLink::None,
        }
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn context_param(segment: &str) -> Option<String> {
    if segment == ROOT_CONTEXT_SEGMENT {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Order `keys` into resolve chunks.
///
/// A linked scenario forms its own first chunk; a linked context's scenarios
/// come before all others. Relative registration order is kept within each
/// group. A link to something that does not exist yields plain chunking.
pub fn schedule(keys: &[ScenarioKey], deep_link: &DeepLink, chunk_size: Option<usize>) -> Vec<Vec<ScenarioKey>> {
    match deep_link {
        DeepLink::None => chunk(keys.to_vec(), chunk_size),
        DeepLink::Scenario { context, name } => {
            let Some(target) = keys.iter().find(|k| k.matches(name, context.as_deref())) else {
                debug!("Deep-linked scenario {:?} in {:?} not found", name, context);
                return chunk(keys.to_vec(), chunk_size);
            };
            let rest = keys.iter().filter(|k| *k != target).cloned().collect();
            let mut chunks = vec![vec![target.clone()]];
            chunks.extend(chunk(rest, chunk_size));
            chunks
        }
        DeepLink::Context(context) => {
            let (linked, rest): (Vec<ScenarioKey>, Vec<ScenarioKey>) =
                keys.iter().cloned().partition(|k| k.context == *context);
            let mut chunks = chunk(linked, chunk_size);
            chunks.extend(chunk(rest, chunk_size));
            chunks
        }
    }
}

fn chunk(keys: Vec<ScenarioKey>, chunk_size: Option<usize>) -> Vec<Vec<ScenarioKey>> {
    if keys.is_empty() {
        return Vec::new();
    }
    match chunk_size {
        Some(size) if size > 0 && size < keys.len() => keys.chunks(size).map(<[ScenarioKey]>::to_vec).collect(),
        _ => vec![keys],
    }
}
