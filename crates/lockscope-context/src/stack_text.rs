use lockscope_types::{ContextId, ContextInfo, ROOT_CREATOR};

use crate::ContextResolver;
use crate::propagated::current;

const CREATED_BY: &str = "created by ";

/// Something that can dump the calling context's execution state as text.
///
/// The dump starts with a header line whose second word is the numeric
/// context id (`task 7 [running]:`). A spawned context carries a trailer line
/// `created by <creator> in <word> <parent id>`.
pub trait StackSource: Send + Sync + 'static {
    fn capture(&self) -> String;
}

impl<F> StackSource for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn capture(&self) -> String {
        self()
    }
}

/// What could be recovered from a stack dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStack {
    /// `None` if the header is missing or garbled.
    pub id: Option<ContextId>,
    pub parent: Option<ContextId>,
    pub creator: String,
}

/// Parses a textual stack dump. Never fails: anything unreadable degrades
/// to "unknown id" or "root context, no lineage".
pub fn parse_stack_text(raw: &str) -> ParsedStack {
    let id = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .and_then(|header| header.split_whitespace().nth(1))
        .and_then(parse_id);

    let (parent, creator) = match parse_trailer(raw) {
        Some((creator, parent)) => (Some(parent), creator.to_owned()),
        None => (None, ROOT_CREATOR.to_owned()),
    };

    ParsedStack {
        id,
        parent,
        creator,
    }
}

fn parse_trailer(raw: &str) -> Option<(&str, ContextId)> {
    let start = raw.rfind(CREATED_BY)? + CREATED_BY.len();
    let line = raw[start..].lines().next()?;
    let (creator, rest) = line.split_once(" in ")?;
    let creator = creator.trim();
    if creator.is_empty() {
        return None;
    }
    let parent = rest.split_whitespace().last().and_then(parse_id)?;
    Some((creator, parent))
}

fn parse_id(token: &str) -> Option<ContextId> {
    let digits = token.trim_end_matches(|c: char| !c.is_ascii_digit());
    digits.parse::<u64>().ok().and_then(|raw| ContextId::new(raw).ok())
}

/// Resolver for runtimes that only expose a textual dump of the current
/// execution state.
///
/// When the dump has no usable id, the whole propagated identity is used
/// instead. A trailer in such a dump is ignored: lineage always comes from
/// the same source as the id.
pub struct StackText<S> {
    source: S,
}

impl<S: StackSource> StackText<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: StackSource> ContextResolver for StackText<S> {
    fn resolve(&self) -> ContextInfo {
        let raw = self.source.capture();
        let parsed = parse_stack_text(&raw);
        match parsed.id {
            Some(id) => ContextInfo {
                id,
                parent: parsed.parent,
                creator: parsed.creator,
            },
            None => {
                tracing::warn!(
                    header = raw.lines().next().unwrap_or_default(),
                    "stack dump has no readable context id, falling back to propagated identity"
                );
                current()
            }
        }
    }
}
