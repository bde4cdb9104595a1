use thiserror::Error;

use crate::model::{Symbol, WeightedTree, WeightedTreeSet};

/// Element holding every stack when stacks are not grouped by first frame.
pub const DEFAULT_ELEMENT: &str = "all";

#[derive(Debug, Error)]
pub enum CollapsedParseError {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("no valid stack lines found")]
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollapsedOptions {
    /// Use the first frame of every stack as its grouping element (the
    /// process or thread name most collapsers emit there).
    pub group_by_first_frame: bool,
}

/// Parse Brendan Gregg's collapsed/folded stack format into weighted trees.
///
/// Each line has the format: `stack_frame;stack_frame;... count`
/// where frames are separated by `;` and the count is the last whitespace-separated token.
/// A missing or unparsable count counts as one sample. Identical paths are merged.
///
/// Used by: `perf script | stackcollapse-perf.pl`, dtrace, FlameGraph tools.
pub fn parse_collapsed(
    data: &[u8],
    options: &CollapsedOptions,
) -> Result<WeightedTreeSet<Symbol, Symbol>, CollapsedParseError> {
    let text = std::str::from_utf8(data)?;
    let mut set = WeightedTreeSet::new();
    let mut samples = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split into stack and count: "a;b;c 42"
        let (stack, count) = match line.rsplit_once(char::is_whitespace) {
            Some((stack, count)) => match count.parse::<i64>() {
                Ok(count) => (stack.trim(), count),
                Err(_) => (line, 1),
            },
            None => (line, 1),
        };

        let mut frames = stack.split(';').map(str::trim).filter(|f| !f.is_empty());
        let element = if options.group_by_first_frame {
            match frames.next() {
                Some(first) => Symbol::from(first),
                None => continue,
            }
        } else {
            Symbol::new(DEFAULT_ELEMENT)
        };

        let frames: Vec<&str> = frames.collect();
        let Some(root) = frames
            .iter()
            .rev()
            .fold(None, |inner: Option<WeightedTree<Symbol>>, name| {
                let node = WeightedTree::new(Symbol::from(*name), count);
                Some(match inner {
                    Some(child) => node.with_child(child),
                    None => node,
                })
            })
        else {
            set.add_element(element, None);
            continue;
        };
        set.add_weighted_tree(&element, root);
        samples += 1;
    }

    if samples == 0 {
        return Err(CollapsedParseError::Empty);
    }
    Ok(set)
}
