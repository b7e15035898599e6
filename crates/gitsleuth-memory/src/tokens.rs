/// Rough token estimate: whitespace-separated word count.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Render the newest lines that fit in `max_tokens`, emitted oldest first.
///
/// Walks `lines` from the end, stopping at the first line whose estimate
/// would push the running total past the budget. Output lines are joined by `\n`.
#[must_use]
pub fn window_lines<I>(lines: I, max_tokens: usize) -> String
where
    I: DoubleEndedIterator<Item = String>,
{
    let mut kept = Vec::new();
    let mut used = 0usize;
    for line in lines.rev() {
        let cost = estimate_tokens(&line);
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        kept.push(line);
    }
    kept.reverse();
    kept.join("\n")
}
