//! Ordered degradation path across providers.

/// Builds the chain of providers tried for one call.
///
/// A provider found in `list` at index `i` gets `list[i..]`; any other
/// provider is tried first and then followed by the whole list. Later
/// duplicates in `list` are kept as they are.
///
/// # Examples
///
/// ```
/// use dialecta_llm::fallback::effective_chain;
///
/// let list = ["a", "b", "c"].map(String::from);
/// assert_eq!(effective_chain("b", &list), ["b", "c"]);
/// assert_eq!(effective_chain("x", &list), ["x", "a", "b", "c"]);
/// ```
pub fn effective_chain(start: &str, list: &[String]) -> Vec<String> {
    match list.iter().position(|provider| provider == start) {
        Some(index) => list[index..].to_vec(),
        None => std::iter::once(start.to_string())
            .chain(list.iter().cloned())
            .collect(),
    }
}
