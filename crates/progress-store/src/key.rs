//! Canonical item identity

/// Build the canonical dedupe key for an item.
///
/// Pure and order-independent: the same item id yields the same key no
/// matter which list page or container surfaced it, so the cheap
/// list-level check and the post-navigation canonical check go through
/// this one function. The container only matters for items whose own id
/// is missing.
pub fn dedupe_key(item_id: &str, container_id: Option<&str>) -> String {
    let id = item_id.trim();
    if !id.is_empty() {
        return format!("item:{id}");
    }
    match container_id.map(str::trim) {
        Some(container) if !container.is_empty() => format!("container:{container}"),
        _ => "item:unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_is_ignored_when_id_present() {
        assert_eq!(
            dedupe_key("n42", Some("results-page-1")),
            dedupe_key("n42", Some("results-page-9")),
        );
        assert_eq!(dedupe_key("n42", None), "item:n42");
    }

    #[test]
    fn whitespace_ids_normalize() {
        assert_eq!(dedupe_key("  n42 ", None), "item:n42");
    }

    #[test]
    fn missing_id_falls_back_to_container() {
        assert_eq!(dedupe_key("", Some("grid-3")), "container:grid-3");
        assert_eq!(dedupe_key("", None), "item:unknown");
    }
}
