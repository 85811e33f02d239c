pub fn pluralize(count: u64, singular: &str, plural: Option<&str>) -> String {
    if count == 1 {
        return singular.to_string();
    }

    match plural {
        Some(p) => p.to_string(),
        None => format!("{singular}s"),
    }
}

/// `"3 products"`, `"1 product"`.
pub fn counted(count: u64, singular: &str) -> String {
    format!("{count} {}", pluralize(count, singular, None))
}
