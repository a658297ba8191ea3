/// Join the configured host and an API path into one absolute URL
///
/// Tolerates a missing scheme (defaults to `http`), a repeated scheme prefix
/// and redundant or missing slashes on either side. The query string is kept
/// as given.
pub fn build_url(host: &str, path: &str) -> String {
    let mut rest = host.trim();
    let mut scheme = None;
    while let Some((prefix, tail)) = rest.split_once("://") {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            break;
        }
        scheme.get_or_insert(prefix);
        rest = tail;
    }

    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let joined = rest
        .split('/')
        .chain(path.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let mut url = format!("{}://{}", scheme.unwrap_or("http"), joined);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_join() {
        assert_eq!(
            build_url("http://mealie.local", "/api/groups/self"),
            "http://mealie.local/api/groups/self"
        );
    }

    #[test]
    fn test_redundant_slashes() {
        assert_eq!(
            build_url("http://mealie.local:9000//", "//api//groups/self"),
            "http://mealie.local:9000/api/groups/self"
        );
        assert_eq!(
            build_url("https://mealie.local/mealie/", "api/groups/self"),
            "https://mealie.local/mealie/api/groups/self"
        );
    }

    #[test]
    fn test_scheme_handling() {
        assert_eq!(
            build_url("mealie.local", "/api/groups/self"),
            "http://mealie.local/api/groups/self"
        );
        assert_eq!(
            build_url("http://http://mealie.local", "/api/groups/self"),
            "http://mealie.local/api/groups/self"
        );
        assert_eq!(
            build_url(" https://mealie.local ", "/api"),
            "https://mealie.local/api"
        );
    }

    #[test]
    fn test_query_is_untouched() {
        assert_eq!(
            build_url(
                "http://mealie.local/",
                "/api/groups/shopping/items?queryFilter=shoppingListId=abc&page=1"
            ),
            "http://mealie.local/api/groups/shopping/items?queryFilter=shoppingListId=abc&page=1"
        );
    }
}
