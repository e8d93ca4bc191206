//! Scraping of the PyPI search results page

use std::sync::OnceLock;

use regex::Regex;

use crate::pypi::types::{SearchHit, SearchResult};
use crate::pypi::utils::unescape_html;

struct SnippetPatterns {
    snippet: Regex,
    name: Regex,
    version: Regex,
    description: Regex,
    tags: Regex,
}

fn patterns() -> &'static SnippetPatterns {
    static PATTERNS: OnceLock<SnippetPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let span = |class: &str| {
            Regex::new(&format!(
                r#"(?s)<[a-z0-9]+[^>]*class="{}"[^>]*>(.*?)</[a-z0-9]+>"#,
                class
            ))
            .expect("snippet field pattern is valid")
        };
        SnippetPatterns {
            snippet: Regex::new(r#"(?s)<a[^>]*class="package-snippet"[^>]*>(.*?)</a>"#)
                .expect("snippet pattern is valid"),
            name: span("package-snippet__name"),
            version: span("package-snippet__version"),
            description: span("package-snippet__description"),
            tags: Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"),
        }
    })
}

fn field_text(re: &Regex, html: &str) -> Option<String> {
    let inner = re.captures(html)?.get(1)?.as_str();
    let stripped = patterns().tags.replace_all(inner, "");
    Some(unescape_html(stripped.trim()))
}

/// Extract package hits from a search results page
pub fn parse_search_page(html: &str, pypi_url: &str, search_url: &str) -> SearchResult {
    if html.contains("Client Challenge") {
        tracing::warn!("PyPI returned a challenge page instead of search results");
        return SearchResult {
            search_url: search_url.to_string(),
            results: Vec::new(),
            message: Some(
                "PyPI returned a security challenge page. Try searching PyPI in a web browser."
                    .to_string(),
            ),
        };
    }

    let p = patterns();
    let results: Vec<SearchHit> = p
        .snippet
        .captures_iter(html)
        .filter_map(|caps| {
            let body = caps.get(1)?.as_str();
            let name = field_text(&p.name, body)?;
            let version = field_text(&p.version, body)?;
            let description = field_text(&p.description, body).unwrap_or_default();
            Some(SearchHit {
                url: format!("{}/project/{}/", pypi_url, name),
                name,
                version,
                description,
            })
        })
        .collect();

    let message = results
        .is_empty()
        .then(|| "No packages found or PyPI search page format has changed".to_string());

    SearchResult {
        search_url: search_url.to_string(),
        results,
        message,
    }
}
