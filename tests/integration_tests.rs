//! Integration tests for PyPI MCP Server
//!
//! These tests verify the PyPI client, vulnerability scanning, the response
//! cache and MCP protocol handling. Upstream services are mocked with mockito.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};

use pypi_mcp_server::cache::{CacheOptions, HybridCache};
use pypi_mcp_server::config::Config;
use pypi_mcp_server::mcp::McpServer;
use pypi_mcp_server::pypi::PypiClient;
use pypi_mcp_server::security::{format_report, SecurityScanner, Severity};

/// Config pointing every endpoint at the mock server
fn config_for(server: &ServerGuard) -> Config {
    let mut config = Config::from_lookup(|_| None)
        .expect("default config")
        .with_base_url(&server.url());
    config.retry_delay = Duration::from_millis(1);
    config.min_request_interval = Duration::ZERO;
    config.max_retries = 2;
    config.disk_cache = false;
    config
}

fn clients(server: &ServerGuard) -> (Arc<PypiClient>, Arc<SecurityScanner>) {
    let config = config_for(server);
    let cache = Arc::new(HybridCache::in_memory(Duration::from_secs(300)));
    let pypi = Arc::new(PypiClient::new(&config, cache).expect("client"));
    let scanner = Arc::new(SecurityScanner::new(pypi.clone(), config.osv_url.clone()));
    (pypi, scanner)
}

/// Minimal `/pypi/{name}/json` document
fn package_doc(name: &str, version: &str, releases: &[&str], requires: &[&str]) -> String {
    let releases: serde_json::Map<String, Value> = releases
        .iter()
        .map(|v| (v.to_string(), json!([])))
        .collect();
    json!({
        "info": {
            "name": name,
            "version": version,
            "summary": format!("{} summary", name),
            "requires_dist": requires,
        },
        "releases": releases,
        "urls": [],
    })
    .to_string()
}

async fn mock_json(server: &mut ServerGuard, path: &str, body: String) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

fn requirements_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write requirements");
    file
}

fn path_of(file: &tempfile::NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

/// Helper to create a JSON-RPC request
fn make_request(id: i64, method: &str, params: Option<Value>) -> String {
    let mut request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(p) = params {
        request["params"] = p;
    }
    request.to_string()
}

async fn rpc(server: &mut McpServer, id: i64, method: &str, params: Option<Value>) -> Value {
    let response = server
        .handle_message(&make_request(id, method, params))
        .await
        .expect("handled")
        .expect("response");
    serde_json::to_value(response).expect("serializable response")
}

/// Decode the JSON text of a tool result
fn tool_json(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("tool output is JSON")
}

mod pypi_client_tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_version_and_sorted_releases() {
        let mut server = Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "/pypi/demo/json",
            package_doc("demo", "2.0", &["1.10", "1.2", "2.0", "2.1rc1", "not-a-version"], &[]),
        )
        .await;
        let (pypi, _) = clients(&server);

        assert_eq!(pypi.get_latest_version("demo").await.unwrap().version, "2.0");
        let releases = pypi.get_package_releases("demo").await.unwrap().releases;
        assert_eq!(releases, vec!["1.2", "1.10", "2.0", "2.1rc1"]);
    }

    #[tokio::test]
    async fn test_missing_package() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/ghost/json")
            .with_status(404)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let err = pypi.get_package_info("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code().as_str(), "not_found");

        let exists = pypi.check_package_exists("ghost").await.unwrap();
        assert!(!exists.exists);
    }

    #[tokio::test]
    async fn test_responses_are_cached() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/pypi/demo/json")
            .with_status(200)
            .with_body(package_doc("demo", "1.0", &["1.0"], &[]))
            .expect(1)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        pypi.get_latest_version("demo").await.unwrap();
        pypi.get_package_releases("demo").await.unwrap();
        m.assert_async().await;
        assert!(pypi.cache().stats().memory_hits >= 1);
    }

    #[tokio::test]
    async fn test_etag_revalidation() {
        let mut server = Server::new_async().await;
        let revalidated = server
            .mock("GET", "/pypi/demo/json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/pypi/demo/json")
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(package_doc("demo", "1.0", &["1.0"], &[]))
            .expect(1)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        assert_eq!(pypi.get_latest_version("demo").await.unwrap().version, "1.0");
        pypi.cache()
            .invalidate(&format!("{}/pypi/demo/json", server.url()));
        assert_eq!(pypi.get_latest_version("demo").await.unwrap().version, "1.0");

        fresh.assert_async().await;
        revalidated.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/pypi/flaky/json")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let err = pypi.get_package_info("flaky").await.unwrap_err();
        assert_eq!(err.code().as_str(), "network_error");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_name_never_hits_network() {
        let server = Server::new_async().await;
        let (pypi, _) = clients(&server);

        let err = pypi.get_package_info("../etc/passwd").await.unwrap_err();
        assert_eq!(err.code().as_str(), "invalid_input");
    }

    #[tokio::test]
    async fn test_dependencies() {
        let mut server = Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "/pypi/web/1.0/json",
            package_doc(
                "web",
                "1.0",
                &[],
                &["idna>=2.5,<4", "PySocks!=1.5.7; extra == \"socks\"", "urllib3[brotli]>=1.21"],
            ),
        )
        .await;
        let (pypi, _) = clients(&server);

        let deps = pypi.get_dependencies("web", Some("1.0")).await.unwrap().dependencies;
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "idna");
        assert!(deps[0].version_spec.contains(">=2.5"));
        assert!(deps[1].marker.as_deref().unwrap().contains("extra"));
        assert_eq!(deps[2].extras, vec!["brotli"]);
    }

    #[tokio::test]
    async fn test_dependency_tree_marks_cycles() {
        let mut server = Server::new_async().await;
        let _a = mock_json(&mut server, "/pypi/alpha/json", package_doc("alpha", "1.0", &["1.0"], &[])).await;
        let _a1 = mock_json(
            &mut server,
            "/pypi/alpha/1.0/json",
            package_doc("alpha", "1.0", &[], &["beta>=1.0", "gamma; extra == \"dev\""]),
        )
        .await;
        let _b = mock_json(
            &mut server,
            "/pypi/beta/json",
            package_doc("beta", "1.1", &["0.9", "1.0", "1.1"], &[]),
        )
        .await;
        let _b1 = mock_json(
            &mut server,
            "/pypi/beta/1.1/json",
            package_doc("beta", "1.1", &[], &["alpha==1.0"]),
        )
        .await;
        let (pypi, _) = clients(&server);

        let result = pypi.get_dependency_tree("alpha", None, 3).await.unwrap();
        assert_eq!(result.flat_list, vec!["alpha (1.0)", "beta (1.1)"]);

        let beta = &result.tree.dependencies[0];
        assert_eq!(beta.name, "beta");
        assert_eq!(beta.version.as_deref(), Some("1.1"));
        assert_eq!(result.tree.dependencies.len(), 1);

        let back = &beta.dependencies[0];
        assert_eq!(back.name, "alpha");
        assert!(back.cycle);
        assert!(back.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_tree_respects_depth() {
        let mut server = Server::new_async().await;
        let _a1 = mock_json(
            &mut server,
            "/pypi/alpha/1.0/json",
            package_doc("alpha", "1.0", &[], &["beta"]),
        )
        .await;
        let _b = mock_json(&mut server, "/pypi/beta/json", package_doc("beta", "1.1", &["1.1"], &[])).await;
        let (pypi, _) = clients(&server);

        let result = pypi.get_dependency_tree("alpha", Some("1.0"), 1).await.unwrap();
        let beta = &result.tree.dependencies[0];
        assert_eq!(beta.version.as_deref(), Some("1.1"));
        assert!(beta.dependencies.is_empty());
        assert!(!beta.cycle);
    }

    #[tokio::test]
    async fn test_check_requirements_file() {
        let mut server = Server::new_async().await;
        let _a = mock_json(&mut server, "/pypi/alpha/json", package_doc("alpha", "2.0", &["1.0", "2.0"], &[])).await;
        let _b = mock_json(&mut server, "/pypi/beta/json", package_doc("beta", "1.5", &["1.5"], &[])).await;
        let _g = server
            .mock("GET", "/pypi/ghost/json")
            .with_status(404)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let file = requirements_file("# pinned\nalpha==1.0\nbeta>=1.0\nghost\n-r other.txt\n");
        let check = pypi.check_requirements_file(&path_of(&file)).await.unwrap();

        assert_eq!(check.outdated.len(), 1);
        assert_eq!(check.outdated[0].package, "alpha");
        assert_eq!(check.outdated[0].current_version, "1.0");
        assert_eq!(check.outdated[0].latest_version.as_deref(), Some("2.0"));

        assert_eq!(check.up_to_date.len(), 1);
        assert_eq!(check.up_to_date[0].package, "beta");
        assert!(check.up_to_date[0].latest_version.is_none());
    }

    #[tokio::test]
    async fn test_requirements_file_errors() {
        let server = Server::new_async().await;
        let (pypi, _) = clients(&server);

        let err = pypi
            .check_requirements_file("/definitely/not/here.txt")
            .await
            .unwrap_err();
        assert_eq!(err.code().as_str(), "file_error");

        let toml = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = pypi.check_requirements_file(&path_of(&toml)).await.unwrap_err();
        assert_eq!(err.code().as_str(), "invalid_input");
    }

    #[tokio::test]
    async fn test_package_stats() {
        let mut server = Server::new_async().await;
        let _p = mock_json(&mut server, "/pypi/Demo_Pkg/json", package_doc("Demo_Pkg", "1.0", &["1.0"], &[])).await;
        let _s = mock_json(
            &mut server,
            "/api/packages/demo-pkg/recent",
            json!({"data": {"last_day": 5, "last_week": 40, "last_month": 200}, "package": "demo-pkg"})
                .to_string(),
        )
        .await;
        let (pypi, _) = clients(&server);

        let stats = pypi.get_package_stats("Demo_Pkg").await.unwrap();
        assert_eq!(stats.last_day, 5);
        assert_eq!(stats.last_week, 40);
        assert_eq!(stats.last_month, 200);
    }

    #[tokio::test]
    async fn test_latest_updates_feed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rss/updates.xml")
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(
                r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>PyPI recent updates</title>
<item><title>demo 1.0</title><link>https://pypi.org/project/demo/1.0/</link>
<description>A demo</description><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
</channel></rss>"#,
            )
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let updates = pypi.get_latest_updates().await.unwrap().updates;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].title, "demo 1.0");
        assert_eq!(updates[0].link, "https://pypi.org/project/demo/1.0/");
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("GET", "/pypi/busy/json")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/pypi/busy/json")
            .with_status(200)
            .with_body(package_doc("busy", "1.0", &["1.0"], &[]))
            .expect(1)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        assert_eq!(pypi.get_latest_version("busy").await.unwrap().version, "1.0");
        limited.assert_async().await;
        ok.assert_async().await;
    }

    fn docs_doc(mut info: Value) -> String {
        info["name"] = json!("docs");
        info["version"] = json!("1.0");
        info["summary"] = json!("Docs demo");
        json!({"info": info, "releases": {"1.0": []}, "urls": []}).to_string()
    }

    #[tokio::test]
    async fn test_documentation_url_prefers_first_docs_link() {
        let mut server = Server::new_async().await;
        let _m = mock_json(
            &mut server,
            "/pypi/docs/json",
            docs_doc(json!({
                "project_urls": {
                    "Source": "https://example.com/src",
                    "Documentation": "https://first.example/",
                    "API docs": "https://second.example/",
                },
                "docs_url": "https://docs-url.example/",
                "home_page": "https://home.example/",
            })),
        )
        .await;
        let (pypi, _) = clients(&server);

        let docs = pypi.get_documentation_url("docs").await.unwrap();
        assert_eq!(docs.docs_url, "https://first.example/");
        assert_eq!(docs.summary, "Docs demo");
    }

    #[tokio::test]
    async fn test_documentation_url_fallbacks() {
        let cases = [
            (
                json!({"project_urls": {"Source": "https://example.com/src"}, "docs_url": "https://docs-url.example/"}),
                "https://docs-url.example/",
            ),
            (
                json!({"docs_url": "", "home_page": "https://home.example/"}),
                "https://home.example/",
            ),
            (json!({}), "https://readthedocs.org/projects/docs/"),
        ];

        for (info, expected) in cases {
            let mut server = Server::new_async().await;
            let _m = mock_json(&mut server, "/pypi/docs/json", docs_doc(info)).await;
            let (pypi, _) = clients(&server);

            let docs = pypi.get_documentation_url("docs").await.unwrap();
            assert_eq!(docs.docs_url, expected);
        }
    }

    fn rss(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{}</title><link>{}</link><description>d</description>\
                     <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>",
                    title, link
                )
            })
            .collect();
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{}</channel></rss>"#, items)
    }

    #[tokio::test]
    async fn test_project_releases_feed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rss/project/demo/releases.xml")
            .with_status(200)
            .with_body(rss(&[
                ("2.0", "https://pypi.org/project/demo/2.0/"),
                ("1.0", "https://pypi.org/project/demo/1.0/"),
            ]))
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/rss/project/ghost/releases.xml")
            .with_status(404)
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let releases = pypi.get_project_releases("demo").await.unwrap().releases;
        let titles: Vec<_> = releases.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["2.0", "1.0"]);

        let err = pypi.get_project_releases("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_newest_packages_feed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rss/packages.xml")
            .with_status(200)
            .with_body(rss(&[("fresh added to PyPI", "https://pypi.org/project/fresh/")]))
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let packages = pypi.get_newest_packages().await.unwrap().packages;
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].title, "fresh added to PyPI");
        assert_eq!(packages[0].link, "https://pypi.org/project/fresh/");
    }

    #[tokio::test]
    async fn test_search() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Regex(r"^/search/".to_string()))
            .with_status(200)
            .with_body(
                r#"<a class="package-snippet" href="/project/demo/">
<span class="package-snippet__name">demo</span>
<span class="package-snippet__version">1.0</span>
<p class="package-snippet__description">A demo</p></a>"#,
            )
            .create_async()
            .await;
        let (pypi, _) = clients(&server);

        let result = pypi.search_packages("demo tools", 1).await.unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].name, "demo");
        assert!(result.search_url.contains("q=demo%20tools"));
    }
}

mod security_tests {
    use super::*;

    fn osv_vuln() -> Value {
        json!({
            "vulns": [{
                "id": "GHSA-xxxx-0001",
                "summary": "SQL injection",
                "aliases": ["CVE-2024-0001"],
                "database_specific": {"severity": "HIGH"},
                "affected": [{
                    "package": {"name": "Django", "ecosystem": "PyPI"},
                    "ranges": [{"type": "ECOSYSTEM", "events": [{"introduced": "0"}, {"fixed": "3.2.25"}]}]
                }]
            }]
        })
    }

    async fn mock_osv(server: &mut ServerGuard, package: &str, body: Value) -> mockito::Mock {
        server
            .mock("POST", "/v1/query")
            .match_body(Matcher::PartialJson(json!({"package": {"name": package}})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_scan_package() {
        let mut server = Server::new_async().await;
        let _osv = mock_osv(&mut server, "django", osv_vuln()).await;
        let (_, scanner) = clients(&server);

        let scan = scanner.scan_package("django", Some("3.2.0")).await.unwrap();
        assert!(scan.is_vulnerable());
        assert_eq!(scan.highest_severity, Some(Severity::High));
        let finding = &scan.vulnerabilities[0];
        assert_eq!(finding.id, "GHSA-xxxx-0001");
        assert_eq!(finding.fixed_versions, vec!["3.2.25"]);
        assert_eq!(finding.aliases, vec!["CVE-2024-0001"]);
    }

    #[tokio::test]
    async fn test_scan_package_defaults_to_latest() {
        let mut server = Server::new_async().await;
        let _p = mock_json(&mut server, "/pypi/tidy/json", package_doc("tidy", "4.0", &["4.0"], &[])).await;
        let osv = server
            .mock("POST", "/v1/query")
            .match_body(Matcher::PartialJson(json!({"package": {"name": "tidy"}, "version": "4.0"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let (_, scanner) = clients(&server);

        let scan = scanner.scan_package("tidy", None).await.unwrap();
        assert_eq!(scan.version, "4.0");
        assert!(!scan.is_vulnerable());
        assert!(scan.highest_severity.is_none());
        osv.assert_async().await;
    }

    #[tokio::test]
    async fn test_osv_results_are_paged() {
        let mut server = Server::new_async().await;
        let second = server
            .mock("POST", "/v1/query")
            .match_body(Matcher::PartialJson(json!({"page_token": "page-2"})))
            .with_status(200)
            .with_body(json!({"vulns": [{"id": "B"}]}).to_string())
            .expect(1)
            .create_async()
            .await;
        let first = server
            .mock("POST", "/v1/query")
            .match_body(Matcher::PartialJson(json!({"package": {"name": "paged"}})))
            .with_status(200)
            .with_body(json!({"vulns": [{"id": "A"}], "next_page_token": "page-2"}).to_string())
            .expect(1)
            .create_async()
            .await;
        let (_, scanner) = clients(&server);

        let scan = scanner.scan_package("paged", Some("1.0")).await.unwrap();
        let ids: Vec<_> = scan.vulnerabilities.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_scan_requirements_file() {
        let mut server = Server::new_async().await;
        let _d = mock_json(&mut server, "/pypi/django/json", package_doc("django", "5.0", &["3.2.0", "5.0"], &[])).await;
        let _t = mock_json(&mut server, "/pypi/tidy/json", package_doc("tidy", "4.0", &["3.0", "4.0"], &[])).await;
        let _osv_d = mock_osv(&mut server, "django", osv_vuln()).await;
        let _osv_t = mock_osv(&mut server, "tidy", json!({})).await;
        let (_, scanner) = clients(&server);

        let file = requirements_file(
            "django==3.2.0\ntidy<4\nlocal @ https://example.com/local.whl\n!!bad line\n",
        );
        let report = scanner.scan_requirements_file(&path_of(&file)).await.unwrap();

        assert_eq!(report.packages.len(), 2);
        assert_eq!(report.packages[0].package, "django");
        assert_eq!(report.packages[1].package, "tidy");
        assert_eq!(report.packages[1].version, "3.0");
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].line, 3);

        assert_eq!(report.summary.total_packages, 2);
        assert_eq!(report.summary.vulnerable_packages, 1);
        assert_eq!(report.summary.high, 1);

        let markdown = format_report(&report);
        assert!(markdown.contains("## django 3.2.0 (HIGH)"));
        assert!(markdown.contains("Fixed in: 3.2.25"));
        assert!(markdown.contains("- tidy 3.0"));
    }
}

mod cache_tests {
    use super::*;

    #[test]
    fn test_disk_tier_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions {
            dir: Some(dir.path().to_path_buf()),
            ..CacheOptions::default()
        };

        let first = HybridCache::new(options.clone()).unwrap();
        assert!(first.set("pkg:demo", json!({"version": "1.0"}), None));

        let second = HybridCache::new(options).unwrap();
        assert_eq!(second.get("pkg:demo"), Some(json!({"version": "1.0"})));
        let stats = second.stats();
        assert_eq!(stats.disk_hits, 1);
        assert!(second.in_memory_tier("pkg:demo"));
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache = HybridCache::in_memory(Duration::from_secs(60));
        cache.set("short", json!(1), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("short").is_none());
    }

    #[test]
    fn test_pattern_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HybridCache::new(CacheOptions {
            dir: Some(dir.path().to_path_buf()),
            ..CacheOptions::default()
        })
        .unwrap();
        cache.set("https://pypi.org/pypi/a/json", json!(1), None);
        cache.set("https://pypi.org/pypi/b/json", json!(2), None);
        cache.set("https://api.osv.dev/v1/query#00", json!(3), None);

        let removed = cache.invalidate_pattern(r"/pypi/").unwrap();
        assert!(removed >= 2);
        assert!(cache.get("https://pypi.org/pypi/a/json").is_none());
        assert_eq!(cache.get("https://api.osv.dev/v1/query#00"), Some(json!(3)));
        assert!(cache.invalidate_pattern("(unclosed").is_err());
    }
}

mod mcp_protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_and_list() {
        let server = Server::new_async().await;
        let (pypi, scanner) = clients(&server);
        let mut mcp = McpServer::new(pypi, scanner);

        let init = rpc(
            &mut mcp,
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            })),
        )
        .await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "pypi");

        let tools = rpc(&mut mcp, 2, "tools/list", None).await;
        let names: Vec<&str> = tools["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(names.contains(&"get_dependency_tree"));
        assert!(names.contains(&"scan_requirements_file"));
        assert!(names.contains(&"clear_cache"));

        let templates = rpc(&mut mcp, 3, "resources/templates/list", None).await;
        assert_eq!(templates["result"]["resourceTemplates"].as_array().unwrap().len(), 4);

        let prompts = rpc(&mut mcp, 4, "prompts/list", None).await;
        assert_eq!(prompts["result"]["prompts"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_call_tool() {
        let mut server = Server::new_async().await;
        let _m = mock_json(&mut server, "/pypi/demo/json", package_doc("demo", "1.4", &["1.4"], &[])).await;
        let (pypi, scanner) = clients(&server);
        let mut mcp = McpServer::new(pypi, scanner);

        let response = rpc(
            &mut mcp,
            5,
            "tools/call",
            Some(json!({"name": "get_latest_version", "arguments": {"package_name": "demo"}})),
        )
        .await;
        let result = &response["result"];
        assert!(result.get("isError").is_none());
        assert_eq!(tool_json(result)["version"], "1.4");

        let compare = rpc(
            &mut mcp,
            6,
            "tools/call",
            Some(json!({
                "name": "compare_versions",
                "arguments": {"package_name": "demo", "version1": "1.0.0", "version2": "1.0"}
            })),
        )
        .await;
        assert_eq!(tool_json(&compare["result"])["are_equal"], true);
    }

    #[tokio::test]
    async fn test_tool_errors_are_results() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/ghost/json")
            .with_status(404)
            .create_async()
            .await;
        let (pypi, scanner) = clients(&server);
        let mut mcp = McpServer::new(pypi, scanner);

        let missing = rpc(
            &mut mcp,
            1,
            "tools/call",
            Some(json!({"name": "get_package_info", "arguments": {"package_name": "ghost"}})),
        )
        .await;
        assert_eq!(missing["result"]["isError"], true);
        assert_eq!(tool_json(&missing["result"])["error"]["code"], "not_found");

        let invalid = rpc(
            &mut mcp,
            2,
            "tools/call",
            Some(json!({"name": "get_dependency_tree", "arguments": {"package_name": "demo", "depth": 0}})),
        )
        .await;
        assert_eq!(invalid["result"]["isError"], true);
        assert_eq!(tool_json(&invalid["result"])["error"]["code"], "invalid_input");
    }

    #[tokio::test]
    async fn test_read_resources() {
        let mut server = Server::new_async().await;
        let _m = mock_json(&mut server, "/pypi/demo/json", package_doc("demo", "1.4", &["1.4"], &[])).await;
        let (pypi, scanner) = clients(&server);
        let mut mcp = McpServer::new(pypi, scanner);

        let package = rpc(&mut mcp, 1, "resources/read", Some(json!({"uri": "pypi://package/demo"}))).await;
        let content = &package["result"]["contents"][0];
        assert_eq!(content["mimeType"], "application/json");
        let doc: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(doc["info"]["version"], "1.4");

        let stats = rpc(&mut mcp, 2, "resources/read", Some(json!({"uri": "pypi://cache/stats"}))).await;
        let text = stats["result"]["contents"][0]["text"].as_str().unwrap();
        let stats: Value = serde_json::from_str(text).unwrap();
        assert!(stats["sets"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_prompt_rendering() {
        let server = Server::new_async().await;
        let (pypi, scanner) = clients(&server);
        let mut mcp = McpServer::new(pypi, scanner);

        let response = rpc(
            &mut mcp,
            1,
            "prompts/get",
            Some(json!({"name": "security_review_prompt", "arguments": {"package_name": "django"}})),
        )
        .await;
        let text = response["result"]["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("'django'"));
        assert_eq!(response["result"]["messages"][0]["content"]["type"], "text");
    }

    #[tokio::test]
    async fn test_clear_cache_tool() {
        let mut server = Server::new_async().await;
        let _m = mock_json(&mut server, "/pypi/demo/json", package_doc("demo", "1.4", &["1.4"], &[])).await;
        let (pypi, scanner) = clients(&server);
        let cache = pypi.cache().clone();
        let mut mcp = McpServer::new(pypi, scanner);

        rpc(
            &mut mcp,
            1,
            "tools/call",
            Some(json!({"name": "get_latest_version", "arguments": {"package_name": "demo"}})),
        )
        .await;
        assert!(cache.stats().memory_entries >= 1);

        let cleared = rpc(&mut mcp, 2, "tools/call", Some(json!({"name": "clear_cache"}))).await;
        assert_eq!(tool_json(&cleared["result"])["status"], "cleared");
        assert_eq!(cache.stats().memory_entries, 0);
    }

    #[tokio::test]
    async fn test_from_config_memory_only() {
        let server = Server::new_async().await;
        let config = config_for(&server);
        let mut mcp = McpServer::from_config(&config).unwrap();

        let pong = rpc(&mut mcp, 9, "ping", None).await;
        assert_eq!(pong["result"], json!({}));
    }
}
