use std::fs;
use std::path::Path;

use mockito::{Mock, Server, ServerGuard};
use smolder::{Client, ClientConfig, SmolderError};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

const VERSIONS: &str = r#"[
    {"name": "latest", "type": "directory", "mtime": "Tue, 01 Oct 2024 10:00:00 GMT"},
    {"name": "pbe", "type": "directory", "mtime": "Tue, 01 Oct 2024 10:00:00 GMT"},
    {"name": "runeterra", "type": "directory"},
    {"name": "favicon.ico", "type": "file", "size": 1150},
    {"name": "status.live.txt", "type": "file", "size": "12"}
]"#;

const MANIFEST: &str = "game/a.txt\r\ngame/data/b.txt\r\ngame/data/deep/c.txt\r\nother/z.txt\r\n";

fn config(server: &ServerGuard, output: &Path) -> ClientConfig {
    ClientConfig {
        root_url: server.url(),
        domain: "127.0.0.1".to_string(),
        output_dir: output.to_path_buf(),
        concurrency: 4,
        ..ClientConfig::default()
    }
}

fn start_url(server: &ServerGuard) -> String {
    format!("{}/latest/game/", server.url())
}

async fn json(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn file(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

/// Version index, manifest and the listings of `latest/game/`.
async fn serve_catalog(server: &mut ServerGuard) -> Vec<Mock> {
    vec![
        json(server, "/json/", VERSIONS).await,
        server
            .mock("GET", "/latest/cdragon/files.exported.txt")
            .with_status(200)
            .with_body(MANIFEST)
            .create_async()
            .await,
        json(
            server,
            "/json/latest/game/",
            r#"[{"name": "data", "type": "directory"}, {"name": "a.txt", "type": "file", "size": 5}]"#,
        )
        .await,
        json(
            server,
            "/json/latest/game/data/",
            r#"[{"name": "deep", "type": "directory"}, {"name": "b.txt", "type": "file", "size": 5}]"#,
        )
        .await,
        json(
            server,
            "/json/latest/game/data/deep/",
            r#"[{"name": "c.txt", "type": "file", "size": 5}]"#,
        )
        .await,
    ]
}

async fn serve_files(server: &mut ServerGuard) -> Vec<Mock> {
    vec![
        file(server, "/latest/game/a.txt", "alpha").await,
        file(server, "/latest/game/data/b.txt", "bravo").await,
        file(server, "/latest/game/data/deep/c.txt", "charl").await,
    ]
}

fn read(root: &TempDir, relative: &str) -> String {
    fs::read_to_string(root.path().join("out").join(relative)).unwrap()
}

#[tokio::test]
async fn versions_exclude_housekeeping_entries() {
    let mut server = Server::new_async().await;
    let _versions = json(&mut server, "/json/", VERSIONS).await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, dir.path())).unwrap();

    let versions = client.list_versions(&CancellationToken::new()).await.unwrap();
    assert_eq!(versions, vec!["latest".to_string(), "pbe".to_string()]);
}

#[tokio::test]
async fn manifest_lines_become_entries() {
    let mut server = Server::new_async().await;
    let _catalog = serve_catalog(&mut server).await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, dir.path())).unwrap();

    let entries = client
        .list_manifest("latest", &CancellationToken::new())
        .await
        .unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["game/a.txt", "game/data/b.txt", "game/data/deep/c.txt", "other/z.txt"]
    );
    assert_eq!(entries[1].url(), format!("{}/latest/game/data/b.txt", server.url()));

    let found = client.search("data/", &entries).unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn unknown_version_is_rejected() {
    let mut server = Server::new_async().await;
    let _versions = json(&mut server, "/json/", VERSIONS).await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, dir.path())).unwrap();

    let result = client.list_manifest("runeterra", &CancellationToken::new()).await;
    assert!(matches!(result, Err(SmolderError::InvalidVersion(v)) if v == "runeterra"));
}

#[tokio::test]
async fn listing_errors_surface() {
    let mut server = Server::new_async().await;
    let _garbled = json(&mut server, "/json/latest/game/", "<html>not json</html>").await;
    let _broken = server
        .mock("GET", "/json/latest/other/")
        .with_status(500)
        .create_async()
        .await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();
    let cancel = CancellationToken::new();

    let decoded = client.download_directory(&start_url(&server), &cancel).await;
    assert!(matches!(decoded, Err(SmolderError::DecodeFailed { .. })));

    let fetched = client
        .download_directory(&format!("{}/latest/other/", server.url()), &cancel)
        .await;
    assert!(matches!(
        fetched,
        Err(SmolderError::FetchFailed { status, .. }) if status.as_u16() == 500
    ));
}

#[tokio::test]
async fn null_listing_is_an_empty_directory() {
    let mut server = Server::new_async().await;
    let _listing = json(&mut server, "/json/latest/game/", "null").await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();

    let report = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.requested, 0);
    assert!(dir.path().join("out").is_dir());
}

#[tokio::test]
async fn both_strategies_produce_the_same_tree() {
    let mut server = Server::new_async().await;
    let listings = serve_catalog(&mut server).await;
    let _files = serve_files(&mut server).await;
    let cancel = CancellationToken::new();

    let crawled = tempdir().unwrap();
    let client = Client::new(config(&server, &crawled.path().join("out"))).unwrap();
    let report = client
        .download_directory(&start_url(&server), &cancel)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 3);

    let walked = tempdir().unwrap();
    let client = Client::new(config(&server, &walked.path().join("out"))).unwrap();
    let entries = client.list_manifest("latest", &cancel).await.unwrap();
    let report = client
        .download_directory_from_manifest(&start_url(&server), &entries, &cancel)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 3);

    for relative in ["a.txt", "data/b.txt", "data/deep/c.txt"] {
        assert_eq!(read(&crawled, relative), read(&walked, relative));
    }
    assert_eq!(read(&walked, "data/deep/c.txt"), "charl");
    assert!(!walked.path().join("out").join("z.txt").exists());

    // Each listing was requested once, by the crawl only.
    for mock in &listings[2..] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn max_depth_limits_both_strategies() {
    let mut server = Server::new_async().await;
    let _catalog = serve_catalog(&mut server).await;
    let _files = serve_files(&mut server).await;
    let cancel = CancellationToken::new();

    let crawled = tempdir().unwrap();
    let client = Client::new(ClientConfig {
        max_depth: 1,
        ..config(&server, &crawled.path().join("out"))
    })
    .unwrap();
    let report = client
        .download_directory(&start_url(&server), &cancel)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.skipped_depth, 1);

    let walked = tempdir().unwrap();
    let client = Client::new(ClientConfig {
        max_depth: 1,
        ..config(&server, &walked.path().join("out"))
    })
    .unwrap();
    let entries = client.list_manifest("latest", &cancel).await.unwrap();
    let report = client
        .download_directory_from_manifest(&start_url(&server), &entries, &cancel)
        .await
        .unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.skipped_depth, 2);

    for root in [&crawled, &walked] {
        assert_eq!(read(root, "a.txt"), "alpha");
        assert!(!root.path().join("out").join("data").exists());
    }
}

#[tokio::test]
async fn second_run_skips_existing_files() {
    let mut server = Server::new_async().await;
    let _catalog = serve_catalog(&mut server).await;
    let files = serve_files(&mut server).await;
    let dir = tempdir().unwrap();
    let client = Client::new(ClientConfig {
        overwrite_output: false,
        skip_existing: true,
        ..config(&server, &dir.path().join("out"))
    })
    .unwrap();
    let cancel = CancellationToken::new();

    let first = client
        .download_directory(&start_url(&server), &cancel)
        .await
        .unwrap();
    assert_eq!(first.downloaded, 3);

    let second = client
        .download_directory(&start_url(&server), &cancel)
        .await
        .unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped_existing, 3);

    for mock in &files {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn filter_keeps_matching_names_only() {
    let mut server = Server::new_async().await;
    let _catalog = serve_catalog(&mut server).await;
    let _files = serve_files(&mut server).await;
    let dir = tempdir().unwrap();
    let client = Client::new(ClientConfig {
        filter: Some("b.".to_string()),
        ..config(&server, &dir.path().join("out"))
    })
    .unwrap();

    let report = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.skipped_filter, 2);
    assert_eq!(read(&dir, "data/b.txt"), "bravo");
    assert!(!dir.path().join("out").join("a.txt").exists());
}

/// Serves `latest/game/` as a flat listing of `a.txt` and `b.txt`.
async fn serve_flat(server: &mut ServerGuard) -> Vec<Mock> {
    vec![
        json(
            server,
            "/json/latest/game/",
            r#"[{"name": "a.txt", "type": "file"}, {"name": "b.txt", "type": "file"}]"#,
        )
        .await,
        file(server, "/latest/game/b.txt", "bravo").await,
    ]
}

#[tokio::test]
async fn server_errors_are_retried() {
    let mut server = Server::new_async().await;
    let _flat = serve_flat(&mut server).await;
    let unavailable = server
        .mock("GET", "/latest/game/a.txt")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let _available = file(&mut server, "/latest/game/a.txt", "alpha").await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();

    let report = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.downloaded, 2);
    assert_eq!(read(&dir, "a.txt"), "alpha");
    unavailable.assert_async().await;
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let mut server = Server::new_async().await;
    let _flat = serve_flat(&mut server).await;
    let unavailable = server
        .mock("GET", "/latest/game/a.txt")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;
    let dir = tempdir().unwrap();
    let client = Client::new(ClientConfig {
        retries: 2,
        ..config(&server, &dir.path().join("out"))
    })
    .unwrap();

    let result = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SmolderError::DownloadExhausted { url }) if url.ends_with("a.txt")));
    // The sibling still completes before the failure is reported.
    assert_eq!(read(&dir, "b.txt"), "bravo");
    assert!(!dir.path().join("out").join("a.txt").exists());
    unavailable.assert_async().await;
}

#[tokio::test]
async fn missing_file_is_abandoned() {
    let mut server = Server::new_async().await;
    let _flat = serve_flat(&mut server).await;
    let missing = server
        .mock("GET", "/latest/game/a.txt")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();

    let report = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.downloaded, 1);
    missing.assert_async().await;
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let _flat = serve_flat(&mut server).await;
    let forbidden = server
        .mock("GET", "/latest/game/a.txt")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();

    let result = client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(SmolderError::DownloadFailed { status, .. }) if status.as_u16() == 403
    ));
    assert_eq!(read(&dir, "b.txt"), "bravo");
    forbidden.assert_async().await;
}

#[tokio::test]
async fn overwrite_clears_previous_output() {
    let mut server = Server::new_async().await;
    let _listing = json(&mut server, "/json/latest/game/", "[]").await;
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("stale.txt"), "old").unwrap();
    let client = Client::new(config(&server, &out)).unwrap();

    client
        .download_directory(&start_url(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert!(out.is_dir());
    assert!(!out.join("stale.txt").exists());
}

#[tokio::test]
async fn cancelled_run_reports_cancellation() {
    let mut server = Server::new_async().await;
    let _catalog = serve_catalog(&mut server).await;
    let dir = tempdir().unwrap();
    let client = Client::new(config(&server, &dir.path().join("out"))).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client.download_directory(&start_url(&server), &cancel).await;
    assert!(matches!(result, Err(SmolderError::Cancelled)));
}
