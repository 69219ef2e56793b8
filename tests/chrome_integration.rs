//! Integration tests against a real headless Chrome
#![cfg(feature = "cdp")]

use mdsnap::capture::CaptureMode;
use mdsnap::cdp::CdpLauncher;
use mdsnap::convert::{convert, ConversionRequest, RenderOptions, Source};
use mdsnap::{CaptureRegion, Engine, EngineConfig, Error, Launcher, OutputFormat, RequestAction, WaitUntil};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tiny_http::{Response, Server};

static INIT: Once = Once::new();

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Start a simple test HTTP server
fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18090").unwrap();
            for request in server.incoming_requests() {
                let path = request.url().to_string();
                let response = match path.as_str() {
                    "/" => Response::from_string(
                        r#"<!DOCTYPE html>
<html>
<head><title>Card Page</title><link rel="stylesheet" href="/style.css"></head>
<body>
<div class="card" style="width:300px;height:200px">Hello from Test Server</div>
</body>
</html>"#,
                    )
                    .with_header("Content-Type: text/html; charset=utf-8".parse::<tiny_http::Header>().unwrap()),
                    "/style.css" => Response::from_string("body { margin: 0; }")
                        .with_header("Content-Type: text/css".parse::<tiny_http::Header>().unwrap()),
                    "/slow" => {
                        std::thread::sleep(std::time::Duration::from_secs(3));
                        Response::from_string("<p>late</p>")
                    }
                    _ => Response::from_string("Not Found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        // Give the server time to start
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18090".to_string()
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_markdown_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("hello.png");
    let request = ConversionRequest::new(Source::Inline("# Hello\n\nWorld".into()), &out, OutputFormat::Png);

    let result = convert(&CdpLauncher, &request).expect("conversion failed");
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(PNG_SIGNATURE));
    assert_eq!(result.meta.engine.name, "chromium");
    assert_eq!(result.capture_mode(), CaptureMode::Container);
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_markdown_to_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("doc.pdf");
    let request = ConversionRequest::new(Source::Inline("# Report\n\nBody".into()), &out, OutputFormat::Pdf);

    convert(&CdpLauncher, &request).expect("conversion failed");
    assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF"));
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_url_capture_finds_card() {
    let base_url = start_test_server();
    let dir = tempfile::tempdir().unwrap();
    let request = ConversionRequest::new(Source::Url(base_url), dir.path().join("page.png"), OutputFormat::Png);

    let result = convert(&CdpLauncher, &request).expect("conversion failed");
    assert_eq!(result.capture_mode(), CaptureMode::Card);
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_navigation_timeout() {
    let base_url = start_test_server();
    let dir = tempfile::tempdir().unwrap();
    let options = RenderOptions { timeout_ms: 500, ..RenderOptions::default() };
    let request = ConversionRequest::new(Source::Url(format!("{}/slow", base_url)), dir.path().join("slow.png"), OutputFormat::Png)
        .with_options(options);

    let err = convert(&CdpLauncher, &request).unwrap_err();
    assert!(matches!(err, Error::NavigationTimeout(500) | Error::Engine(_)), "{}", err);
    assert!(!dir.path().join("slow.png").exists());
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_interception_blocks_outside_allow_list() {
    let base_url = start_test_server();
    let blocked = Arc::new(AtomicUsize::new(0));
    let counter = blocked.clone();

    let mut engine = CdpLauncher.launch(&EngineConfig::default()).expect("Failed to create engine");
    engine
        .on_request(move |req| {
            if req.url.ends_with("/style.css") {
                counter.fetch_add(1, Ordering::SeqCst);
                RequestAction::Fail { reason: "blocked".into() }
            } else {
                RequestAction::Continue
            }
        })
        .unwrap();

    engine.load_url(&format!("{}/", base_url), WaitUntil::Load, 10_000).expect("load");
    assert!(blocked.load(Ordering::SeqCst) >= 1);
    assert!(engine.element_rect(".card").unwrap().is_some());
    engine.close().unwrap();
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_remove_scripts_in_live_dom() {
    let mut engine = CdpLauncher.launch(&EngineConfig::default()).expect("Failed to create engine");
    engine
        .set_content("<html><body><script>window.x = 1;</script><p>hi</p></body></html>", WaitUntil::Load, 10_000)
        .unwrap();
    assert_eq!(engine.remove_scripts().unwrap(), 1);
    assert_eq!(engine.remove_scripts().unwrap(), 0);
    engine.close().unwrap();
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_engine_reports_chromium_version() {
    let engine = CdpLauncher.launch(&EngineConfig::default()).expect("Failed to create engine");
    assert_eq!(engine.version().unwrap().name, "chromium");
    engine.close().unwrap();
}

fn png_height(png: &[u8]) -> u32 {
    // IHDR: width at 16..20, height at 20..24
    u32::from_be_bytes([png[20], png[21], png[22], png[23]])
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_full_page_capture_includes_content_below_viewport() {
    let mut engine = CdpLauncher.launch(&EngineConfig::default()).expect("Failed to create engine");
    engine
        .set_content(
            "<html><body style=\"margin:0\"><div style=\"height:2400px;background:#345\"></div></body></html>",
            WaitUntil::Load,
            10_000,
        )
        .unwrap();

    let png = engine.capture_png(&CaptureRegion::FullPage).unwrap();
    engine.close().unwrap();
    assert!(png.starts_with(PNG_SIGNATURE));
    assert_eq!(png_height(&png), 2400);
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_font_wait_is_bounded_by_timeout() {
    let base_url = start_test_server();
    let mut engine = CdpLauncher.launch(&EngineConfig::default()).expect("Failed to create engine");
    let html = format!(
        "<html><head><style>@font-face {{ font-family: Late; src: url({}/slow); }} p {{ font-family: Late; }}</style></head>\
         <body><p>text</p></body></html>",
        base_url
    );
    engine.set_content(&html, WaitUntil::DomContentLoaded, 10_000).unwrap();

    let started = std::time::Instant::now();
    engine.wait_for_fonts(300).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    engine.close().unwrap();
}
