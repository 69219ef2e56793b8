//! Render driver: one engine, one page, one capture
//!
//! `Idle -> Launching -> Navigating -> ContentReady -> Capturing -> Closed`,
//! with `Failed` reachable from every non-terminal state. The engine is closed
//! on every path once it has been launched.

use crate::capture::{self, CaptureMode, CapturePolicy};
use crate::safety::SafetyPolicy;
use crate::{
    ClipRect, Engine, EngineConfig, EngineVersion, Launcher, OutputFormat, PdfOptions, Result,
    WaitUntil,
};
use log::{debug, warn};

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Launching,
    Navigating,
    ContentReady,
    Capturing,
    Closed,
    Failed,
}

impl DriverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DriverState::Closed | DriverState::Failed)
    }
}

/// What the page is loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource<'a> {
    /// Full navigation to a live URL
    Url(&'a str),
    /// Rendered HTML set as the page content
    Html(&'a str),
}

/// Everything the driver needs for one capture
#[derive(Debug, Clone)]
pub struct DriveJob<'a> {
    pub config: EngineConfig,
    pub source: PageSource<'a>,
    pub wait: WaitUntil,
    pub timeout_ms: u64,
    pub safety: &'a SafetyPolicy,
    pub format: OutputFormat,
    pub clip: Option<ClipRect>,
    pub full_page: bool,
    pub pdf: PdfOptions,
}

/// Bytes produced by a successful run
#[derive(Debug, Clone)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub mode: CaptureMode,
    pub engine: EngineVersion,
}

pub struct RenderDriver<'l, L: Launcher> {
    launcher: &'l L,
    state: DriverState,
    history: Vec<DriverState>,
}

impl<'l, L: Launcher> RenderDriver<'l, L> {
    pub fn new(launcher: &'l L) -> Self {
        Self { launcher, state: DriverState::Idle, history: vec![DriverState::Idle] }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`
    pub fn history(&self) -> &[DriverState] {
        &self.history
    }

    fn transition(&mut self, next: DriverState) {
        debug!("Render driver: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Launch, load, capture and close. Not retried on failure.
    pub fn run(&mut self, job: &DriveJob<'_>) -> Result<Captured> {
        if self.state != DriverState::Idle {
            return Err(crate::Error::Engine(format!("driver already used (state {:?})", self.state)));
        }

        self.transition(DriverState::Launching);
        let mut engine = match self.launcher.launch(&job.config) {
            Ok(engine) => engine,
            Err(e) => {
                self.transition(DriverState::Failed);
                return Err(e);
            }
        };

        let outcome = self.drive(&mut engine, job);
        let closed = engine.close();

        match (outcome, closed) {
            (Ok(captured), Ok(())) => {
                self.transition(DriverState::Closed);
                Ok(captured)
            }
            (Ok(_), Err(close_err)) => {
                self.transition(DriverState::Failed);
                Err(close_err)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!("Engine close failed after error: {}", close_err);
                }
                self.transition(DriverState::Failed);
                Err(e)
            }
        }
    }

    fn drive(&mut self, engine: &mut L::Engine, job: &DriveJob<'_>) -> Result<Captured> {
        let version = engine.version()?;
        if job.safety.intercepts_requests() {
            debug!("Installing request interception for {} prefixes", job.safety.network_allowlist.len());
            engine.on_request(job.safety.request_handler())?;
        }

        self.transition(DriverState::Navigating);
        match job.source {
            PageSource::Url(url) => engine.load_url(url, job.wait, job.timeout_ms)?,
            PageSource::Html(html) => engine.set_content(html, job.wait, job.timeout_ms)?,
        }

        self.transition(DriverState::ContentReady);
        engine.wait_for_fonts(job.timeout_ms)?;
        if !job.safety.scripts_allowed && matches!(job.source, PageSource::Html(_)) {
            let removed = engine.remove_scripts()?;
            if removed > 0 {
                debug!("Removed {} script elements from the page", removed);
            }
        }

        self.transition(DriverState::Capturing);
        let policy = CapturePolicy::for_format(job.format);
        let target = capture::select_target(engine, policy, job.clip, job.full_page)?;
        let bytes = match job.format {
            OutputFormat::Png => engine.capture_png(&target.region)?,
            OutputFormat::Pdf => engine.print_pdf(&job.pdf)?,
        };

        Ok(Captured { bytes, mode: target.mode, engine: version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCall, FakeLauncher};
    use crate::{CaptureRegion, Error};

    fn job<'a>(source: PageSource<'a>, safety: &'a SafetyPolicy, format: OutputFormat) -> DriveJob<'a> {
        DriveJob {
            config: EngineConfig::default(),
            source,
            wait: WaitUntil::NetworkIdle,
            timeout_ms: 30000,
            safety,
            format,
            clip: None,
            full_page: false,
            pdf: PdfOptions::default(),
        }
    }

    #[test]
    fn happy_path_visits_every_state() {
        let launcher = FakeLauncher::new();
        let safety = SafetyPolicy::default();
        let mut driver = RenderDriver::new(&launcher);
        let out = driver
            .run(&job(PageSource::Html("<div class=\"container\">x</div>"), &safety, OutputFormat::Png))
            .unwrap();

        assert_eq!(out.mode, CaptureMode::Container);
        assert_eq!(
            driver.history(),
            &[
                DriverState::Idle,
                DriverState::Launching,
                DriverState::Navigating,
                DriverState::ContentReady,
                DriverState::Capturing,
                DriverState::Closed
            ]
        );
        assert_eq!(launcher.open_engines(), 0);
    }

    #[test]
    fn failure_still_closes_engine() {
        let launcher = FakeLauncher::new();
        let safety = SafetyPolicy::default();
        let mut driver = RenderDriver::new(&launcher);
        let err = driver
            .run(&job(PageSource::Html("<p>no container</p>"), &safety, OutputFormat::Pdf))
            .unwrap_err();

        assert!(matches!(err, Error::ContainerNotFound(_)));
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(launcher.open_engines(), 0);
        assert_eq!(launcher.calls().last(), Some(&FakeCall::Close));
        assert!(!launcher.calls().iter().any(|c| matches!(c, FakeCall::PrintPdf(_))));
    }

    #[test]
    fn navigation_timeout_is_fatal_and_not_retried() {
        let launcher = FakeLauncher::new().with_navigation_timeout();
        let safety = SafetyPolicy::default();
        let mut driver = RenderDriver::new(&launcher);
        let err = driver.run(&job(PageSource::Url("https://example.com"), &safety, OutputFormat::Png)).unwrap_err();

        assert!(matches!(err, Error::NavigationTimeout(30000)));
        let loads = launcher.calls().iter().filter(|c| matches!(c, FakeCall::LoadUrl { .. })).count();
        assert_eq!(loads, 1);
        assert_eq!(launcher.open_engines(), 0);
        assert_eq!(driver.history().last(), Some(&DriverState::Failed));
    }

    #[test]
    fn launch_failure_goes_straight_to_failed() {
        let launcher = FakeLauncher::unavailable("no chrome");
        let safety = SafetyPolicy::default();
        let mut driver = RenderDriver::new(&launcher);
        let err = driver.run(&job(PageSource::Html("<p/>"), &safety, OutputFormat::Png)).unwrap_err();
        assert!(matches!(err, Error::RenderEngineUnavailable { .. }));
        assert_eq!(driver.history(), &[DriverState::Idle, DriverState::Launching, DriverState::Failed]);
    }

    #[test]
    fn scripts_removed_only_for_html_sources() {
        let safety = SafetyPolicy::new(true, false, vec![]);

        let launcher = FakeLauncher::new();
        RenderDriver::new(&launcher).run(&job(PageSource::Html("<p/>"), &safety, OutputFormat::Png)).unwrap();
        assert!(launcher.calls().contains(&FakeCall::RemoveScripts));

        let launcher = FakeLauncher::new();
        RenderDriver::new(&launcher)
            .run(&job(PageSource::Url("file:///tmp/x.html"), &safety, OutputFormat::Png))
            .unwrap();
        assert!(!launcher.calls().contains(&FakeCall::RemoveScripts));
    }

    #[test]
    fn interception_installed_only_with_allowlist() {
        let launcher = FakeLauncher::new();
        let safe_only = SafetyPolicy::new(true, false, vec![]);
        RenderDriver::new(&launcher).run(&job(PageSource::Html("<p/>"), &safe_only, OutputFormat::Png)).unwrap();
        assert!(!launcher.calls().contains(&FakeCall::OnRequest));

        let launcher = FakeLauncher::new();
        let allow = SafetyPolicy::new(false, false, vec!["https://cdn.example/".into()]);
        RenderDriver::new(&launcher).run(&job(PageSource::Html("<p/>"), &allow, OutputFormat::Png)).unwrap();
        assert!(launcher.calls().contains(&FakeCall::OnRequest));
        assert_eq!(launcher.simulate_request("https://cdn.example/a.css"), Some(crate::RequestAction::Continue));
        assert!(matches!(launcher.simulate_request("https://other/"), Some(crate::RequestAction::Fail { .. })));
    }

    #[test]
    fn clip_region_is_passed_to_capture() {
        let launcher = FakeLauncher::new();
        let safety = SafetyPolicy::default();
        let clip = ClipRect { x: 10.0, y: 10.0, width: 200.0, height: 150.0 };
        let mut j = job(PageSource::Html("<div class=\"card\"></div>"), &safety, OutputFormat::Png);
        j.clip = Some(clip);
        let out = RenderDriver::new(&launcher).run(&j).unwrap();
        assert_eq!(out.mode, CaptureMode::Clip);
        assert!(launcher.calls().contains(&FakeCall::CapturePng(CaptureRegion::Clip(clip))));
    }

    #[test]
    fn driver_is_single_use() {
        let launcher = FakeLauncher::new();
        let safety = SafetyPolicy::default();
        let mut driver = RenderDriver::new(&launcher);
        driver.run(&job(PageSource::Html("<p/>"), &safety, OutputFormat::Png)).unwrap();
        assert!(driver.run(&job(PageSource::Html("<p/>"), &safety, OutputFormat::Png)).is_err());
    }
}
