use crate::cdp::CdpLauncher;
use crate::convert::{self, ConversionRequest, RenderResult};
use crate::{Error, Launcher, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Convert(Box<ConversionRequest>, oneshot::Sender<Result<RenderResult>>),
    Shutdown(oneshot::Sender<()>),
}

/// An async-friendly converter backed by a dedicated worker thread.
///
/// The worker thread owns the launcher and runs conversions one at a time,
/// so async callers never block the runtime on the browser. Each conversion
/// still launches and tears down its own engine.
#[derive(Clone)]
pub struct Converter {
    cmd_tx: Sender<Command>,
}

impl Converter {
    /// Spawn a worker that converts with headless Chrome.
    pub fn new() -> Self {
        Self::with_launcher(CdpLauncher)
    }

    /// Spawn a worker that converts with engines from `launcher`.
    pub fn with_launcher<L>(launcher: L) -> Self
    where
        L: Launcher + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Convert(request, resp) => {
                        let res = convert::convert(&launcher, &request);
                        let _ = resp.send(res);
                    }
                    Command::Shutdown(resp) => {
                        let _ = resp.send(());
                        break;
                    }
                }
            }
        });

        Self { cmd_tx }
    }

    /// Queue a conversion and wait for its result.
    pub async fn convert(&self, request: ConversionRequest) -> Result<RenderResult> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Convert(Box::new(request), tx))
            .map_err(|_| Error::Engine("Conversion worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Engine(format!("Conversion canceled: {}", e)))?
    }

    /// Stop the worker after queued conversions finish.
    pub async fn shutdown(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(tx)).is_err() {
            return Ok(());
        }
        // A worker that stopped in the meantime drops the reply sender.
        let _ = rx.await;
        Ok(())
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert once with headless Chrome without blocking the async runtime.
pub async fn convert_async(request: ConversionRequest) -> Result<RenderResult> {
    let converter = Converter::new();
    let result = converter.convert(request).await;
    converter.shutdown().await?;
    result
}
