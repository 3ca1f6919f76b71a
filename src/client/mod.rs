//! Client side of the progress stream: decoding, panel state, HTTP calls.

pub mod api;
pub mod decoder;
pub mod panel;
pub mod progress;

pub use api::{ClientError, DeployApiClient};
pub use decoder::{LineDecoder, StreamLine};
pub use panel::{format_duration, recent_history, DeploymentPanel, PanelLine, PanelOutcome};

use futures::{Stream, StreamExt};

/// Drain a byte stream into `panel`, calling `on_line` for every rendered line.
///
/// A transport error mid-stream is recorded as a raw line; the outcome then
/// depends on what arrived before it.
pub async fn follow<S, F>(mut stream: S, panel: &mut DeploymentPanel, mut on_line: F) -> PanelOutcome
where
    S: Stream<Item = Result<Vec<u8>, ClientError>> + Unpin,
    F: FnMut(&PanelLine, u8),
{
    let mut decoder = LineDecoder::new();
    panel.begin();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for line in decoder.push(&bytes) {
                    let rendered = panel.apply(line).clone();
                    on_line(&rendered, panel.percentage());
                }
            }
            Err(err) => {
                let rendered = panel
                    .apply(StreamLine::Raw(format!("Stream interrupted: {}", err)))
                    .clone();
                on_line(&rendered, panel.percentage());
                break;
            }
        }
    }

    if let Some(line) = decoder.finish() {
        let rendered = panel.apply(line).clone();
        on_line(&rendered, panel.percentage());
    }
    panel.finish()
}
