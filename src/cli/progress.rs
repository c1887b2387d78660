//! Real-Time Progress Streaming
//!
//! Prints one line per completed pipeline node while a turn runs.

use console::style;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::pipeline::{EventSink, PipelineEvent};

/// Console renderer for [`PipelineEvent`]s
pub struct ConsoleRenderer {
    receiver: broadcast::Receiver<PipelineEvent>,
    show_timing: bool,
}

impl ConsoleRenderer {
    pub fn new(events: &EventSink) -> Self {
        Self {
            receiver: events.subscribe(),
            show_timing: true,
        }
    }

    pub fn with_timing(mut self, show: bool) -> Self {
        self.show_timing = show;
        self
    }

    /// Render a single event as one console line
    pub fn render(&self, event: &PipelineEvent) -> String {
        match event {
            PipelineEvent::NodeCompleted {
                node,
                step,
                elapsed_ms,
                detail,
            } => {
                let timing = if self.show_timing {
                    format!(" {}", style(format_duration_ms(*elapsed_ms)).dim())
                } else {
                    String::new()
                };
                format!(
                    "{} {:<16} {}{}",
                    style(format!("[{:>2}]", step)).dim(),
                    style(node.name()).cyan(),
                    detail,
                    timing
                )
            }
            PipelineEvent::Suspended { question } => {
                format!("{} {}", style("?").yellow(), question)
            }
            PipelineEvent::Finished { success, total_ms } => {
                let mark = if *success {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                format!("{} finished in {}", mark, format_duration_ms(*total_ms))
            }
        }
    }

    /// Start the print loop; ends after `Finished` or once the sink is dropped
    pub fn start_render_loop(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.receiver.recv().await {
                    Ok(event) => {
                        eprintln!("{}", self.render(&event));
                        if matches!(event, PipelineEvent::Finished { .. }) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        eprintln!("{}", style(format!("... {} events skipped", missed)).dim());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Format milliseconds as "850ms", "2.4s" or "1m 05s"
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Node;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(2_400), "2.4s");
        assert_eq!(format_duration_ms(65_000), "1m 05s");
    }

    #[test]
    fn test_render_node_line() {
        console::set_colors_enabled(false);
        let sink = EventSink::default();
        let renderer = ConsoleRenderer::new(&sink).with_timing(false);
        let line = renderer.render(&PipelineEvent::NodeCompleted {
            node: Node::ValidateSql,
            step: 4,
            elapsed_ms: 12,
            detail: "2 of 3 candidates valid".into(),
        });
        assert!(line.contains("validate_sql"));
        assert!(line.contains("2 of 3 candidates valid"));
        assert!(!line.contains("12ms"));
    }

    #[tokio::test]
    async fn test_render_loop_stops_after_finish() {
        let sink = EventSink::default();
        let handle = ConsoleRenderer::new(&sink).start_render_loop();
        sink.emit(PipelineEvent::Finished {
            success: true,
            total_ms: 5,
        });
        handle.await.unwrap();
    }
}
