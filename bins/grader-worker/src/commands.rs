use anyhow::{Context, Result};
use grader_common::types::{GradeRequest, GradeResponse, Submission};
use grader_engine::config::GraderConfig;
use grader_engine::executor::grade_payload;
use grader_engine::isolation::serve_child;
use grader_engine::synthesizer::synthesize;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use tracing::{debug, info};

fn read_event(event: Option<&Path>) -> Result<Vec<u8>> {
    match event {
        Some(path) => {
            fs::read(path).with_context(|| format!("Failed to read event {}", path.display()))
        }
        None => {
            let mut payload = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut payload)
                .context("Failed to read event from stdin")?;
            Ok(payload)
        }
    }
}

fn write_response<W: Write>(out: &mut W, response: &GradeResponse, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, response)?;
    } else {
        serde_json::to_writer(&mut *out, response)?;
    }
    writeln!(out)?;
    out.flush().context("Failed to flush response")?;
    Ok(())
}

/// Grade a single event
pub fn handle(config: &GraderConfig, event: Option<&Path>, pretty: bool) -> Result<()> {
    let payload = read_event(event)?;
    debug!(bytes = payload.len(), "Event received");

    let response = grade_payload(&payload, config);

    let stdout = io::stdout();
    write_response(&mut stdout.lock(), &response, pretty)
}

/// Grade one event per stdin line until EOF
pub fn serve(config: &GraderConfig) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut handled = 0usize;

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read event line")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = grade_payload(line.as_bytes(), config);
        write_response(&mut out, &response, false)?;
        handled += 1;
    }

    info!(events = handled, "Input closed; worker exiting");
    Ok(())
}

/// Print the synthesized source of an event's submission
pub fn synth(event: Option<&Path>) -> Result<()> {
    let payload = read_event(event)?;
    let request: GradeRequest =
        serde_json::from_slice(&payload).context("Failed to decode grade request")?;

    let unit = synthesize(&Submission::from(&request));
    debug!(signature = %unit.signature(), "Unit synthesized");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(unit.source.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Child side of subprocess isolation
pub fn invoke_child() -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_child(stdin.lock(), stdout.lock())
}
