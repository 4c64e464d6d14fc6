use std::path::Path;

use crate::config::EngineConfig;
use crate::container::{ContainerReader, ContainerWriter, ReadOutcome};
use crate::error::EngineError;

/// Copy the access-units between `start_millis` and `end_millis` into a new
/// container without re-encoding.
///
/// The cut starts at the nearest sync point at or before `start_millis`, so
/// boundaries snap to the container's sync granularity. Timestamps are
/// rebased so the output starts at zero.
pub fn trim(
    input: &Path,
    output: &Path,
    start_millis: u64,
    end_millis: u64,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let result = trim_inner(input, output, start_millis, end_millis, config);
    if result.is_err() {
        super::discard_output(output);
    }
    result
}

fn trim_inner(
    input: &Path,
    output: &Path,
    start_millis: u64,
    end_millis: u64,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let mut reader = ContainerReader::open(input)?;
    let track_format = reader.track_format(config.bit_rate)?;
    reader.select_track();

    let sink = super::create_output(output)?;
    let mut writer = ContainerWriter::create(sink)?;
    writer.add_track(&track_format)?;
    writer.start()?;

    let mut end_micros = end_millis.saturating_mul(1000) as i64;
    let duration_micros = reader.metadata().duration_micros();
    if duration_micros > 0 {
        end_micros = end_micros.min(duration_micros);
    }
    let base_micros = if start_millis > 0 {
        reader.seek(start_millis.saturating_mul(1000) as i64)?
    } else {
        0
    };

    let mut copied = 0u64;
    let mut buf = Vec::new();
    loop {
        match reader.read_next_access_unit(&mut buf)? {
            ReadOutcome::EndOfStream => break,
            ReadOutcome::Unit { size } => {
                let pts = reader.current_timestamp_micros();
                if pts > end_micros {
                    break;
                }
                let flags = reader.current_flags();
                writer.write_access_unit(&buf[..size], (pts - base_micros).max(0), flags)?;
                copied += 1;
                reader.advance();
            }
        }
    }
    writer.finalize()?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        start_millis,
        end_millis,
        units = copied,
        "trimmed by stream copy"
    );
    Ok(())
}
