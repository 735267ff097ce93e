use crate::types::ConversionSummary;
use anyhow::Result;

/// Format a count with thousands separators
fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format duration in seconds to HH:MM:SS.mmm
fn format_duration(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

/// Print human-readable summary
pub fn print_summary(summary: &ConversionSummary) {
    if let Some(output) = &summary.output {
        println!("\nArchive:         {}", output.display());
    }
    println!("Ranks:           {}", summary.world_size);
    match summary.duration_seconds {
        Some(seconds) => println!("Duration:        {}", format_duration(seconds)),
        None => println!("Duration:        unknown (clock resolution not set)"),
    }
    println!(
        "Ticks:           {} .. {}",
        summary.start_ticks, summary.stop_ticks
    );
    println!("Events:          {}", format_count(summary.total_events));
    println!("Regions:         {}", summary.regions);
    println!("Communicators:   {}", summary.communicators);

    let errors = summary.total_errors();
    if errors > 0 {
        println!("Skipped errors:  {}", errors);
    }

    println!("\nPer-rank events:");
    for rank in &summary.ranks {
        let mut notes = Vec::new();
        if rank.pending_requests > 0 {
            notes.push(format!("{} pending requests", rank.pending_requests));
        }
        if rank.errors > 0 {
            notes.push(format!("{} errors", rank.errors));
        }
        println!(
            "  rank {:5}  {:>12} events  {:>8} calls  {}",
            rank.rank,
            format_count(rank.events),
            format_count(rank.calls),
            notes.join(", ")
        );
    }
    println!();
}

/// Print JSON output
pub fn print_json(summary: &ConversionSummary) -> Result<()> {
    let value = serde_json::to_value(summary)?;
    println!("{}", colored_json::to_colored_json_auto(&value)?);
    Ok(())
}
