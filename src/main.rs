mod braces;
mod extract;
mod report;
mod resolve;
mod scanner;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use extract::{Diagnostic, ExtractOptions, Extraction};
use report::BatchReport;
use timeline_types::{RawEvent, Timeline, TimelineMode};

const OUTPUT_DIR: &str = "output";

#[derive(Parser)]
#[command(
    name = "timeline_extract",
    about = "Timeline event recovery from raw model output"
)]
struct Cli {
    /// Key of the record array inside the model's JSON
    #[arg(long, default_value = "events")]
    key: String,
    /// The completion was reported as stopped at its output-token limit
    #[arg(long)]
    length_limited: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Recover events from one captured completion → output/*.json
    Extract {
        /// Path to the captured raw model output
        input: PathBuf,
    },
    /// Process every capture file under a directory
    Batch {
        /// Directory of captured completions (*.txt, *.json)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Resolve years for an already-extracted record array
    Resolve {
        /// Path to a JSON array of raw event records
        input: PathBuf,
    },
    /// Print the cached run report
    Report,
}

fn main() {
    let cli = Cli::parse();
    let opts = ExtractOptions {
        array_key: cli.key,
        length_limited_stop: cli.length_limited,
    };

    match cli.command {
        Some(Command::Extract { input }) => run_extract(&input, &opts),
        Some(Command::Batch { dir }) => run_batch(&dir, &opts),
        Some(Command::Resolve { input }) => run_resolve(&input),
        Some(Command::Report) => run_report(),
        // Default: batch-process the current directory
        None => run_batch(Path::new("."), &opts),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  OUTPUT FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════

fn output_path(name: &str) -> PathBuf {
    Path::new(OUTPUT_DIR).join(name)
}

fn write_json<T: serde::Serialize>(name: &str, data: &T) {
    let path = output_path(name);
    let json = serde_json::to_string_pretty(data).expect("JSON serialization failed");
    std::fs::write(&path, &json).unwrap_or_else(|e| panic!("cannot write {}: {e}", path.display()));
    eprintln!("  {} ({} bytes)", path.display(), json.len());
}

fn read_json<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let path = output_path(name);
    let json = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("Cannot read {}: {e}", path.display());
        eprintln!("Run `extract` or `batch` first to generate it.");
        std::process::exit(1);
    });
    serde_json::from_str(&json).unwrap_or_else(|e| {
        eprintln!("Cannot parse {}: {e}", path.display());
        eprintln!("The JSON may be from an older format. Re-run the extraction.");
        std::process::exit(1);
    })
}

fn read_input(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Cannot read {}: {e}", path.display());
        std::process::exit(1);
    })
}

// ═══════════════════════════════════════════════════════════════════════
//  EXTRACT MODE: one captured completion → output/*.json
// ═══════════════════════════════════════════════════════════════════════

/// Per-capture outcome stored alongside the batch report.
#[derive(serde::Serialize, serde::Deserialize)]
struct CaptureResult {
    file: String,
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeline: Option<Timeline>,
}

fn run_extract(input: &Path, opts: &ExtractOptions) {
    let raw = read_input(input);
    eprintln!(
        "Processing {} ({} bytes, array key \"{}\")",
        input.display(),
        raw.len(),
        opts.array_key
    );

    let extraction = extract::extract_json(&raw, opts);
    let mut batch_report = BatchReport::default();
    batch_report.record_extraction(&extraction);

    let Some(timeline) = process_extraction(&extraction, opts, &mut batch_report) else {
        if let Extraction::Failed { diagnostic } = &extraction {
            print_failure(input, diagnostic);
        }
        std::process::exit(1);
    };

    batch_report.record_timeline(&timeline);
    print_run_banner(&extraction, &timeline);

    std::fs::create_dir_all(OUTPUT_DIR).expect("cannot create output/");
    write_json("events.json", &timeline);
    write_json("report.json", &batch_report);
}

/// Turn one extraction outcome into a resolved timeline, updating the
/// record-level counters. `None` only for total failure.
fn process_extraction(
    extraction: &Extraction,
    opts: &ExtractOptions,
    batch_report: &mut BatchReport,
) -> Option<Timeline> {
    let (raw_events, misshapen) = match extraction {
        Extraction::Clean { value }
        | Extraction::Repaired { value }
        | Extraction::Extracted { value } => report::events_from_value(value, &opts.array_key),
        Extraction::Salvaged { elements, .. } => report::events_from_elements(elements),
        Extraction::Failed { .. } => return None,
    };

    let (usable, unusable) = report::drop_unusable(raw_events);
    batch_report.records_dropped += misshapen + unusable;

    let resolved = resolve::resolve_years(&usable);
    Some(report::assemble_timeline(resolved))
}

fn print_run_banner(extraction: &Extraction, timeline: &Timeline) {
    eprintln!("\n══════════════════════════════════════════");
    eprintln!("  RECOVERY: {}", extraction.status());
    eprintln!("══════════════════════════════════════════");

    if let Extraction::Salvaged {
        elements,
        discarded,
        truncated,
    } = extraction
    {
        eprintln!(
            "\nWARNING: partial results: {} record(s) recovered, {} discarded{}",
            elements.len(),
            discarded,
            if *truncated {
                " (completion was truncated)"
            } else {
                ""
            }
        );
    }

    let dated = timeline
        .events
        .iter()
        .filter(|e| e.resolved_year.is_some())
        .count();
    let bc = timeline
        .events
        .iter()
        .filter(|e| e.resolved_year.is_some_and(|y| y < 0))
        .count();
    eprintln!(
        "\n{} event(s): {} dated ({} BC, {} AD), {} undated",
        timeline.events.len(),
        dated,
        bc,
        dated - bc,
        timeline.events.len() - dated
    );
    match timeline.mode {
        TimelineMode::Dated => eprintln!("Presentation: dated timeline"),
        TimelineMode::Numbered => {
            eprintln!("Presentation: numbered sequence (under half the records have usable years)")
        }
    }
    eprintln!();
}

fn print_failure(input: &Path, diagnostic: &Diagnostic) {
    eprintln!("\nNo usable JSON found in {}", input.display());
    if let Some(offset) = diagnostic.offset {
        eprintln!("  parse error near byte {offset}");
    }
    if let Some(snippet) = &diagnostic.snippet {
        eprintln!("  …{}…", snippet.replace('\n', " "));
    }
    eprintln!(
        "  braces: {} opened, {} closed",
        diagnostic.open_braces, diagnostic.close_braces
    );
    eprintln!("  The completion may have hit its token limit; retry with fewer requested events.");
}

// ═══════════════════════════════════════════════════════════════════════
//  BATCH MODE: every capture under a directory
// ═══════════════════════════════════════════════════════════════════════

fn run_batch(dir: &Path, opts: &ExtractOptions) {
    eprintln!("Scanning captures under: {}", dir.display());
    let captures = scanner::scan_captures(dir);
    if captures.is_empty() {
        eprintln!("No capture files (*.txt, *.json) found.");
        std::process::exit(1);
    }
    eprintln!("Found {} capture file(s)\n", captures.len());

    let mut batch_report = BatchReport::default();
    let mut results = Vec::new();

    for path in &captures {
        let raw = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("  skip {}: {e}", path.display());
                continue;
            }
        };

        let extraction = extract::extract_json(&raw, opts);
        batch_report.record_extraction(&extraction);

        let timeline = process_extraction(&extraction, opts, &mut batch_report);
        if let Some(t) = &timeline {
            batch_report.record_timeline(t);
        }

        let label = match &timeline {
            Some(t) => format!("{} event(s), {:?} mode", t.events.len(), t.mode),
            None => "no usable JSON".to_string(),
        };
        eprintln!("  [{}] {}: {}", extraction.status(), path.display(), label);

        results.push(CaptureResult {
            file: path.display().to_string(),
            status: extraction.status().to_string(),
            timeline,
        });
    }

    // ── Summary ────────────────────────────────────────────────────
    eprintln!("\n══════════════════════════════════════════");
    eprintln!("  BATCH SUMMARY");
    eprintln!("══════════════════════════════════════════");
    eprintln!(
        "\nRecovery: {} clean, {} repaired, {} extracted, {} salvaged, {} failed",
        batch_report.clean,
        batch_report.repaired,
        batch_report.extracted,
        batch_report.salvaged,
        batch_report.failed
    );
    eprintln!(
        "Events:   {} recovered, {} fragments discarded, {} records dropped",
        batch_report.events_recovered,
        batch_report.fragments_discarded,
        batch_report.records_dropped
    );
    eprintln!(
        "Years:    {} BC, {} AD, {} unresolved",
        batch_report.bc_years, batch_report.ad_years, batch_report.unresolved_years
    );
    eprintln!(
        "Output:   {} dated timeline(s), {} numbered sequence(s)\n",
        batch_report.dated_timelines, batch_report.numbered_timelines
    );

    std::fs::create_dir_all(OUTPUT_DIR).expect("cannot create output/");
    write_json("timelines.json", &results);
    write_json("report.json", &batch_report);
}

// ═══════════════════════════════════════════════════════════════════════
//  RESOLVE MODE: year resolution over an already-extracted array
// ═══════════════════════════════════════════════════════════════════════

fn run_resolve(input: &Path) {
    let raw = read_input(input);
    let records: Vec<RawEvent> = serde_json::from_str(&raw).unwrap_or_else(|e| {
        eprintln!("Cannot parse {} as a raw event array: {e}", input.display());
        std::process::exit(1);
    });

    let resolved = resolve::resolve_years(&records);
    let timeline = report::assemble_timeline(resolved);

    eprintln!(
        "Resolved {} record(s) → {:?} presentation",
        timeline.events.len(),
        timeline.mode
    );
    let json = serde_json::to_string_pretty(&timeline).expect("JSON serialization");
    println!("{json}");
}

// ═══════════════════════════════════════════════════════════════════════
//  REPORT MODE: print the cached run report
// ═══════════════════════════════════════════════════════════════════════

fn run_report() {
    let r: BatchReport = read_json("report.json");

    eprintln!("Run report ({} file(s) processed)", r.files);
    eprintln!(
        "  recovery: {} clean / {} repaired / {} extracted / {} salvaged / {} failed",
        r.clean, r.repaired, r.extracted, r.salvaged, r.failed
    );
    eprintln!(
        "  events:   {} recovered ({} BC, {} AD, {} undated)",
        r.events_recovered, r.bc_years, r.ad_years, r.unresolved_years
    );
    eprintln!(
        "  dropped:  {} fragments, {} records",
        r.fragments_discarded, r.records_dropped
    );
    eprintln!(
        "  output:   {} dated / {} numbered",
        r.dated_timelines, r.numbered_timelines
    );
}
