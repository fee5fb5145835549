//! bookscout CLI
//!
//! Command-line interface for maintaining the book catalog and probing
//! external sources for availability.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;
use tokio::sync::mpsc;

use bookscout_import::import_books_csv;
use bookscout_probe::{
    OpenLibraryProbe, ProbeEvent, RunOptions, RunReport, SourceProbe, probe_source,
};

#[derive(Parser)]
#[command(name = "bookscout")]
#[command(about = "Track a book catalog and check source availability", long_about = None)]
struct Cli {
    /// Path to the catalog database
    #[arg(short, long, global = true, default_value = "books.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import books and tags from a CSV export
    Import {
        /// Exported CSV file (identifier, title, read count, tags)
        file: PathBuf,
    },

    /// Probe a source for every book that still needs a check
    Probe {
        /// Source to probe
        #[arg(short, long, value_enum, default_value_t = ProbeTarget::OpenLibrary)]
        source: ProbeTarget,

        /// Probe all books, even those already checked against this source
        #[arg(short, long)]
        force: bool,

        /// Drop this source's existing verdicts before starting
        #[arg(short, long)]
        clear: bool,

        /// Number of concurrent probe workers
        #[arg(short = 'n', long, default_value_t = 10)]
        workers: usize,
    },

    /// Show every book with its per-source availability
    List,

    /// Show catalog statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeTarget {
    OpenLibrary,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import { file } => run_import(&cli.database, &file),
        Commands::Probe {
            source,
            force,
            clear,
            workers,
        } => run_probe(&cli.database, source, force, clear, workers),
        Commands::List => run_list(&cli.database),
        Commands::Stats => run_stats(&cli.database),
    }
}

fn open_database(path: &Path) -> Option<rusqlite::Connection> {
    match bookscout_db::open_database(path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!(
                "{} Error opening database {}: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                path.display(),
                e,
            );
            None
        }
    }
}

/// Run the import command.
fn run_import(database: &Path, file: &Path) -> ExitCode {
    let Some(conn) = open_database(database) else {
        return ExitCode::FAILURE;
    };

    let reader = match fs::File::open(file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!(
                "{} Error opening {}: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                file.display(),
                e,
            );
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Importing from: {}",
        file.display().if_supports_color(Stdout, |t| t.cyan()),
    );

    match import_books_csv(&conn, reader) {
        Ok(stats) => {
            println!(
                "{} {} books created, {} updated, {} tags attached",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                stats.created,
                stats.updated,
                stats.tags_added,
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(
                "{} Import failed: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                e,
            );
            ExitCode::FAILURE
        }
    }
}

/// Run the probe command.
fn run_probe(
    database: &Path,
    target: ProbeTarget,
    force: bool,
    clear: bool,
    workers: usize,
) -> ExitCode {
    let Some(conn) = open_database(database) else {
        return ExitCode::FAILURE;
    };

    let options = RunOptions {
        force,
        clear,
        concurrency: workers.clamp(1, 10),
        ..RunOptions::default()
    };

    if force {
        println!(
            "{}",
            "Force: probing books with existing verdicts too"
                .if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    if clear {
        println!(
            "{}",
            "Clearing existing verdicts for this source".if_supports_color(Stdout, |t| t.dimmed()),
        );
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!(
                "{} Failed to create tokio runtime: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                e,
            );
            return ExitCode::FAILURE;
        }
    };

    let report = rt.block_on(async {
        match target {
            ProbeTarget::OpenLibrary => {
                let probe = match OpenLibraryProbe::new() {
                    Ok(probe) => probe,
                    Err(e) => {
                        eprintln!(
                            "{} Failed to set up probe: {}",
                            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                            e,
                        );
                        return None;
                    }
                };
                drive_run(&conn, &probe, &options).await
            }
        }
    });

    let report = match report {
        Some(report) => report,
        None => return ExitCode::FAILURE,
    };

    print_report(&report);

    if report.fatal_failures() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Drive a probing run, rendering progress events as they arrive.
async fn drive_run<P: SourceProbe>(
    conn: &rusqlite::Connection,
    probe: &P,
    options: &RunOptions,
) -> Option<RunReport> {
    let source_name = probe.source().name.clone();
    println!(
        "Probing {} against {}",
        "catalog".if_supports_color(Stdout, |t| t.bold()),
        source_name.if_supports_color(Stdout, |t| t.cyan()),
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let run = probe_source(conn, probe, options, event_tx);
    tokio::pin!(run);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("  [{bar:30.cyan}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    // The run and its event stream advance together; keep draining events
    // until the run future settles, then flush whatever is left queued.
    let mut result = None;
    while result.is_none() {
        tokio::select! {
            run_result = &mut run => result = Some(run_result),
            event = event_rx.recv() => {
                if let Some(event) = event {
                    render_event(&pb, event);
                }
            }
        }
    }
    while let Ok(event) = event_rx.try_recv() {
        render_event(&pb, event);
    }
    pb.finish_and_clear();

    match result {
        Some(Ok(report)) => Some(report),
        Some(Err(e)) => {
            eprintln!(
                "{} Run aborted: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                e,
            );
            None
        }
        None => None,
    }
}

/// Render one progress event onto the bar.
fn render_event(pb: &ProgressBar, event: ProbeEvent) {
    match event {
        ProbeEvent::WorklistReady { total } => {
            pb.set_length(total as u64);
            pb.println(format!("  {} books to probe", total));
        }
        ProbeEvent::BookStarted { title, .. } => {
            pb.set_message(title);
        }
        ProbeEvent::BookRecorded {
            title,
            present,
            price,
            ..
        } => {
            pb.inc(1);
            let verdict = if present {
                match price {
                    Some(price) => format!(
                        "{} ({price:.2})",
                        "found".if_supports_color(Stdout, |t| t.green()),
                    ),
                    None => format!("{}", "found".if_supports_color(Stdout, |t| t.green())),
                }
            } else {
                format!("{}", "not found".if_supports_color(Stdout, |t| t.dimmed()))
            };
            pb.println(format!(
                "  {} {}: {}",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                title,
                verdict,
            ));
        }
        ProbeEvent::BookFailed { title, reason, .. } => {
            pb.inc(1);
            pb.println(format!(
                "  {} {}: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                title,
                reason,
            ));
        }
        ProbeEvent::BookSkipped { .. } => {
            pb.inc(1);
        }
        ProbeEvent::Cancelling { failed } => {
            pb.println(format!(
                "  {} {} failures; pending books will not start",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                failed,
            ));
        }
        ProbeEvent::Done => {}
    }
}

/// Print the overall run summary.
fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Summary:".if_supports_color(Stdout, |t| t.bold()));
    println!(
        "  {} {} recorded ({} found)",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        report.recorded(),
        report.found(),
    );
    if report.failed() > 0 {
        println!(
            "  {} {} failed ({} fatal)",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
            report.failed(),
            report.fatal_failures(),
        );
    }
    if report.skipped() > 0 {
        println!(
            "  {} {} skipped",
            "?".if_supports_color(Stdout, |t| t.yellow()),
            report.skipped(),
        );
    }
}

/// Run the list command.
fn run_list(database: &Path) -> ExitCode {
    let Some(conn) = open_database(database) else {
        return ExitCode::FAILURE;
    };

    let books = match bookscout_db::list_books(&conn) {
        Ok(books) => books,
        Err(e) => {
            eprintln!(
                "{} Error listing books: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                e,
            );
            return ExitCode::FAILURE;
        }
    };

    if books.is_empty() {
        println!(
            "{}",
            "No books in the catalog. Run 'bookscout import <file>' first."
                .if_supports_color(Stdout, |t| t.dimmed()),
        );
        return ExitCode::SUCCESS;
    }

    for book in &books {
        let read_marker = if book.read {
            format!("{}", "\u{2714}".if_supports_color(Stdout, |t| t.green()))
        } else {
            " ".to_string()
        };
        println!(
            "{} {}",
            read_marker,
            book.title.if_supports_color(Stdout, |t| t.bold()),
        );

        let verdicts = match bookscout_db::availability_for_book(&conn, book) {
            Ok(verdicts) => verdicts,
            Err(e) => {
                eprintln!(
                    "  {} Error reading availability: {}",
                    "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                    e,
                );
                return ExitCode::FAILURE;
            }
        };

        if verdicts.is_empty() {
            println!(
                "    {}",
                "not checked against any source".if_supports_color(Stdout, |t| t.dimmed()),
            );
            continue;
        }

        for (source, availability) in &verdicts {
            let verdict = if availability.present {
                match availability.price {
                    Some(price) => format!(
                        "{} ({price:.2})",
                        "available".if_supports_color(Stdout, |t| t.green()),
                    ),
                    None => format!("{}", "available".if_supports_color(Stdout, |t| t.green())),
                }
            } else {
                format!(
                    "{}",
                    "not available".if_supports_color(Stdout, |t| t.dimmed())
                )
            };
            println!(
                "    {} {}",
                format!("{}:", source.name).if_supports_color(Stdout, |t| t.cyan()),
                verdict,
            );
        }
    }

    ExitCode::SUCCESS
}

/// Run the stats command.
fn run_stats(database: &Path) -> ExitCode {
    let Some(conn) = open_database(database) else {
        return ExitCode::FAILURE;
    };

    let stats = match bookscout_db::catalog_stats(&conn) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!(
                "{} Error reading statistics: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                e,
            );
            return ExitCode::FAILURE;
        }
    };

    println!("{}", "Catalog:".if_supports_color(Stdout, |t| t.bold()));
    println!("  Books:      {} ({} read)", stats.books, stats.books_read);
    println!("  Tags:       {}", stats.tags);
    println!("  Challenges: {}", stats.challenges);
    println!();
    println!("{}", "Availability:".if_supports_color(Stdout, |t| t.bold()));
    println!("  Sources:    {}", stats.sources);
    println!(
        "  Verdicts:   {} ({} found)",
        stats.verdicts, stats.verdicts_found,
    );

    ExitCode::SUCCESS
}
