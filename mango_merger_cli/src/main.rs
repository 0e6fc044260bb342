//! # mango_merger_cli
//!
//! Part of the mango_merger crate family.
//!
//! Command line application which annotates MANGO run files with logbook and
//! environmental data and merges runs taken under the same conditions.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! mango_merger_cli -p config.yml new
//! ```
//!
//! edit it, then run the pipeline with
//!
//! ```bash
//! mango_merger_cli -p config.yml
//! ```
//!
//! Paths and stages of the configuration can be overridden from the command line, see
//! `mango_merger_cli --help`. Everything logged is also written to `mango_merger.log`.
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use libmango_merger::config::Config;
use libmango_merger::process::process;
use libmango_merger::worker_status::{BarColor, Stage, WorkerStatus};

const BAR_LENGTH: u64 = 100;

/// The default logger writes to the console and the log file. While progress bars are drawn
/// the file-only logger is installed instead, so log lines do not tear the bars.
struct Loggers {
    full: Arc<spdlog::Logger>,
    file_only: Arc<spdlog::Logger>,
}

fn init_logging(verbose: bool) -> Loggers {
    let file_sink: Arc<dyn spdlog::sink::Sink> = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./mango_merger.log"))
            .formatter(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            ))
            .truncate(true)
            .build()
            .expect("Could not create the log file!"),
    );
    let level = if verbose {
        spdlog::Level::Debug
    } else {
        spdlog::Level::Info
    };
    // Keep the console sinks of the default logger next to the file
    let mut builder = spdlog::Logger::builder();
    for sink in spdlog::default_logger().sinks() {
        builder.sink(sink.clone());
    }
    let full = Arc::new(
        builder
            .sink(file_sink.clone())
            .level_filter(spdlog::LevelFilter::MoreSevereEqual(level))
            .flush_level_filter(spdlog::LevelFilter::All)
            .build()
            .expect("Could not create the logger!"),
    );
    let file_only = Arc::new(
        spdlog::Logger::builder()
            .sink(file_sink)
            .level_filter(spdlog::LevelFilter::MoreSevereEqual(level))
            .flush_level_filter(spdlog::LevelFilter::All)
            .build()
            .expect("Could not create the logger!"),
    );
    spdlog::set_default_logger(full.clone());
    Loggers { full, file_only }
}

fn make_bar(pb_manager: &MultiProgress, stage: Stage) -> ProgressBar {
    let color = match stage.color() {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::GREEN => "green",
    };
    let template =
        format!("{{prefix:>12.{color}.bold}} [{{bar:40.{color}/blue}}] {{percent:>3}}% {{msg}}");
    let style = ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = pb_manager.add(ProgressBar::new(BAR_LENGTH));
    pb.set_style(style);
    pb.set_prefix(stage.name());
    pb
}

/// Apply the command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(logbook) = matches.get_one::<String>("logbook") {
        config.logbook.path = PathBuf::from(logbook);
    }
    if let Some(source) = matches.get_one::<String>("source") {
        config.source_folder = PathBuf::from(source);
    }
    if let Some(target) = matches.get_one::<String>("target") {
        config.target_folder = PathBuf::from(target);
    }
    if matches.get_flag("compress") {
        config.merge = true;
    }
    if matches.get_flag("env") {
        config.annotation.enabled = true;
    }
}

fn cli() -> Command {
    Command::new("mango_merger_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("logbook")
                .short('l')
                .long("logbook")
                .help("Override the logbook path"),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .help("Override the folder holding the per-run files"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .help("Override the folder merged files are written to"),
        )
        .arg(
            Arg::new("compress")
                .short('c')
                .long("compress")
                .action(ArgAction::SetTrue)
                .help("Merge runs that share conditions"),
        )
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .action(ArgAction::SetTrue)
                .help("Annotate run files with logbook and environmental data"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log debug messages"),
        )
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    let loggers = init_logging(matches.get_flag("verbose"));

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!("Making a template config at {}...", config_path.display());
        return match Config::default().write_config_file(&config_path) {
            Ok(()) => {
                spdlog::info!("Done.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                spdlog::error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.display());
    let mut config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut config, &matches);
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Logbook: {}", config.logbook.path.display());
    spdlog::info!("Source folder: {}", config.source_folder.display());
    spdlog::info!("Target folder: {}", config.target_folder.display());
    match &config.env_log {
        Some(env) => spdlog::info!("Environmental log: {}", env.path.display()),
        None => spdlog::info!("Environmental log: None"),
    }
    spdlog::info!(
        "Annotate: {} Merge: {} Clean target: {}",
        config.annotation.enabled,
        config.merge,
        config.clean_target
    );

    spdlog::info!("Progress is shown below; see mango_merger.log for details while running.");
    spdlog::set_default_logger(loggers.file_only.clone());

    // Setup the progress bars, one per stage as it starts
    let pb_manager = MultiProgress::new();
    let mut bars: Vec<(Stage, ProgressBar)> = Vec::new();
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(&config, &tx));

    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(status) => {
                let pb = match bars.iter().find(|(stage, _)| *stage == status.stage) {
                    Some((_, pb)) => pb.clone(),
                    None => {
                        let pb = make_bar(&pb_manager, status.stage);
                        bars.push((status.stage, pb.clone()));
                        pb
                    }
                };
                pb.set_position((status.progress * BAR_LENGTH as f32) as u64);
                pb.set_message(status.label);
            }
            Err(RecvTimeoutError::Timeout) => (),
            // The worker dropped its sender, so it is done
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for (_, pb) in bars.iter() {
        pb.finish();
    }
    spdlog::set_default_logger(loggers.full.clone());

    match handle.join() {
        Ok(Ok(summary)) => {
            if let Some(report) = &summary.annotation {
                for (run, e) in report.failed.iter() {
                    spdlog::warn!("Run {run} was not annotated: {e}");
                }
            }
            spdlog::info!(
                "Processed {} logbook records and wrote {} merged files.",
                summary.n_records,
                summary.merged.len()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            spdlog::error!("Merging failed with error: {e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            spdlog::error!("Failed to join merging task!");
            ExitCode::FAILURE
        }
    }
}
