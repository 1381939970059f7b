use anyhow::Context;
use clap::{CommandFactory, Parser};
use flexi_logger::style;
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Record};
use haplopop::cli::{self, Commands};
use haplopop::constants::*;
use haplopop::decoder::IlluminaNameDecoder;
use haplopop::pipeline;
use haplopop::utils::*;
use std::path::Path;
use std::time::Instant;
use sysinfo::System;

fn main() -> anyhow::Result<()> {
    let total_start_time = Instant::now();
    let args = cli::Cli::parse();

    if args.markdown_help {
        clap_markdown::print_help_markdown::<cli::Cli>();
        return Ok(());
    }

    match &args.command {
        Some(Commands::Process(process_args)) => {
            let config = process_args.to_config();
            let _logger = initialize_setup(&args, &config.out_dir)?;
            log::info!("Starting haplotype processing...");
            let summary = pipeline::run(&config).context("Processing run failed")?;
            log::info!(
                "Processed {} samples ({} passing), {} population haplotypes, {} clusters rescued",
                summary.samples.len(),
                summary.passing_samples.len(),
                summary.population_haplotypes,
                summary.rescue.rescued + summary.expected_rescue.rescued
            );
            log_memory_usage(true, "Finished");
            log::info!("Total time elapsed: {:?}", total_start_time.elapsed());
        }
        Some(Commands::Decode(decode_args)) => {
            let decoder = match &decode_args.pattern {
                Some(pattern) => IlluminaNameDecoder::new(pattern, decode_args.index)?,
                None => IlluminaNameDecoder::illumina()?,
            };
            for header in &decode_args.headers {
                println!("{}\t{}", header, decoder.get_index_value(header));
            }
        }
        None => {
            cli::Cli::command().print_help()?;
        }
    }
    Ok(())
}

fn my_own_format_colored(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    let mut paintlevel = record.level();
    if paintlevel == log::Level::Info {
        paintlevel = log::Level::Debug;
    }
    write!(
        w,
        "({}) {} [{}] {}",
        now.format(TS_DASHES_BLANK_COLONS_DOT_BLANK),
        style(paintlevel).paint(record.level().to_string()),
        record.module_path().unwrap_or(""),
        &record.args()
    )
}

fn my_own_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    write!(
        w,
        "({}) {} [{}] {}",
        now.format(TS_DASHES_BLANK_COLONS_DOT_BLANK),
        record.level(),
        record.module_path().unwrap_or(""),
        &record.args()
    )
}

fn initialize_setup(args: &cli::Cli, output_dir: &Path) -> anyhow::Result<flexi_logger::LoggerHandle> {
    if output_dir.exists() && !output_dir.is_dir() {
        anyhow::bail!(
            "Output directory {} exists and is not a directory",
            output_dir.display()
        );
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory {}", output_dir.display()))?;

    let log_spec = args.log_level_filter().to_string();
    let filespec = FileSpec::default()
        .directory(output_dir)
        .basename("haplopop");
    let handle = flexi_logger::Logger::try_with_str(log_spec)
        .context("Something went wrong with logging")?
        .log_to_file(filespec)
        .duplicate_to_stderr(Duplicate::Info)
        .format(my_own_format_colored)
        .format_for_files(my_own_format)
        .start()
        .context("Something went wrong with creating log file")?;

    let cli_args: Vec<String> = std::env::args().collect();
    log::info!("COMMAND: {}", cli_args.join(" "));
    log::info!("VERSION: {}", env!("CARGO_PKG_VERSION"));
    log::info!("SYSTEM NAME: {}", System::name().unwrap_or(format!("Unknown")));
    log::info!("SYSTEM HOST NAME: {}", System::host_name().unwrap_or(format!("Unknown")));
    Ok(handle)
}
