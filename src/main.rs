// PRICEBOOK - fill quotation workbooks with product images from vendor pricebooks
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricebook_imager::automation::{self, FillOptions};
use pricebook_imager::pdf_extraction::parse_pdf;
use pricebook_imager::sku_report;
use pricebook_imager::Config;

#[derive(Parser, Debug)]
#[command(name = "pricebook", author, version, about)]
struct Cli {
    /// TOML config file (falls back to $PRICEBOOK_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert pricebook images into the workbook rows with matching codes
    FillImages {
        #[arg(long)]
        excel: PathBuf,
        #[arg(long)]
        pdf: PathBuf,
        /// Save to this path instead of overwriting the workbook
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep the extracted PNG files
        #[arg(long)]
        keep_images: bool,
        /// Directory for the PDF/Excel SKU export files
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Create or update the summary sheet
    CreateSummary {
        #[arg(long)]
        excel: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove every picture from the workbook
    ClearImages {
        #[arg(long)]
        excel: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse a pricebook and list the SKUs found
    Parse {
        #[arg(long)]
        pdf: PathBuf,
        /// Print the SKU map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare PDF and Excel SKU exports
    CompareSkus {
        #[arg(long)]
        pdf_export: PathBuf,
        #[arg(long)]
        excel_export: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "pricebook_imager=debug,pricebook=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::FillImages {
            excel,
            pdf,
            output,
            keep_images,
            export_dir,
        } => {
            let options = FillOptions {
                output,
                keep_images,
                export_dir,
            };
            let report = automation::fill_images_from_pdf(&excel, &pdf, &config, &options)
                .with_context(|| format!("Filling images into {}", excel.display()))?;

            println!("{}", "=".repeat(60));
            println!(
                "PDF SKUs: {} ({} with images), images extracted: {}",
                report.pdf_skus, report.pdf_skus_with_images, report.images_extracted
            );
            println!("Excel SKUs: {}", report.excel_skus);
            println!(
                "Completed: inserted {} images into '{}'",
                report.images_inserted,
                report.saved_to.display()
            );
            if let Some(dir) = &report.image_dir {
                println!("Images kept in {}", dir.display());
            }
            if let Some((pdf_export, excel_export)) = &report.exports {
                println!("Exports: {} / {}", pdf_export.display(), excel_export.display());
            }
        }
        Commands::CreateSummary { excel, output } => {
            let report = automation::create_summary(&excel, output.as_deref(), &config)
                .with_context(|| format!("Building summary for {}", excel.display()))?;
            match (report.outcome, report.saved_to) {
                (Some(outcome), Some(saved_to)) => {
                    for totals in &outcome.totals {
                        println!("{:<25} {:>15.0} {:>15.0}", totals.sheet_name, totals.mrp, totals.offer);
                    }
                    println!("{:<25} {:>15.0} {:>15.0}", "TOTAL", outcome.total_mrp, outcome.total_offer);
                    println!(
                        "Completed: summary sheet '{}' updated in '{}'",
                        outcome.sheet_name,
                        saved_to.display()
                    );
                }
                _ => anyhow::bail!("No summary data created: no sheet has a total row"),
            }
        }
        Commands::ClearImages { excel, output } => {
            let (saved_to, removed) = automation::clear_images(&excel, output.as_deref(), &config)
                .with_context(|| format!("Clearing images from {}", excel.display()))?;
            println!("Cleared {} images from {}", removed, saved_to.display());
        }
        Commands::Parse { pdf, json } => parse_command(&pdf, json, &config)?,
        Commands::CompareSkus {
            pdf_export,
            excel_export,
        } => {
            for path in [&pdf_export, &excel_export] {
                if !path.exists() {
                    anyhow::bail!("Export file not found: {}. Run fill-images with --export-dir first.", path.display());
                }
            }
            let report = sku_report::compare(&pdf_export, &excel_export)?;
            print!("{}", report);
        }
    }

    Ok(())
}

fn parse_command(pdf: &Path, json: bool, config: &Config) -> Result<()> {
    let skus = parse_pdf(pdf, config).with_context(|| format!("Parsing {}", pdf.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&skus)?);
        return Ok(());
    }

    for entry in skus.values() {
        let image = match &entry.image {
            Some(img) => format!("p{} {}", img.page, img.name),
            None => "-".to_string(),
        };
        println!(
            "{:<20} {:<20} p{:<4} {:<12} {:<16} {}",
            entry.sku, entry.normalized, entry.page, entry.mrp, image, entry.description
        );
    }
    let with_images = skus.values().filter(|e| e.has_image()).count();
    println!("{} SKUs, {} with images", skus.len(), with_images);
    Ok(())
}
