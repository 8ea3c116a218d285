//! web2pdf command line
//!
//! Captures web pages to PDF, handing CAPTCHAs to a human in a visible
//! browser window.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use web2pdf::browser::{ChromeSessionFactory, WaitUntil};
use web2pdf::capture::{
    site_rules, BatchEvent, BatchRunner, CaptureOptions, FileNaming, OutputMode,
    PageLayout,
};
use web2pdf::prompt::TerminalNotifier;

/// Web page to PDF capture with human CAPTCHA handoff
#[derive(Parser, Debug)]
#[command(name = "web2pdf")]
#[command(version)]
#[command(about = "Capture web pages to PDF, with human CAPTCHA handoff")]
struct Args {
    /// URLs to capture, in order
    urls: Vec<String>,

    /// File with one URL per line (blank lines and # comments ignored)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Output mode
    #[arg(long, value_enum, default_value_t = OutputMode::Screenshot)]
    mode: OutputMode,

    /// Page layout
    #[arg(long, value_enum, default_value_t = PageLayout::PaginatedLetter)]
    layout: PageLayout,

    /// Viewport width in CSS pixels
    #[arg(long, default_value_t = 1366)]
    viewport_width: u32,

    /// Device pixel ratio
    #[arg(long, default_value_t = 1.0)]
    dpr: f64,

    /// Extra delay before capture, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Navigation completion criterion
    #[arg(long, value_enum, default_value_t = WaitUntil::NetworkIdle)]
    wait_until: WaitUntil,

    /// Navigation timeout in milliseconds
    #[arg(long, default_value_t = 45_000)]
    timeout_ms: u64,

    /// User agent override
    #[arg(long)]
    user_agent: Option<String>,

    /// Launch Chromium without its sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Name files by URL plus timestamp instead of host and path
    #[arg(long)]
    timestamped: bool,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Leave cookie/consent banners in place
    #[arg(long)]
    keep_cookie_banners: bool,

    /// Leave sticky headers and footers in place
    #[arg(long)]
    keep_sticky: bool,

    /// CSS file injected into every page
    #[arg(long)]
    css_file: Option<PathBuf>,

    /// JS file executed on every page
    #[arg(long)]
    js_file: Option<PathBuf>,

    /// Per-site overrides file (@domain / CSS: / JS: / @end blocks)
    #[arg(long)]
    site_rules: Option<PathBuf>,

    /// Tallest page, in inches, printed as one exact page in single layout
    #[arg(long, default_value_t = 199.0)]
    single_page_max_inches: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_text(path: &Option<PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(String::new()),
    }
}

fn collect_urls(args: &Args) -> anyhow::Result<Vec<String>> {
    let mut urls = args.urls.clone();
    let listed = read_text(&args.urls_file)?;
    urls.extend(
        listed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string),
    );
    Ok(urls)
}

fn build_options(args: &Args) -> anyhow::Result<CaptureOptions> {
    let rules = site_rules::parse(&read_text(&args.site_rules)?);
    let mut builder = CaptureOptions::builder()
        .mode(args.mode)
        .layout(args.layout)
        .viewport_width(args.viewport_width)
        .device_scale_factor(args.dpr)
        .delay_ms(args.delay_ms)
        .wait_until(args.wait_until)
        .timeout_ms(args.timeout_ms)
        .no_sandbox(args.no_sandbox)
        .naming(if args.timestamped {
            FileNaming::Timestamped
        } else {
            FileNaming::FromUrl
        })
        .output_dir(args.output_dir.clone())
        .hide_cookie_banners(!args.keep_cookie_banners)
        .unstick_bars(!args.keep_sticky)
        .global_css(read_text(&args.css_file)?)
        .global_js(read_text(&args.js_file)?)
        .site_rules(rules)
        .single_page_max_inches(args.single_page_max_inches);
    if let Some(ref ua) = args.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    if let Some(ref path) = args.chrome_path {
        builder = builder.chrome_path(path.clone());
    }
    Ok(builder.build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let urls = collect_urls(&args)?;
    if urls.is_empty() {
        bail!("no URLs given; pass them as arguments or with --urls-file");
    }
    let options = build_options(&args)?;

    let runner = BatchRunner::new(Arc::new(ChromeSessionFactory), Arc::new(TerminalNotifier));
    let mut handle = runner.spawn(urls, options);

    let control = handle.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && control.request_stop() {
            eprintln!("Stopping after the current URL...");
        }
    });

    while let Some(event) = handle.events.recv().await {
        match event {
            BatchEvent::UrlStarted { index, total, url } => {
                println!("=== [{}/{}] {}", index, total, url)
            }
            BatchEvent::ChallengeDetected { url, detection } => println!(
                "CAPTCHA ({}) on {}: {}",
                detection.provider,
                url,
                detection.signals.join(", ")
            ),
            BatchEvent::UrlSucceeded(result) => println!(
                "Saved {} ({})",
                result.output_path.display(),
                result.strategy
            ),
            BatchEvent::UrlFailed(failure) => println!("FAILED {}: {}", failure.url, failure.cause),
            BatchEvent::StateChanged(_) => {}
            BatchEvent::Finished { succeeded, failed } => {
                println!("Done: {} saved, {} failed", succeeded, failed)
            }
        }
    }

    let report = handle.join().await.context("batch failed")?;
    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
