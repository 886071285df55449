use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use fbaccel::config::FbAccelConfig;
use fbaccel::selftest::TestStatus;
use fbaccel::{BlitRequest, Blitter, Decision, DeviceContext, FillRequest};

#[derive(Parser)]
#[command(
    name = "fbaccel",
    about = "Framebuffer copyarea/fillrect acceleration probe and tool",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $FBACCEL_CONFIG, then /etc/fbaccel/fbaccel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Framebuffer device, overrides the config file
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the device's acceleration capabilities and geometry
    Probe {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Copy a rectangle within the framebuffer
    Copy {
        #[arg(long)]
        sx: i32,
        #[arg(long)]
        sy: i32,
        #[arg(long)]
        dx: i32,
        #[arg(long)]
        dy: i32,
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,
    },

    /// Fill a rectangle of the framebuffer with a packed pixel value
    Fill {
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,
        /// Pixel value in the framebuffer's format, e.g. 0xff0000
        #[arg(long, value_parser = parse_color)]
        color: u32,
    },

    /// Print the effective configuration
    Config,
}

fn parse_color(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid color '{}': {}", s, e))
}

#[derive(Serialize)]
struct OpOutcome {
    decision: Decision,
    success: bool,
}

fn init_tracing(cfg: &FbAccelConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cfg.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_context(cfg: &FbAccelConfig) -> Result<DeviceContext> {
    let ctx = DeviceContext::init(Some(&cfg.device.path), None)
        .with_context(|| format!("failed to initialize {}", cfg.device.path.display()))?;
    ctx.apply_thresholds(&cfg.thresholds);
    Ok(ctx)
}

fn report_outcome(outcome: &OpOutcome) -> Result<()> {
    println!("{}", serde_json::to_string(outcome)?);
    if !outcome.success {
        bail!("operation was not accelerated");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => FbAccelConfig::load(path)?,
        None => FbAccelConfig::load_or_default(),
    };
    if let Some(device) = cli.device {
        cfg.device.path = device;
    }

    init_tracing(&cfg);

    match cli.command {
        Commands::Probe { json } => {
            tracing::info!(device = %cfg.device.path.display(), "Running acceleration self-test");
            let report = fbaccel::selftest::run(&cfg.device.path, &cfg.thresholds);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nfbaccel self-test: {}", report.device.display());
                println!("{:<12} | {:<6} | Details", "Component", "Status");
                println!("{:-<12}-|-{:-<6}-|-{:-<40}", "", "", "");
                for res in &report.results {
                    let status_str = match res.status {
                        TestStatus::Pass => "PASS",
                        TestStatus::Fail => "FAIL",
                        TestStatus::Warning => "WARN",
                        TestStatus::Skipped => "SKIP",
                    };
                    println!("{:<12} | {:<6} | {}", res.component, status_str, res.details);
                    if let Some(rem) = &res.remediation {
                        println!("{:<12} | {:<6} |   -> {}", "", "", rem);
                    }
                }
            }
            if !report.is_ready() {
                bail!("framebuffer acceleration unavailable on {}", report.device.display());
            }
        }
        Commands::Copy {
            sx,
            sy,
            dx,
            dy,
            width,
            height,
        } => {
            let ctx = open_context(&cfg)?;
            let g = ctx.geometry();
            let fb = ctx.framebuffer();
            let req = BlitRequest {
                src: fb,
                dst: fb,
                src_stride: g.stride_words as i32,
                dst_stride: g.stride_words as i32,
                src_bpp: g.bits_per_pixel as i32,
                dst_bpp: g.bits_per_pixel as i32,
                src_x: sx,
                src_y: sy,
                dst_x: dx,
                dst_y: dy,
                width,
                height,
            };
            let outcome = OpOutcome {
                decision: ctx.plan_copy(&req),
                success: ctx.blit(&req),
            };
            ctx.close();
            report_outcome(&outcome)?;
        }
        Commands::Fill {
            x,
            y,
            width,
            height,
            color,
        } => {
            let ctx = open_context(&cfg)?;
            let g = ctx.geometry();
            let req = FillRequest {
                dst: ctx.framebuffer(),
                dst_stride: g.stride_words as i32,
                dst_bpp: g.bits_per_pixel as i32,
                dst_x: x,
                dst_y: y,
                width,
                height,
                color,
            };
            let decision = ctx.plan_fill(&req);
            let success = match ctx.filler() {
                Some(filler) => filler.fill(&req),
                None => false,
            };
            ctx.close();
            report_outcome(&OpOutcome { decision, success })?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}
