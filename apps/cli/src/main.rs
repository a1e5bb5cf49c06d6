mod commands;
mod logging;
mod scanner;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use core_types::{Anchor, ExportFormat, NamingPolicy, Rgb};

#[derive(Parser)]
#[command(name = "photomark")]
#[command(author, version, about = "Add text or image watermarks to photos in bulk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding saved templates and the last-used configuration
    #[arg(long, global = true, env = "PHOTOMARK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark images and folders into an output directory
    #[command(visible_alias = "a")]
    Apply(ApplyArgs),

    /// Render one image at preview size into a PNG
    #[command(visible_alias = "p")]
    Preview(PreviewArgs),

    /// Manage saved templates
    #[command(subcommand)]
    Templates(TemplateCommand),

    /// List installed font families
    Fonts,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Image files or folders (scanned recursively)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub watermark: WatermarkArgs,

    #[command(flatten)]
    pub export: ExportArgs,

    /// Store the effective configuration as a named template
    #[arg(long)]
    pub save_template: Option<String>,
}

#[derive(Args)]
pub struct PreviewArgs {
    pub input: PathBuf,

    /// PNG file to write
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long, default_value = "400")]
    pub max_width: u32,

    #[arg(long, default_value = "300")]
    pub max_height: u32,

    #[command(flatten)]
    pub watermark: WatermarkArgs,
}

#[derive(Args, Debug, Default)]
pub struct WatermarkArgs {
    /// Start from a saved template
    #[arg(short, long, conflicts_with = "last")]
    pub template: Option<String>,

    /// Start from the configuration of the previous run
    #[arg(long)]
    pub last: bool,

    /// Watermark text
    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub font: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    pub size: Option<f32>,

    #[arg(long)]
    pub bold: bool,

    #[arg(long)]
    pub italic: bool,

    /// Text color, e.g. #FF8800
    #[arg(long)]
    pub color: Option<Rgb>,

    /// Text opacity in percent
    #[arg(long)]
    pub opacity: Option<f32>,

    /// Image watermark; takes precedence over text
    #[arg(long, conflicts_with = "no_image")]
    pub image: Option<PathBuf>,

    /// Drop an image watermark inherited from a template
    #[arg(long)]
    pub no_image: bool,

    /// Image watermark scale in percent
    #[arg(long)]
    pub scale: Option<f32>,

    /// Image watermark opacity in percent
    #[arg(long)]
    pub image_opacity: Option<f32>,

    /// Placement anchor, e.g. bottom-right
    #[arg(long)]
    pub anchor: Option<Anchor>,

    /// Custom x offset in pixels (implies --anchor custom)
    #[arg(short, long, allow_negative_numbers = true)]
    pub x: Option<i64>,

    /// Custom y offset in pixels (implies --anchor custom)
    #[arg(short, long, allow_negative_numbers = true)]
    pub y: Option<i64>,

    /// Clockwise rotation in degrees, -180..=180
    #[arg(long, allow_negative_numbers = true)]
    pub rotation: Option<f32>,

    /// Accept a font that covers only some of the characters
    #[arg(long)]
    pub lenient_fonts: bool,
}

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// png or jpeg
    #[arg(short, long)]
    pub format: Option<ExportFormat>,

    /// JPEG quality, 0-100
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// original, prefix or suffix
    #[arg(long)]
    pub naming: Option<NamingPolicy>,

    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub suffix: Option<String>,

    /// Resize output to this percentage of the source
    #[arg(long, conflicts_with_all = ["fit_width", "fit_height"])]
    pub resize_percent: Option<f32>,

    /// Fit output inside this width (with --fit-height)
    #[arg(long, requires = "fit_height")]
    pub fit_width: Option<u32>,

    #[arg(long, requires = "fit_width")]
    pub fit_height: Option<u32>,
}

#[derive(Subcommand)]
pub enum TemplateCommand {
    List,
    Show { name: String },
    Delete { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let config_dir = cli.config_dir.as_deref();
    match cli.command {
        Commands::Apply(args) => commands::apply(args, config_dir),
        Commands::Preview(args) => commands::preview(args, config_dir),
        Commands::Templates(cmd) => commands::templates(cmd, config_dir),
        Commands::Fonts => commands::fonts(),
    }
}
