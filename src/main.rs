use clap::{Parser, Subcommand};
use fxg3a::block::load_compressed_image;
use fxg3a::container::{self, BuildOptions, ChecksumReport};
use fxg3a::header::{G3aHeader, HeaderSummary, DEFAULT_VERSION};
use fxg3a::icon::{Icon, ICON_HEIGHT, ICON_WIDTH};
use fxg3a::image::{bmp, load_image_file};
use fxg3a::names::LocalizedNames;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "g3a", about = "Build and edit G3A add-in containers")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a binary payload into a .g3a container
    Build {
        input: PathBuf,
        /// Defaults to the input path with a .g3a extension
        output: Option<PathBuf>,
        /// Name as lc:name; lc is basic, internal, en, es, de, fr, pt, zh, un1
        /// or un2 (empty or omitted means basic).  Repeatable, last wins
        #[arg(short = 'n', long = "name")]
        names: Vec<String>,
        /// Icon as uns:file or sel:file (92x64 BMP or PNG).  Repeatable
        #[arg(short = 'i', long = "icon")]
        icons: Vec<String>,
        /// Version string stored in the header
        #[arg(short = 'V', long = "app-version", default_value = DEFAULT_VERSION)]
        version: String,
    },
    /// Dump both colour icons of a container as BMP files
    Icons {
        input: PathBuf,
        #[arg(long, default_value = "uns.bmp")]
        unselected: PathBuf,
        #[arg(long, default_value = "sel.bmp")]
        selected: PathBuf,
    },
    /// Replace the icons of an existing container in place
    UpdateIcon {
        input:      PathBuf,
        selected:   PathBuf,
        unselected: PathBuf,
    },
    /// Convert a BMP or PNG to raw big-endian 5-6-5 pixels
    Convert {
        input:  PathBuf,
        output: PathBuf,
    },
    /// Unpack a compressed image resource to a BMP
    Inflate {
        input:  PathBuf,
        output: PathBuf,
    },
    /// Show container metadata and check its checksums
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Build ────────────────────────────────────────────────────────────
        Commands::Build { input, output, names, icons, version } => {
            let output = output.unwrap_or_else(|| input.with_extension("g3a"));

            let mut opts = BuildOptions {
                names: LocalizedNames::new(file_name(&output)),
                version,
                ..BuildOptions::default()
            };
            for spec in &names {
                opts.names.assign(spec)?;
            }
            let (sel, uns) = parse_icon_specs(&icons)?;
            match (sel, uns) {
                (Some(sel), Some(uns)) => {
                    let (sel, uns) = container::load_icon_pair(&sel, &uns)?;
                    opts.icons.selected = sel;
                    opts.icons.unselected = uns;
                }
                (sel, uns) => {
                    if let Some(p) = sel { opts.icons.selected = load_icon(&p)?; }
                    if let Some(p) = uns { opts.icons.unselected = load_icon(&p)?; }
                }
            }

            let header = container::build(&input, &output, &opts)?;
            println!("Created: {} ({} bytes)", output.display(), header.file_size);
        }

        // ── Icons ────────────────────────────────────────────────────────────
        Commands::Icons { input, unselected, selected } => {
            let icons = container::extract_icons_from_file(&input)?;
            std::fs::write(&unselected, icons.unselected.to_bmp())?;
            std::fs::write(&selected, icons.selected.to_bmp())?;
            println!("  wrote  {}", unselected.display());
            println!("  wrote  {}", selected.display());
        }

        // ── UpdateIcon ───────────────────────────────────────────────────────
        Commands::UpdateIcon { input, selected, unselected } => {
            let (sel, uns) = container::load_icon_pair(&selected, &unselected)?;
            let sum = container::update_icons_in_file(&input, &sel, &uns)?;
            println!("Updated: {} (checksum {:#010x})", input.display(), sum);
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output } => {
            let image = load_image_file(&input)?;
            println!("Loaded image, {} x {} pixels.", image.width, image.height);
            std::fs::write(&output, image.to_565().data)?;
        }

        // ── Inflate ──────────────────────────────────────────────────────────
        Commands::Inflate { input, output } => {
            let resource = std::fs::read(&input)?;
            let packed = load_compressed_image(&resource)?;
            std::fs::write(&output, bmp::encode(&packed.to_image24()))?;
            println!("Unpacked {} x {} image to {}", packed.width, packed.height, output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let contents = container::read_container(&input)?;
            let header = G3aHeader::from_bytes(&contents)?;
            let report = InfoReport {
                header:    header.summary(),
                checksums: container::verify_checksums(&contents).ok(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_info(&input, &report);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InfoReport {
    header:    HeaderSummary,
    checksums: Option<ChecksumReport>,
}

fn print_info(path: &Path, report: &InfoReport) {
    let h = &report.header;
    println!("── G3A container ────────────────────────────────────────");
    println!("  Path           {}", path.display());
    println!("  File name      {}", h.filename);
    println!("  Name           {}", h.name_basic);
    println!("  Internal name  {}", h.name_internal);
    for (lc, name) in &h.localized_names {
        println!("    {:<4}         {}", lc, name);
    }
    println!("  Version        {}", h.version);
    println!("  Timestamp      {}", h.timestamp);
    println!("  File size      {} B (payload {} B)", h.file_size, h.payload_size);
    println!("  Copy prot.     {}", h.copy_protection);
    println!("  Mono icon      {}", if h.has_mono_icon { "present" } else { "none" });
    match &report.checksums {
        Some(ck) => println!(
            "  Checksum       {:#010x} / {:#010x} (computed {:#010x}) {}",
            ck.header, ck.trailer, ck.computed,
            if ck.is_valid() { "OK" } else { "MISMATCH" }
        ),
        None => println!("  Checksum       {:#010x} (no trailing copy)", h.checksum),
    }
}

/// Split `uns:path` / `sel:path` specs; later specs override earlier ones.
fn parse_icon_specs(specs: &[String]) -> Result<(Option<PathBuf>, Option<PathBuf>), String> {
    let (mut sel, mut uns) = (None, None);
    for spec in specs {
        match spec.split_once(':') {
            Some(("sel", path)) => sel = Some(PathBuf::from(path)),
            Some(("uns", path)) => uns = Some(PathBuf::from(path)),
            _ => return Err(format!("Failed to parse option: `{spec}` (expected uns:file or sel:file)")),
        }
    }
    Ok((sel, uns))
}

fn load_icon(path: &Path) -> Result<Icon, Box<dyn std::error::Error>> {
    Icon::load(path).map_err(|e| {
        format!("{}: {e} (icons must be {ICON_WIDTH}x{ICON_HEIGHT} pixels)", path.display()).into()
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
