use clap::{Parser, Subcommand};
use imgresize::config::{self, Settings};
use imgresize::operation::{OperationStatus, ResizeOperation};
use imgresize::output;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    if env!("IMGRESIZE_ON_RELEASE_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    match env!("IMGRESIZE_GIT_HASH") {
        "" => "dev@unknown",
        // Leaked once at startup
        hash => Box::leak(format!("dev@{hash}").into_boxed_str()),
    }
}

#[derive(Parser)]
#[command(name = "imgresize")]
#[command(about = "Resize images to named target sizes")]
#[command(long_about = "\
Resize images to named target sizes

Each selected size writes one copy next to the others, named from a template:

  Photo.jpg → Photo (Small).jpg
            → Photo (Small) (1).jpg   when the first name is taken

Sizes, naming, codec fallback and orientation handling come from a TOML
settings file. Run 'imgresize gen-config' to print a documented one.")]
#[command(version = version_string())]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (stock settings when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ResizeArgs {
    /// Image to resize
    source: PathBuf,

    /// Directory for resized copies (defaults to the source's directory)
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Overwrite the source instead of writing copies
    #[arg(long)]
    replace: bool,

    /// Size to produce, by name; repeatable (overrides selected_sizes)
    #[arg(long = "size", value_name = "NAME")]
    sizes: Vec<String>,

    /// Produce every configured size
    #[arg(long, conflicts_with = "sizes")]
    all_sizes: bool,

    /// Give outputs the source's last-write time
    #[arg(long)]
    keep_date_modified: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Worker threads for rendering sizes (capped at available cores)
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Resize one image to the selected sizes
    Resize(ResizeArgs),
    /// Print a stock settings file with all options documented
    GenConfig,
    /// List configured sizes; selected ones are marked with *
    Sizes,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Resize(args) => {
            let mut settings = load(cli.config.as_deref())?;
            if args.all_sizes {
                settings.select_all();
            } else if !args.sizes.is_empty() {
                settings.select_by_name(&args.sizes)?;
            }
            settings.replace |= args.replace;
            settings.keep_date_modified |= args.keep_date_modified;
            init_thread_pool(args.threads);

            let dest = args.dest.or_else(|| {
                args.source
                    .parent()
                    .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
                    .map(Path::to_path_buf)
            });
            let report = ResizeOperation::new(&args.source, dest, &settings).execute()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output::report_json(&report))?);
            } else {
                output::print_report(&report);
            }
            if report.status() != OperationStatus::Succeeded {
                return Err(format!("{} could not be resized to every size", args.source.display()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Sizes => {
            let settings = load(cli.config.as_deref())?;
            output::print_sizes(&settings);
        }
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<Settings, config::ConfigError> {
    match path {
        Some(path) => config::load_settings(path),
        None => Ok(Settings::default()),
    }
}

/// Map -v to the crate's log level. Logs go to stderr so reports stay clean.
fn init_tracing(verbosity: u8) -> Result<(), Box<dyn std::error::Error>> {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(format!("imgresize={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Initialize the rayon thread pool.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(threads: Option<usize>) {
    let Some(requested) = threads else {
        return;
    };
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(requested.clamp(1, cores))
        .build_global()
        .ok();
}
