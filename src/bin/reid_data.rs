//! reid_data - inspect and prepare person re-ID datasets
//!
//! Loads splits the same way the training pipeline does, prints their summary,
//! exports sample lists, applies pseudo labels and fetches dataset archives.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use reid_data::fetch;
use reid_data::fsutil::{read_json, write_json};
use reid_data::{build_dataset, DataConfig, DatasetOptions, Mode, ReidDataset};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Dataset root (the dataset folder lives underneath).
    #[arg(long, env = "REID_DATA_ROOT", global = true)]
    root: Option<PathBuf>,
    /// Dataset name.
    #[arg(long, global = true)]
    dataset: Option<String>,
    /// Fraction of training identities held out for validation.
    #[arg(long, global = true)]
    val_split: Option<f64>,
    /// Replace all identity labels with 0.
    #[arg(long, global = true)]
    del_labels: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the summary table of one split, or of every split with `all`.
    Summary {
        #[arg(long, default_value = "all")]
        mode: String,
    },
    /// Decode one sample and print its labels.
    Inspect {
        #[arg(long)]
        mode: Mode,
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
    /// Write a split's sample list as JSON.
    Export {
        #[arg(long)]
        mode: Mode,
        #[arg(long)]
        output: PathBuf,
    },
    /// Apply pseudo labels (JSON array, one per sample, -1 = outlier).
    Relabel(RelabelArgs),
    /// Download an archive and extract it into a directory.
    Fetch {
        #[arg(long)]
        url: String,
        #[arg(long)]
        dest: PathBuf,
        /// Expected SHA-256 of the archive.
        #[arg(long)]
        sha256: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RelabelArgs {
    #[arg(long)]
    mode: Mode,
    #[arg(long)]
    labels: PathBuf,
    /// Optional path for the relabeled sample list.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// `all` or a single split name.
struct ModeArg(Vec<Mode>);

impl std::str::FromStr for ModeArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "all" {
            Ok(ModeArg(Mode::ALL.to_vec()))
        } else {
            Ok(ModeArg(vec![s.parse()?]))
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let ui = ui::Ui::new(ui::UiMode::parse(&cli.ui), std::io::stderr().is_terminal());
    let cfg = resolve_config(&cli)?;
    log::debug!("config: {:?}", cfg);

    match cli.command {
        Command::Summary { mode } => {
            let ModeArg(modes) = mode.parse::<ModeArg>()?;
            for mode in modes {
                let dataset = load(&ui, &cfg, mode, cfg.quiet_dataset_options())?;
                print!("{}", dataset);
            }
        }
        Command::Inspect { mode, index } => {
            let dataset = load(&ui, &cfg, mode, cfg.quiet_dataset_options())?;
            let item = dataset.get(index)?;
            let (width, height) = item.img.dimensions();
            println!("index: {}", item.ind);
            println!("path:  {}", item.path.display());
            println!("pid:   {}", item.id);
            println!("camid: {}", item.cid);
            println!("size:  {}x{}", width, height);
        }
        Command::Export { mode, output } => {
            let dataset = load(&ui, &cfg, mode, cfg.quiet_dataset_options())?;
            export(&ui, &dataset, &output)?;
        }
        Command::Relabel(args) => {
            let labels: Vec<i64> = {
                let _stage = ui.stage(format!("Read pseudo labels {}", args.labels.display()));
                read_json(&args.labels)?
            };
            let options = DatasetOptions {
                pseudo_labels: Some(labels),
                ..cfg.quiet_dataset_options()
            };
            let dataset = load(&ui, &cfg, args.mode, options)?;
            print!("{}", dataset);
            if let Some(output) = args.output {
                export(&ui, &dataset, &output)?;
            }
        }
        Command::Fetch { url, dest, sha256 } => {
            let archive = dest.join(fetch::url_file_name(&url));
            {
                let _stage = ui.stage(format!("Download {}", url));
                fetch::download_url(&url, &archive)?;
            }
            if let Some(expected) = sha256.as_deref() {
                let _stage = ui.stage("Verify sha256");
                fetch::verify_sha256(&archive, expected)?;
            }
            let mut stage = ui.stage(format!("Extract {}", archive.display()));
            let kind = fetch::extract_archive(&archive, &dest)?;
            stage.set_detail(format!("{:?}", kind));
        }
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<DataConfig> {
    let mut cfg = DataConfig::load()?;
    if let Some(root) = &cli.root {
        cfg.root = root.clone();
    }
    if let Some(dataset) = &cli.dataset {
        cfg.dataset = dataset.clone();
    }
    if let Some(split) = cli.val_split {
        cfg.val_split = split;
    }
    if cli.del_labels {
        cfg.del_labels = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load(ui: &ui::Ui, cfg: &DataConfig, mode: Mode, options: DatasetOptions) -> Result<ReidDataset> {
    let mut stage = ui.stage(format!("Load {} {}", cfg.dataset, mode));
    let dataset = build_dataset(&cfg.dataset, &cfg.root, mode, &options)?;
    stage.set_detail(format!("{} images, {} ids", dataset.len(), dataset.num_pids()));
    Ok(dataset)
}

fn export(ui: &ui::Ui, dataset: &ReidDataset, output: &Path) -> Result<()> {
    let mut stage = ui.stage(format!("Export {}", output.display()));
    write_json(dataset.data(), output)?;
    stage.set_detail(format!("{} samples", dataset.len()));
    Ok(())
}
