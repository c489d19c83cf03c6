//! Assetgen command line
//!
//! Converts captured geometry into USD scene assets and prepares image
//! input for reconstruction.

use assetgen_app::{
    ConvertConfig, ConvertError, LoggingConfig, convert_mesh, convert_point_cloud,
};
use assetgen_capture::{BorderKeyRemover, ImageSequenceSource, remove_backgrounds, sample_frames};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Assetgen - point clouds and meshes to USD assets
#[derive(Parser, Debug)]
#[command(name = "assetgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// JSON file with conversion defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconstruct a PLY point cloud and write it as a USD mesh asset
    Ply2usd {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        overrides: ConvertArgs,
    },

    /// Write an OBJ triangle mesh as a USD mesh asset
    Obj2usd {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        meters_per_unit: Option<f64>,
    },

    /// Sample an image sequence down to a fixed frame rate
    Frames {
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Frames to keep per second of footage
        sampling_rate: f64,
        /// Frame rate the sequence was captured at
        #[arg(long, default_value_t = 30.0)]
        source_fps: f64,
    },

    /// Remove plain backdrops from a directory of images
    RemoveBg {
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Only process the file names listed here, one per line
        #[arg(long)]
        image_list_file: Option<PathBuf>,
        /// Largest per-channel distance from the backdrop color to remove
        #[arg(long, default_value_t = 24)]
        tolerance: u8,
    },
}

#[derive(Args, Debug, Default)]
struct ConvertArgs {
    #[arg(long)]
    meters_per_unit: Option<f64>,
    /// Target face count after decimation (0 disables)
    #[arg(long, allow_negative_numbers = true)]
    mesh_simplify_target: Option<i64>,
    /// Poisson octree depth
    #[arg(long)]
    depth: Option<u32>,
    /// Average samples per cell the finest level must keep (0 disables the limit)
    #[arg(long)]
    samples_per_cell: Option<f64>,
    #[arg(long)]
    normal_radius: Option<f32>,
    #[arg(long)]
    max_neighbors: Option<usize>,
}

impl ConvertArgs {
    fn apply(&self, config: &mut ConvertConfig) {
        if let Some(v) = self.meters_per_unit {
            config.meters_per_unit = v;
        }
        if let Some(v) = self.mesh_simplify_target {
            config.mesh_simplify_target = v;
        }
        if let Some(v) = self.depth {
            config.depth = v;
        }
        if let Some(v) = self.samples_per_cell {
            config.samples_per_cell = v;
        }
        if let Some(v) = self.normal_radius {
            config.normal_radius = v;
        }
        if let Some(v) = self.max_neighbors {
            config.max_neighbors = v;
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ConvertConfig, ConvertError> {
    match path {
        Some(path) => Ok(ConvertConfig::from_json_file(path)?),
        None => Ok(ConvertConfig::default()),
    }
}

fn run(cli: Cli) -> Result<PathBuf, ConvertError> {
    let mut config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Ply2usd {
            input,
            output,
            overrides,
        } => {
            overrides.apply(&mut config);
            Ok(convert_point_cloud(&input, &output, &config)?.output)
        }
        Command::Obj2usd {
            input,
            output,
            meters_per_unit,
        } => {
            ConvertArgs {
                meters_per_unit,
                ..Default::default()
            }
            .apply(&mut config);
            Ok(convert_mesh(&input, &output, &config)?.output)
        }
        Command::Frames {
            input_dir,
            output_dir,
            sampling_rate,
            source_fps,
        } => {
            let mut source = ImageSequenceSource::open(&input_dir, source_fps)?;
            sample_frames(&mut source, &output_dir, sampling_rate, None)?;
            Ok(output_dir)
        }
        Command::RemoveBg {
            input_dir,
            output_dir,
            image_list_file,
            tolerance,
        } => {
            let remover = BorderKeyRemover { tolerance };
            remove_backgrounds(
                &remover,
                &input_dir,
                &output_dir,
                image_list_file.as_deref(),
            )?;
            Ok(output_dir)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    LoggingConfig {
        level: cli.log_level.clone(),
    }
    .init();

    match run(cli) {
        Ok(output) => println!("{}", output.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
