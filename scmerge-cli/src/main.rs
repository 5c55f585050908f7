use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use scmerge_anndata::{ConcatConfig, SampleFilter, WriteOptions};
use scmerge_cli::pipeline;

/// Reindex, concatenate, and intersect AnnData shards (.h5ad / .zarr).
#[derive(Debug, Parser)]
#[command(name = "scmerge", version, about)]
struct Cli {
    /// Directory receiving the output datasets.
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// Also write an .h5ad file next to each .zarr output.
    #[arg(long, global = true)]
    save_h5ad: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Shift integer observation ids by an offset.
    Reindex {
        path: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        offset: i64,
    },
    /// Append annotation features to the expression matrix.
    Concat {
        path: PathBuf,
        /// obs/<column>, obsm/<key>, or a companion .h5ad path.
        #[arg(long)]
        features: String,
        #[command(flatten)]
        concat: ConcatArgs,
    },
    /// Reindex, then optionally append annotation features.
    ReindexConcat {
        path: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        offset: i64,
        #[arg(long)]
        features: Option<String>,
        #[command(flatten)]
        concat: ConcatArgs,
    },
    /// Restrict every input to the features they all share.
    Intersect {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct ConcatArgs {
    /// Provenance flag suffix for the original features.
    #[arg(long, default_value = "gene")]
    feature_name: String,

    /// Provenance flag suffix for the appended features.
    #[arg(long)]
    annotation_feature_name: Option<String>,

    /// obsm key holding abundance estimates in a companion file.
    #[arg(long, default_value = "q05_cell_abundance_w_sf")]
    abundance_key: String,

    /// Keep only companion observations with obs[KEY] == VALUE.
    #[arg(long, value_name = "KEY=VALUE")]
    sample: Option<String>,
}

impl ConcatArgs {
    fn into_config(self) -> anyhow::Result<ConcatConfig> {
        let sample = self.sample.as_deref().map(parse_sample).transpose()?;
        Ok(ConcatConfig {
            feature_name: self.feature_name,
            annotation_feature_name: self.annotation_feature_name,
            abundance_key: self.abundance_key,
            sample,
            ..Default::default()
        })
    }
}

fn parse_sample(raw: &str) -> anyhow::Result<SampleFilter> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(SampleFilter {
            key: key.to_string(),
            value: value.to_string(),
        }),
        _ => bail!("--sample expects KEY=VALUE, got '{raw}'"),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = WriteOptions {
        out_dir: cli.out_dir,
        save_h5ad: cli.save_h5ad,
    };

    let written = match cli.command {
        Command::Reindex { path, offset } => pipeline::reindex_dataset(&path, offset, &options)
            .with_context(|| format!("reindexing {}", path.display()))?,
        Command::Concat {
            path,
            features,
            concat,
        } => {
            let config = concat.into_config()?;
            pipeline::concat_dataset(&path, &features, &config, &options)
                .with_context(|| format!("concatenating {features} onto {}", path.display()))?
        }
        Command::ReindexConcat {
            path,
            offset,
            features,
            concat,
        } => {
            let config = concat.into_config()?;
            pipeline::reindex_and_concat(&path, offset, features.as_deref(), &config, &options)
                .with_context(|| format!("reindexing and concatenating {}", path.display()))?
        }
        Command::Intersect { paths } => pipeline::intersect_features(&paths, &options)
            .context("intersecting feature axes")?,
    };

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sample_filter_parsing() {
        let f = parse_sample("sample=A1").unwrap();
        assert_eq!(f.key, "sample");
        assert_eq!(f.value, "A1");
        assert_eq!(parse_sample("batch=a=b").unwrap().value, "a=b");
        assert!(parse_sample("novalue").is_err());
        assert!(parse_sample("=x").is_err());
    }

    #[test]
    fn concat_args_fill_config() {
        let cli = Cli::parse_from([
            "scmerge",
            "concat",
            "shard.zarr",
            "--features",
            "c2l.h5ad",
            "--sample",
            "sample=A1",
            "--out-dir",
            "out",
        ]);
        assert_eq!(cli.out_dir, PathBuf::from("out"));
        let Command::Concat { concat, features, .. } = cli.command else {
            panic!("expected concat subcommand");
        };
        assert_eq!(features, "c2l.h5ad");
        let cfg = concat.into_config().unwrap();
        assert_eq!(cfg.feature_name, "gene");
        assert_eq!(cfg.sample.unwrap().value, "A1");
    }

    #[test]
    fn negative_offset_accepted() {
        let cli = Cli::parse_from(["scmerge", "reindex", "a.h5ad", "--offset", "-500"]);
        assert!(matches!(cli.command, Command::Reindex { offset: -500, .. }));
    }
}
