// Thin runner around the library's experiments.
//
//   associative-dbn <experiment> <mnist_dir> [config.json]
//
// <experiment> is one of label_association, parity_association, parity_adbn.
// Without a config file the experiment's defaults are used. Set RUST_LOG to
// change verbosity.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use associative_dbn::config::load_json;
use associative_dbn::data::DigitSource;
use associative_dbn::experiment::{
    label_association, parity_adbn, parity_association, LabelAssociationConfig, ParityAdbnConfig,
    ParityAssociationConfig,
};

const USAGE: &str = "usage: associative-dbn <label_association|parity_association|parity_adbn> <mnist_dir> [config.json]";

fn config_or_default<T>(path: Option<&str>) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match path {
        Some(path) => load_json(path).with_context(|| format!("reading config '{}'", path)),
        None => Ok(T::default()),
    }
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("associative_dbn=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!(USAGE);
    }
    let experiment = args[0].as_str();
    let config_path = args.get(2).map(String::as_str);

    let source = DigitSource::open(&args[1])
        .with_context(|| format!("loading MNIST from '{}'", args[1]))?;

    match experiment {
        "label_association" => {
            let cfg: LabelAssociationConfig = config_or_default(config_path)?;
            print_report(&label_association(&source, &cfg)?)
        }
        "parity_association" => {
            let cfg: ParityAssociationConfig = config_or_default(config_path)?;
            print_report(&parity_association(&source, &cfg)?)
        }
        "parity_adbn" => {
            let cfg: ParityAdbnConfig = config_or_default(config_path)?;
            print_report(&parity_adbn(&source, &cfg)?)
        }
        other => bail!("unknown experiment '{}'\n{}", other, USAGE),
    }
}
