use std::path::PathBuf;
use std::process::exit;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use fathom::algebra::Z64;
use fathom::preprocessing::{Demand, Pool};
use fathom::simulation::LocalEngine;
use fathom::{BatchCoordinator, BoundConfig, Result, Simulation};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// the synthetic data set is fixed; only the secret sharing depends on --seed
const DATA_SEED: u64 = 0x5eed;

struct Options {
    config: BoundConfig,
    parties: usize,
    samples: usize,
    epochs: usize,
    seed: String,
}

impl Options {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = match matches.get_one::<PathBuf>("config") {
            Some(path) => BoundConfig::from_json_file(path)?,
            None => BoundConfig::default(),
        };
        if matches.get_flag("offline") {
            config.enable_offline_randomness = true;
        }
        config.validate_for::<Z64>()?;
        Ok(Options {
            config,
            parties: *matches.get_one::<usize>("parties").unwrap_or(&3),
            samples: *matches.get_one::<usize>("samples").unwrap_or(&1024),
            epochs: *matches.get_one::<usize>("epochs").unwrap_or(&10),
            seed: matches
                .get_one::<String>("seed")
                .cloned()
                .unwrap_or_else(|| "fathom".to_string()),
        })
    }

    /// Randomness consumed by `train`.
    fn demand(&self) -> Demand {
        let batches = BatchCoordinator::new(self.config.clone()).batch_count(self.samples);
        let shift = self.config.log_mini_batch + self.config.log_learning_rate;
        let mut step = Demand::new();
        step.multiply(&self.config, self.config.mini_batch_size)
            .multiply(&self.config, self.config.mini_batch_size)
            .truncate(shift, 2);
        let mut demand = step.repeat(batches * self.epochs);
        // w and b are revealed at the end
        demand.reveal(2);
        demand
    }
}

// y = 2x + 1/2 with a little noise, x in [-1, 1]
fn synthetic(samples: usize) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(DATA_SEED);
    (0..samples)
        .map(|_| {
            let x: f64 = rng.gen_range(-1.0..1.0);
            let noise: f64 = rng.gen_range(-0.05..0.05);
            (x, 2.0 * x + 0.5 + noise)
        })
        .unzip()
}

fn train(options: &Options) -> Result<()> {
    let mut sim: Simulation<Z64> =
        Simulation::new(options.config.clone(), options.parties, options.seed.as_bytes())?;
    let (xs, ys) = synthetic(options.samples);
    let x = sim.share_reals(vec![options.samples, 1], &xs)?;
    let y = sim.share_reals(vec![options.samples, 1], &ys)?;
    let w = sim.share_reals(vec![1], &[0.0])?;
    let b = sim.share_reals(vec![1], &[0.0])?;
    let coordinator = BatchCoordinator::new(options.config.clone());

    let job = |engine: &mut LocalEngine<Z64>| {
        let p = engine.party();
        let (x, y) = (x.part(p), y.part(p));
        let mut w = w.part(p).clone();
        let mut b = b.part(p).clone();
        let size = coordinator.batch_size();

        for epoch in 0..options.epochs {
            coordinator.run_epoch(engine, options.samples, |engine, range| {
                let xb = engine.slice_rows(x, range.clone())?;
                let yb = engine.slice_rows(y, range)?;
                let wt = engine.tile(&w, size)?;
                let bt = engine.tile(&b, size)?;

                // squared-error gradient of y = w x + b
                let pred = engine.multiply(&wt, &xb)?;
                let pred = engine.add(&pred, &bt)?;
                let err = engine.sub(&pred, &yb)?;
                let gw = engine.multiply(&err, &xb)?;
                let gw = engine.sum(&gw)?;
                let gb = engine.sum(&err)?;

                w = coordinator.apply_update(engine, &w, &gw)?;
                b = coordinator.apply_update(engine, &b, &gb)?;
                Ok(())
            })?;
            if p == 0 {
                info!("epoch {} done", epoch);
            }
        }
        Ok((engine.reveal_reals(&w)?, engine.reveal_reals(&b)?))
    };

    let offline = options.config.enable_offline_randomness;
    let preloaded = options.config.preload_path.join(Pool::<Z64>::file_name(0));
    let results = if offline && preloaded.exists() {
        info!("using pools from {}", options.config.preload_path.display());
        let dir = options.config.preload_path.clone();
        sim.run_preloaded(dir, job)?
    } else {
        sim.run(&options.demand(), job)?
    };

    for (party, result) in results.into_iter().enumerate() {
        let (w, b) = result?;
        println!("party {}: w = {:.4}, b = {:.4}", party, w[0], b[0]);
    }
    Ok(())
}

fn preload(options: &Options) -> Result<()> {
    let sim: Simulation<Z64> =
        Simulation::new(options.config.clone(), options.parties, options.seed.as_bytes())?;
    let demand = options.demand();
    info!("preloading {} items per party", demand.total());
    for path in sim.preload(&demand)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn app() -> Command {
    Command::new("Fathom")
        .about("Secret-shared fixed-point training between simulated parties")
        .arg(
            Arg::new("operation")
                .long("operation")
                .help("Specify the operation: \"train\", \"preload\"")
                .value_parser(["train", "preload", "version_info"])
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("JSON file overriding the default bounds")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("parties")
                .long("parties")
                .help("Number of parties")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("samples")
                .long("samples")
                .help("Number of synthetic training samples")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("epochs")
                .long("epochs")
                .help("Number of passes over the samples")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .help("Generate all randomness before the online phase")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed of the dealer"),
        )
}

fn print_version() {
    println!("fathom_version: fathom {}", built_info::PKG_VERSION);
    if let (Some(dirty), Some(hash)) = (built_info::GIT_DIRTY, built_info::GIT_COMMIT_HASH) {
        println!("fathom_commit_sha: {}", hash);
        println!(
            "fathom_uncommitted_changes: {}",
            if dirty { "TRUE" } else { "FALSE" }
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fathom=info".into()),
        )
        .init();

    let matches = app().get_matches();
    let operation: &String = match matches.get_one("operation") {
        Some(operation) => operation,
        None => unreachable!(),
    };
    if operation == "version_info" {
        print_version();
        return;
    }

    let result = Options::from_matches(&matches).and_then(|options| match operation.as_str() {
        "train" => train(&options),
        "preload" => preload(&options),
        _ => unreachable!(),
    });
    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_app() {
        app().debug_assert();
    }

    #[test]
    fn test_demand_covers_training() {
        let matches = app().get_matches_from([
            "fathom",
            "--operation",
            "train",
            "--samples",
            "300",
            "--epochs",
            "2",
        ]);
        let options = Options::from_matches(&matches).unwrap();
        // 300 samples make 2 batches of 128
        let per_step = 2 * options.config.mini_batch_size;
        assert_eq!(
            options.demand().get(fathom::preprocessing::RandomnessKind::Triple),
            2 * 2 * per_step
        );
        assert_eq!(
            options
                .demand()
                .get(fathom::preprocessing::RandomnessKind::RevealMask),
            2
        );
    }
}
