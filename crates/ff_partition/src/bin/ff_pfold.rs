use std::env;
use std::fs;

use serde::Serialize;
use ff_energy::EnergyTables;
use ff_partition::Ensemble;
use ff_partition::FoldOptions;
use ff_partition::FoldingContext;

const USAGE: &str = "usage: ff_pfold SEQUENCE [OPTIONS.json] [SAMPLES]";

#[derive(Debug, Serialize)]
struct Summary {
    sequence: String,
    length: usize,
    circular: bool,
    temperature: f64,
    pf_scale: f64,
    ensemble_energy: f64,
    /// Expected number of base pairs.
    expected_pairs: Option<f64>,
    /// Pairs with probability >= 0.1, as (i, j, p).
    pairs: Vec<(usize, usize, f64)>,
    degraded: bool,
    samples: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(sequence) = args.first() else {
        return Err(USAGE.into());
    };
    let (options, samples) = match args.get(1) {
        Some(arg) if arg.ends_with(".json") => {
            let options: FoldOptions = serde_json::from_str(&fs::read_to_string(arg)?)?;
            (options, args.get(2))
        }
        other => (FoldOptions::default(), other),
    };
    let samples: usize = match samples {
        Some(s) => s.parse()?,
        None => 0,
    };

    let ctx = FoldingContext::new(sequence, &EnergyTables::default(), options)?;
    let mut ensemble = Ensemble::new(&ctx);
    ensemble.fold()?;

    let (expected_pairs, pairs, degraded) = match ensemble.probabilities() {
        Ok(probs) => {
            let all = probs.pairs_above(0.0);
            let expected = all.iter().map(|&(_, _, p)| p).sum();
            let pairs = all.into_iter().filter(|&(_, _, p)| p >= 0.1).collect();
            (Some(expected), pairs, probs.is_degraded())
        }
        Err(_) => (None, Vec::new(), false),
    };

    let mut rng = rand::rng();
    let samples = ensemble
        .sample_many(samples, &mut rng)?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let summary = Summary {
        sequence: ctx.sequence().to_string(),
        length: ctx.len(),
        circular: ctx.is_circular(),
        temperature: ctx.options().temperature,
        pf_scale: ctx.scaling().pf_scale(),
        ensemble_energy: ensemble.ensemble_energy()?,
        expected_pairs,
        pairs,
        degraded,
        samples,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
