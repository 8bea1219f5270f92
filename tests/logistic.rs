use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use odecal::prelude::*;
use odecal::routines::settings::{DiagnosticsSettings, Initializer, Log, Paths, SamplerSettings};

const R: f64 = 0.2;
const K: f64 = 500.0;
const N0: f64 = 10.0;

fn logistic_curve(t: f64) -> f64 {
    K / (1.0 + (K / N0 - 1.0) * (-R * t).exp())
}

fn write_datafile(dir: &PathBuf) -> Result<PathBuf> {
    let path = dir.join("logistic.csv");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "id,time,n")?;
    for i in 0..=10 {
        let t = 5.0 * i as f64;
        writeln!(file, "a,{},{:.6}", t, logistic_curve(t))?;
    }
    Ok(path)
}

fn growth_spec() -> Result<ModelSpec> {
    let spec = ModelSpec::builder()
        .ode(Logistic)
        .parameter(
            Parameter::new(
                "r",
                Prior::Uniform {
                    low: 0.01,
                    high: 1.0,
                },
            )
            .positive(),
        )
        .parameter(
            Parameter::new(
                "k",
                Prior::Uniform {
                    low: 100.0,
                    high: 1000.0,
                },
            )
            .positive(),
        )
        .initial(InitialCondition::FirstObservation(0))
        .observe(ObservedVariable::State(0))
        .noise(NoiseModel::Additive { sd: 5.0 })
        .build()?;
    Ok(spec)
}

/// Data simulated from known parameters must be recovered by the sampler:
/// posterior means within 10 percent of the values that generated the data.
#[test]
fn test_recovers_simulated_parameters() -> Result<()> {
    let dir = std::env::temp_dir().join("odecal_logistic_recovery");
    std::fs::create_dir_all(&dir)?;
    let datafile = write_datafile(&dir)?;

    let raw = read_datafile(&datafile)?;
    let data = shape(&raw, &ReplicatePolicy::All)?;
    assert_eq!(data.len(), 1);
    assert_eq!(data.nvars(), 1);

    let spec = growth_spec()?;
    let settings = Settings {
        paths: Paths {
            data: datafile.to_string_lossy().into_owned(),
            output: Some(dir.join("outputs").to_string_lossy().into_owned()),
        },
        sampler: SamplerSettings {
            chains: 4,
            warmup: 500,
            draws: 500,
            seed: 347,
            initializer: Initializer::Prior,
        },
        diagnostics: DiagnosticsSettings::default(),
        log: Log::default(),
    };

    setup_log(&settings)?;
    let (posterior, report) = fit(&spec, &data, &settings)?;

    assert_eq!(posterior.nchains(), 4);
    assert_eq!(posterior.ndraws(), 500);
    assert_eq!(posterior.names(), &["r".to_string(), "k".to_string()]);

    let mean_r = posterior.mean(0);
    let mean_k = posterior.mean(1);
    assert!(
        (mean_r - R).abs() / R < 0.1,
        "posterior mean of r = {} too far from {}",
        mean_r,
        R
    );
    assert!(
        (mean_k - K).abs() / K < 0.1,
        "posterior mean of k = {} too far from {}",
        mean_k,
        K
    );

    assert!(!report.degraded);
    assert!(
        report.max_rhat() < 1.15,
        "chains did not mix, max rhat = {}",
        report.max_rhat()
    );
    for p in &report.parameters {
        assert!(p.ess > 50.0, "ess for {} too low: {}", p.name, p.ess);
    }

    // Output tables land in the configured folder
    assert!(dir.join("outputs").join("posterior.csv").exists());
    assert!(dir.join("outputs").join("convergence.csv").exists());
    Ok(())
}

/// A fixed seed replays the identical posterior.
#[test]
fn test_fixed_seed_reproduces_run() -> Result<()> {
    let dir = std::env::temp_dir().join("odecal_logistic_seed");
    std::fs::create_dir_all(&dir)?;
    let datafile = write_datafile(&dir)?;
    let raw = read_datafile(&datafile)?;
    let data = shape(&raw, &ReplicatePolicy::All)?;
    let spec = growth_spec()?;

    let sampler = SamplerSettings {
        chains: 2,
        warmup: 100,
        draws: 100,
        seed: 99,
        initializer: Initializer::Sobol,
    };
    let calibrator = Metropolis::new(sampler);
    let a = calibrator.calibrate(&spec, &data)?;
    let b = calibrator.calibrate(&spec, &data)?;
    for chain in 0..a.nchains() {
        assert_eq!(a.chain(chain), b.chain(chain));
    }
    Ok(())
}

/// Posterior draws pushed back through the solver reproduce the data they
/// were fitted to.
#[test]
fn test_posterior_predictions_track_the_data() -> Result<()> {
    let dir = std::env::temp_dir().join("odecal_logistic_pred");
    std::fs::create_dir_all(&dir)?;
    let datafile = write_datafile(&dir)?;
    let raw = read_datafile(&datafile)?;
    let data = shape(&raw, &ReplicatePolicy::All)?;
    let spec = growth_spec()?;

    let sampler = SamplerSettings {
        chains: 2,
        warmup: 400,
        draws: 400,
        seed: 347,
        initializer: Initializer::Prior,
    };
    let posterior = Metropolis::new(sampler).calibrate(&spec, &data)?;

    let grid: Vec<f64> = (0..=50).map(|i| i as f64).collect();
    let predictor = PosteriorPredictor::new(&spec, &data, grid, 7)?;
    let draws: Vec<_> = predictor
        .ensemble(DrawSource::Posterior(&posterior), 50)
        .collect::<odecal::error::Result<_>>()?;
    assert_eq!(draws.len(), 50);

    // Ensemble mean of the final state sits near the carrying capacity
    let mean_final: f64 = draws
        .iter()
        .map(|d| {
            let states = &d.trajectories[0].states;
            states[(states.nrows() - 1, 0)]
        })
        .sum::<f64>()
        / draws.len() as f64;
    assert!(
        (mean_final - K).abs() / K < 0.2,
        "ensemble endpoint {} strays from the carrying capacity",
        mean_final
    );
    Ok(())
}
