use std::time::Duration;

use log::info;
use rand::{Rng, SeedableRng, rngs::StdRng};

use admm_engine::{Driver, DriverConfig, Partition, SolveErr};

const NCHUNKS: usize = 8;
const ROWS_PER_CHUNK: usize = 32;
const DIM: usize = 8;

/// Synthetic sparse regression problem split into row chunks.
fn generate_partitions(rng: &mut StdRng) -> Vec<Partition> {
    let mut truth = vec![0.0; DIM];
    truth[0] = 2.0;
    truth[1] = -3.0;
    truth[2] = 1.5;

    (0..NCHUNKS)
        .map(|_| {
            let mut features = Vec::with_capacity(ROWS_PER_CHUNK * DIM);
            let mut targets = Vec::with_capacity(ROWS_PER_CHUNK);

            for _ in 0..ROWS_PER_CHUNK {
                let row: Vec<f64> = (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
                let noise: f64 = rng.random_range(-0.01..0.01);
                targets.push(row.iter().zip(&truth).map(|(x, b)| x * b).sum::<f64>() + noise);
                features.extend(row);
            }

            Partition::new(features, targets, DIM)
        })
        .collect()
}

/// Local solve by gradient descent on the chunk's augmented objective
/// `1/2 ||X b - y||^2 + rho/2 ||b - (z - u)||^2`.
fn local_solve(
    z: &[f64],
    local: &[f64],
    dual: &[f64],
    rho: f64,
    partition: &Partition,
) -> Result<Vec<f64>, SolveErr> {
    let dim = partition.ncols();
    let step = {
        // Trace bound on the curvature keeps the step size stable.
        let trace: f64 = partition.features().iter().map(|x| x * x).sum();
        1.0 / (trace + rho)
    };

    let mut beta = local.to_vec();
    let mut grad = vec![0.0; dim];

    for _ in 0..50 {
        grad.iter_mut()
            .zip(beta.iter().zip(z.iter().zip(dual)))
            .for_each(|(g, (b, (z, u)))| *g = rho * (b - z + u));

        for r in 0..partition.nrows() {
            let row = partition.row(r);
            let residual: f64 =
                row.iter().zip(&beta).map(|(x, b)| x * b).sum::<f64>() - partition.targets()[r];
            for (g, x) in grad.iter_mut().zip(row) {
                *g += residual * x;
            }
        }

        for (b, g) in beta.iter_mut().zip(&grad) {
            *b -= step * g;
        }
    }

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(SolveErr::new("gradient descent diverged"));
    }

    Ok(beta)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(17);
    let partitions = generate_partitions(&mut rng);

    let mut config = DriverConfig::new(4, 1.0);
    config.lambda = 0.1;
    config.abstol = 1e-5;
    config.reltol = 1e-4;
    config.max_rounds = Some(5_000);
    config.max_time = Some(Duration::from_secs(30));
    config.seed = Some(17);

    let driver = Driver::with_pool(config, partitions, local_solve)?;
    let report = driver.run().await?;

    info!(
        rounds = report.rounds,
        failures = report.failures;
        "run finished: {:?} in {:?}",
        report.stop,
        report.elapsed
    );

    if let Some(last) = report.residuals.last() {
        println!(
            "stopped after {} rounds: primal residual {:.3e}, dual residual {:.3e}",
            report.rounds, last.primal, last.dual
        );
    }

    println!("consensus estimate:");
    for (k, z) in report.consensus.iter().enumerate() {
        println!("  beta[{k}] = {z:+.4}");
    }

    Ok(())
}
